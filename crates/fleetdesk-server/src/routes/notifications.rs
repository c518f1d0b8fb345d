//! Device registration and web-push fan-out to company users.
//!
//! Sends run on the blocking pool: the FCM client is synchronous and a
//! company-wide send makes one request per device.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use chrono::{DateTime, Utc};
use fleetdesk_core::company::CompanyUser;
use fleetdesk_core::error::ValidationErrors;
use fleetdesk_core::push::PushMessage;
use fleetdesk_core::{validate, DeskError};
use serde::{Deserialize, Serialize};

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DeviceTokenBody {
    pub device_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotifyBody {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub user_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NotifyBody {
    /// Title and body text, or the collected validation errors.
    fn checked(&self, errors: &mut ValidationErrors) -> (String, String) {
        validate::required(errors, "title", self.title.as_deref(), Some(255));
        validate::required(errors, "message", self.message.as_deref(), Some(500));
        let text = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();
        (text(&self.title), text(&self.message))
    }
}

#[derive(Debug, Serialize)]
pub struct NotifiableUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub can_receive_notifications: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub total_users: usize,
    pub with_notifications: usize,
    pub without_notifications: usize,
}

#[derive(Debug, Serialize)]
pub struct UserListing {
    pub users: Vec<NotifiableUser>,
    pub summary: UserSummary,
}

impl From<Vec<CompanyUser>> for UserListing {
    fn from(users: Vec<CompanyUser>) -> Self {
        let users: Vec<NotifiableUser> = users
            .into_iter()
            .map(|u| NotifiableUser {
                can_receive_notifications: u.has_device_token(),
                id: u.id,
                name: u.name,
                email: u.email,
                role: u.role,
                created_at: u.created_at,
            })
            .collect();
        let with_notifications = users.iter().filter(|u| u.can_receive_notifications).count();
        Self {
            summary: UserSummary {
                total_users: users.len(),
                with_notifications,
                without_notifications: users.len() - with_notifications,
            },
            users,
        }
    }
}

/// POST /api/company/notifications/device-token
pub async fn update_device_token(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<DeviceTokenBody>,
) -> ApiResult {
    let token = validate::normalize(body.device_token);
    let mut errors = ValidationErrors::new();
    validate::required(&mut errors, "device_token", token.as_deref(), None);
    errors.into_result()?;

    let store = app.store.clone();
    let user_id = auth.user.id;
    tokio::task::spawn_blocking(move || {
        store.write(|tx| CompanyUser::set_device_token(tx, user_id, token.as_deref().unwrap_or_default()))
    })
    .await
    .map_err(AppError::join)??;
    tracing::info!(user_id, "device token registered");
    response::done("Device token updated successfully.")
}

/// POST /api/company/notifications/test
pub async fn send_test(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<NotifyBody>,
) -> ApiResult {
    let mut errors = ValidationErrors::new();
    let (title, text) = body.checked(&mut errors);
    errors.into_result()?;

    let Some(token) = auth.user.device_token.clone().filter(|t| !t.is_empty()) else {
        return Err(AppError::bad_request(
            "No device token found. Please register your device first.",
        ));
    };

    let message = PushMessage::new(title, text)
        .with_data("type", "test_notification")
        .with_data("sent_by", auth.user.name.clone())
        .with_data("timestamp", Utc::now().to_rfc3339())
        .with_action("dismiss", "Dismiss");

    let push = app.push.clone();
    let sent = tokio::task::spawn_blocking(move || push.send_to_one(&token, &message))
        .await
        .map_err(AppError::join)?;
    match sent {
        Ok(result) => response::ok("Test notification sent successfully.", result),
        Err(e) => {
            tracing::warn!(user_id = auth.user.id, error = %e, "test notification failed");
            Ok(response::fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to send notification: {e}"),
            ))
        }
    }
}

/// POST /api/company/notifications/company
pub async fn send_to_company(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<NotifyBody>,
) -> ApiResult {
    let mut errors = ValidationErrors::new();
    let (title, text) = body.checked(&mut errors);
    errors.into_result()?;

    let store = app.store.clone();
    let company_id = auth.company_id();
    let users = tokio::task::spawn_blocking(move || {
        store.read(|conn| CompanyUser::with_device_tokens(conn, company_id, None))
    })
    .await
    .map_err(AppError::join)??;
    if users.is_empty() {
        return Err(AppError::bad_request(
            "No users with device tokens found in your company.",
        ));
    }

    let message = PushMessage::new(title, text)
        .merge_data(body.data.as_ref())
        .with_data("type", "company_announcement")
        .with_data("company_id", company_id.to_string())
        .with_data("sent_by", auth.user.name.clone());
    let total = users.len();
    let report = fan_out(&app, users, message).await?;
    tracing::info!(
        company_id,
        successful = report.summary.successful,
        failed = report.summary.failed,
        "company announcement sent"
    );
    response::ok(
        format!(
            "Notification sent to {} out of {total} company users.",
            report.summary.successful
        ),
        report,
    )
}

/// POST /api/company/notifications/users
pub async fn send_to_users(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<NotifyBody>,
) -> ApiResult {
    let mut errors = ValidationErrors::new();
    let (title, text) = body.checked(&mut errors);
    let ids = body.user_ids.clone().unwrap_or_default();
    if ids.is_empty() {
        errors.add("user_ids", "The user ids field is required.");
    }

    let store = app.store.clone();
    let company_id = auth.company_id();
    let lookup_ids = ids.clone();
    let (errors, users) = tokio::task::spawn_blocking(move || {
        store.read(|conn| {
            for (i, id) in lookup_ids.iter().enumerate() {
                match CompanyUser::get(conn, *id) {
                    Ok(u) if u.company_id == company_id => {}
                    Ok(_) | Err(DeskError::NotFound(_)) => {
                        errors.add(format!("user_ids.{i}"), format!("The selected user_ids.{i} is invalid."));
                    }
                    Err(e) => return Err(e),
                }
            }
            let users = CompanyUser::with_device_tokens(conn, company_id, Some(&lookup_ids))?;
            Ok((errors, users))
        })
    })
    .await
    .map_err(AppError::join)??;
    errors.into_result()?;

    if users.is_empty() {
        return Err(AppError::bad_request("No users found with device tokens."));
    }

    let message = PushMessage::new(title, text)
        .merge_data(body.data.as_ref())
        .with_data("type", "targeted_message")
        .with_data("company_id", company_id.to_string())
        .with_data("sent_by", auth.user.name.clone());
    let total = users.len();
    let report = fan_out(&app, users, message).await?;
    response::ok(
        format!(
            "Notification sent to {} out of {total} selected users.",
            report.summary.successful
        ),
        report,
    )
}

/// GET /api/company/notifications/users
pub async fn list_users(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let users = tokio::task::spawn_blocking(move || {
        store.read(|conn| CompanyUser::list_for_company(conn, company_id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Company users fetched successfully.", UserListing::from(users))
}

async fn fan_out(
    app: &AppState,
    users: Vec<CompanyUser>,
    message: PushMessage,
) -> Result<fleetdesk_core::push::PushReport, AppError> {
    let tokens: Vec<String> = users.into_iter().filter_map(|u| u.device_token).collect();
    let push = app.push.clone();
    let report = tokio::task::spawn_blocking(move || push.send_to_many(&tokens, &message))
        .await
        .map_err(AppError::join)?;
    Ok(report)
}
