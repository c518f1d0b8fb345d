use axum::extract::State;
use axum::Extension;
use fleetdesk_core::company::{Company, CompanyUser};
use fleetdesk_core::db;
use fleetdesk_core::delivery_man::DeliveryMan;
use fleetdesk_core::error::ValidationErrors;
use fleetdesk_core::validate;
use serde::{Deserialize, Serialize};

use crate::auth::{Claims, CompanyAuth, IssuedToken, RiderAuth, Role};
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginBody {
    fn credentials(self) -> Result<(String, String), AppError> {
        let email = validate::normalize(self.email);
        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "email", email.as_deref(), Some(255));
        validate::email(&mut errors, "email", email.as_deref());
        validate::required(&mut errors, "password", self.password.as_deref(), None);
        errors.into_result()?;
        Ok((email.unwrap_or_default(), self.password.unwrap_or_default()))
    }
}

#[derive(Debug, Serialize)]
pub struct CompanyProfile {
    #[serde(flatten)]
    pub user: CompanyUser,
    pub company: Company,
}

#[derive(Debug, Serialize)]
pub struct RiderProfile {
    #[serde(flatten)]
    pub man: DeliveryMan,
    pub company_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse<U> {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: U,
}

/// Store the token id so the guards refuse it from now on.
async fn revoke(app: &AppState, claims: &Claims) -> Result<(), AppError> {
    let store = app.store.clone();
    let jti = claims.jti.clone();
    let expires_at = claims.expires_at();
    tokio::task::spawn_blocking(move || store.write(|tx| db::revoke_token(tx, &jti, expires_at)))
        .await
        .map_err(AppError::join)??;
    Ok(())
}

async fn rider_profile(app: &AppState, man: DeliveryMan) -> Result<RiderProfile, AppError> {
    let store = app.store.clone();
    let id = man.id;
    let company_ids = tokio::task::spawn_blocking(move || {
        store.read(|conn| DeliveryMan::company_ids(conn, id))
    })
    .await
    .map_err(AppError::join)??;
    Ok(RiderProfile { man, company_ids })
}

// ---------------------------------------------------------------------------
// Company users
// ---------------------------------------------------------------------------

/// POST /api/company/login
pub async fn company_login(
    State(app): State<AppState>,
    ApiJson(body): ApiJson<LoginBody>,
) -> ApiResult {
    let (email, password) = body.credentials()?;
    let store = app.store.clone();
    let (user, company) = tokio::task::spawn_blocking(move || {
        store.read(|conn| CompanyUser::authenticate(conn, &email, &password))
    })
    .await
    .map_err(AppError::join)??;

    let token = app.tokens.issue(Role::CompanyUser, user.id, Some(company.id))?;
    tracing::info!(user_id = user.id, company_id = company.id, "company user logged in");
    response::ok(
        "Login successful.",
        TokenResponse {
            token,
            user: CompanyProfile { user, company },
        },
    )
}

/// GET /api/company/me
pub async fn company_me(Extension(auth): Extension<CompanyAuth>) -> ApiResult {
    response::ok(
        "Current user fetched.",
        CompanyProfile {
            user: auth.user,
            company: auth.company,
        },
    )
}

/// POST /api/company/logout
pub async fn company_logout(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
) -> ApiResult {
    revoke(&app, &auth.claims).await?;
    response::done("Logged out successfully.")
}

/// POST /api/company/refresh
pub async fn company_refresh(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
) -> ApiResult {
    revoke(&app, &auth.claims).await?;
    let token = app
        .tokens
        .issue(Role::CompanyUser, auth.user.id, Some(auth.company.id))?;
    response::ok(
        "Token refreshed.",
        TokenResponse {
            token,
            user: CompanyProfile {
                user: auth.user,
                company: auth.company,
            },
        },
    )
}

// ---------------------------------------------------------------------------
// Delivery men
// ---------------------------------------------------------------------------

/// POST /api/deliveryman/login
pub async fn rider_login(
    State(app): State<AppState>,
    ApiJson(body): ApiJson<LoginBody>,
) -> ApiResult {
    let (email, password) = body.credentials()?;
    let store = app.store.clone();
    let man = tokio::task::spawn_blocking(move || {
        store.read(|conn| DeliveryMan::authenticate(conn, &email, &password))
    })
    .await
    .map_err(AppError::join)??;

    let token = app.tokens.issue(Role::DeliveryMan, man.id, None)?;
    tracing::info!(delivery_man_id = man.id, "delivery man logged in");
    let user = rider_profile(&app, man).await?;
    response::ok("Login successful.", TokenResponse { token, user })
}

/// GET /api/deliveryman/me
pub async fn rider_me(
    State(app): State<AppState>,
    Extension(auth): Extension<RiderAuth>,
) -> ApiResult {
    let profile = rider_profile(&app, auth.man).await?;
    response::ok("Current user fetched.", profile)
}

/// POST /api/deliveryman/logout
pub async fn rider_logout(
    State(app): State<AppState>,
    Extension(auth): Extension<RiderAuth>,
) -> ApiResult {
    revoke(&app, &auth.claims).await?;
    response::done("Logged out successfully")
}

/// POST /api/deliveryman/refresh
pub async fn rider_refresh(
    State(app): State<AppState>,
    Extension(auth): Extension<RiderAuth>,
) -> ApiResult {
    revoke(&app, &auth.claims).await?;
    let token = app.tokens.issue(Role::DeliveryMan, auth.man.id, None)?;
    let user = rider_profile(&app, auth.man).await?;
    response::ok("Token refreshed.", TokenResponse { token, user })
}
