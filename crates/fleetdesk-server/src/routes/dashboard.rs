use axum::extract::State;
use axum::Extension;
use chrono::Utc;
use fleetdesk_core::activity;
use fleetdesk_core::dashboard;
use fleetdesk_core::db::PageRequest;
use fleetdesk_core::types::{
    CompanyAddressType, DeliveryMode, DeliveryStatus, DeliveryType, SelectOption,
};
use serde::{Deserialize, Serialize};

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::ApiQuery;
use crate::response::{self, ApiResult};
use crate::state::AppState;

pub async fn get_dashboard(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let data = tokio::task::spawn_blocking(move || {
        store.read(|conn| dashboard::load(conn, company_id, Utc::now()))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Dashboard data fetched.", data)
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityParams {
    pub action: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/company/activity
pub async fn list_activity(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiQuery(params): ApiQuery<ActivityParams>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let page = PageRequest::new(params.page, params.per_page);
    let action = params.action.filter(|a| !a.trim().is_empty());
    let logs = tokio::task::spawn_blocking(move || {
        store.read(|conn| activity::list(conn, company_id, action.as_deref(), page))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Activity logs fetched.", logs)
}

#[derive(Debug, Serialize)]
pub struct Options {
    pub delivery_statuses: Vec<SelectOption>,
    pub delivery_types: Vec<SelectOption>,
    pub delivery_modes: Vec<SelectOption>,
    pub company_address_types: Vec<SelectOption>,
}

impl Options {
    pub fn current() -> Self {
        Self {
            delivery_statuses: DeliveryStatus::options(),
            delivery_types: DeliveryType::options(),
            delivery_modes: DeliveryMode::options(),
            company_address_types: CompanyAddressType::options(),
        }
    }
}

/// GET /api/company/options
pub async fn get_options() -> ApiResult {
    response::ok("Options fetched.", Options::current())
}
