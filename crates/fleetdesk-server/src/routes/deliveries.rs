use axum::extract::State;
use axum::Extension;
use fleetdesk_core::db::PageRequest;
use fleetdesk_core::delivery::{Delivery, DeliveryFilter, DeliveryUpdate, NewDelivery};
use fleetdesk_core::types::DeliveryStatus;
use serde::Deserialize;

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryParams {
    pub status: Option<DeliveryStatus>,
    pub delivery_man_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl DeliveryParams {
    fn split(self) -> (DeliveryFilter, PageRequest) {
        let page = PageRequest::new(self.page, self.per_page);
        let filter = DeliveryFilter {
            status: self.status,
            delivery_man_id: self.delivery_man_id,
            customer_id: self.customer_id,
            search: self.search.filter(|s| !s.trim().is_empty()),
        };
        (filter, page)
    }
}

pub async fn list_deliveries(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiQuery(params): ApiQuery<DeliveryParams>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let (filter, page) = params.split();
    let deliveries = tokio::task::spawn_blocking(move || {
        store.read(|conn| Delivery::list(conn, company_id, &filter, page))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Deliveries fetched.", deliveries)
}

pub async fn create_delivery(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<NewDelivery>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let actor = auth.actor();
    let saved = tokio::task::spawn_blocking(move || {
        store.write(|tx| Delivery::create(tx, &scope, actor, body))
    })
    .await
    .map_err(AppError::join)??;
    app.enqueue_geocode(saved.geocode);
    response::ok("Delivery created successfully.", saved.record)
}

pub async fn get_delivery(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let detail = tokio::task::spawn_blocking(move || {
        store.read(|conn| Delivery::detail(conn, company_id, id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Delivery fetched.", detail)
}

pub async fn update_delivery(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<DeliveryUpdate>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let actor = auth.actor();
    let detail = tokio::task::spawn_blocking(move || {
        store.write(|tx| Delivery::update(tx, &scope, actor, id, body))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Delivery updated successfully.", detail)
}

pub async fn delete_delivery(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    tokio::task::spawn_blocking(move || store.write(|tx| Delivery::delete(tx, &scope, id)))
        .await
        .map_err(AppError::join)??;
    response::done("Delivery deleted successfully.")
}

/// GET /api/company/deliveries/{id}/status-logs
pub async fn status_logs(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let logs = tokio::task::spawn_blocking(move || {
        store.read(|conn| Delivery::status_logs(conn, company_id, id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Delivery status logs fetched.", logs)
}
