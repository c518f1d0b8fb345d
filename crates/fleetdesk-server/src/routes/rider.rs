//! Endpoints used by the delivery man's mobile app.

use axum::extract::State;
use axum::Extension;
use fleetdesk_core::delivery::{Delivery, ProofUpdate};
use fleetdesk_core::types::DeliveryStatus;
use serde::Deserialize;

use crate::auth::RiderAuth;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RiderParams {
    pub status: Option<DeliveryStatus>,
}

/// GET /api/deliveryman/deliveries
///
/// Unfinished deliveries across every company unless `status` is given.
pub async fn list_deliveries(
    State(app): State<AppState>,
    Extension(auth): Extension<RiderAuth>,
    ApiQuery(params): ApiQuery<RiderParams>,
) -> ApiResult {
    let store = app.store.clone();
    let man_id = auth.man.id;
    let deliveries = tokio::task::spawn_blocking(move || {
        store.read(|conn| Delivery::list_for_delivery_man(conn, man_id, params.status))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Deliveries fetched.", deliveries)
}

/// PUT /api/deliveryman/deliveries/{id}/status
pub async fn update_status(
    State(app): State<AppState>,
    Extension(auth): Extension<RiderAuth>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ProofUpdate>,
) -> ApiResult {
    let store = app.store.clone();
    let man_id = auth.man.id;
    let detail = tokio::task::spawn_blocking(move || {
        store.write(|tx| Delivery::update_by_delivery_man(tx, man_id, id, body))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Delivery status updated successfully.", detail)
}
