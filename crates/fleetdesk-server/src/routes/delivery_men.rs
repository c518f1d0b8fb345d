use axum::extract::State;
use axum::Extension;
use fleetdesk_core::delivery_man::{DeliveryMan, DeliveryManInput};

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::response::{self, ApiResult};
use crate::state::AppState;

pub async fn list_delivery_men(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let men = tokio::task::spawn_blocking(move || {
        store.read(|conn| DeliveryMan::list_for_company(conn, company_id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Delivery men fetched.", men)
}

pub async fn create_delivery_man(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<DeliveryManInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let man = tokio::task::spawn_blocking(move || {
        store.write(|tx| DeliveryMan::create_and_link(tx, &scope, body))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Delivery man created and linked to company.", man)
}

pub async fn unlink_delivery_man(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    tokio::task::spawn_blocking(move || store.write(|tx| DeliveryMan::unlink(tx, &scope, id)))
        .await
        .map_err(AppError::join)??;
    response::done("Delivery man unlinked from company.")
}
