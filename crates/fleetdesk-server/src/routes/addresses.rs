use axum::extract::State;
use axum::Extension;
use fleetdesk_core::address::{Address, AddressInput, CompanyAddressFilter};
use fleetdesk_core::types::CompanyAddressType;
use serde::Deserialize;

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AddressParams {
    #[serde(rename = "type")]
    pub address_type: Option<CompanyAddressType>,
    pub search: Option<String>,
}

pub async fn list_addresses(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiQuery(params): ApiQuery<AddressParams>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let filter = CompanyAddressFilter {
        address_type: params.address_type,
        search: params.search.filter(|s| !s.trim().is_empty()),
    };
    let addresses = tokio::task::spawn_blocking(move || {
        store.read(|conn| Address::list_company(conn, company_id, &filter))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Company addresses fetched successfully.", addresses)
}

/// GET /api/company/addresses/type/{type}
pub async fn list_by_type(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(kind): ApiPath<String>,
) -> ApiResult {
    let address_type: CompanyAddressType = kind.parse()?;
    let store = app.store.clone();
    let company_id = auth.company_id();
    let addresses = tokio::task::spawn_blocking(move || {
        store.read(|conn| Address::list_company_by_type(conn, company_id, address_type))
    })
    .await
    .map_err(AppError::join)??;
    response::ok(
        format!("{} addresses fetched successfully.", address_type.label()),
        addresses,
    )
}

pub async fn get_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let address = tokio::task::spawn_blocking(move || {
        store.read(|conn| Address::get_company(conn, company_id, id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Company address fetched successfully.", address)
}

pub async fn create_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<AddressInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let saved = tokio::task::spawn_blocking(move || {
        store.write(|tx| Address::create_company(tx, &scope, body))
    })
    .await
    .map_err(AppError::join)??;
    app.enqueue_geocode(saved.geocode);
    response::ok("Company address created successfully.", saved.record)
}

pub async fn update_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AddressInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let saved = tokio::task::spawn_blocking(move || {
        store.write(|tx| Address::update_company(tx, &scope, id, body))
    })
    .await
    .map_err(AppError::join)??;
    app.enqueue_geocode(saved.geocode);
    response::ok("Company address updated successfully.", saved.record)
}

pub async fn delete_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    tokio::task::spawn_blocking(move || store.write(|tx| Address::delete_company(tx, &scope, id)))
        .await
        .map_err(AppError::join)??;
    response::done("Company address deleted successfully.")
}
