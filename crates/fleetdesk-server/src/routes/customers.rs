use axum::extract::State;
use axum::Extension;
use fleetdesk_core::address::{Address, AddressInput};
use fleetdesk_core::customer::{Customer, CustomerInput};
use fleetdesk_core::db::PageRequest;
use serde::Deserialize;

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

// ---------------------------------------------------------------------------
// /api/company/customers
// ---------------------------------------------------------------------------

pub async fn list_customers(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let page = tokio::task::spawn_blocking(move || {
        store.read(|conn| Customer::list(conn, company_id, params.request()))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Customers fetched.", page)
}

pub async fn get_customer(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let detail = tokio::task::spawn_blocking(move || {
        store.read(|conn| Customer::detail(conn, company_id, id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Customer details fetched.", detail)
}

pub async fn create_customer(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<CustomerInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let customer = tokio::task::spawn_blocking(move || {
        store.write(|tx| Customer::create(tx, &scope, body))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Customer created successfully.", customer)
}

pub async fn update_customer(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<CustomerInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let customer = tokio::task::spawn_blocking(move || {
        store.write(|tx| Customer::update(tx, &scope, id, body))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Customer updated successfully.", customer)
}

pub async fn delete_customer(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    tokio::task::spawn_blocking(move || store.write(|tx| Customer::delete(tx, &scope, id)))
        .await
        .map_err(AppError::join)??;
    response::done("Customer deleted successfully.")
}

// ---------------------------------------------------------------------------
// /api/company/customers/{id}/addresses
// ---------------------------------------------------------------------------

pub async fn list_addresses(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(customer_id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let addresses = tokio::task::spawn_blocking(move || {
        store.read(|conn| Address::list_for_customer(conn, company_id, customer_id))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Customer addresses fetched.", addresses)
}

pub async fn add_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(customer_id): ApiPath<i64>,
    ApiJson(body): ApiJson<AddressInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let saved = tokio::task::spawn_blocking(move || {
        store.write(|tx| Address::add_for_customer(tx, &scope, customer_id, body))
    })
    .await
    .map_err(AppError::join)??;
    app.enqueue_geocode(saved.geocode);
    response::ok("Address created successfully.", saved.record)
}

pub async fn update_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath((customer_id, id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<AddressInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let saved = tokio::task::spawn_blocking(move || {
        store.write(|tx| Address::update_for_customer(tx, &scope, customer_id, id, body))
    })
    .await
    .map_err(AppError::join)??;
    app.enqueue_geocode(saved.geocode);
    response::ok("Address updated successfully.", saved.record)
}

pub async fn delete_address(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath((customer_id, id)): ApiPath<(i64, i64)>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    tokio::task::spawn_blocking(move || {
        store.write(|tx| Address::delete_for_customer(tx, &scope, customer_id, id))
    })
    .await
    .map_err(AppError::join)??;
    response::done("Address deleted successfully.")
}
