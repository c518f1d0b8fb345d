use axum::extract::State;
use axum::Extension;
use fleetdesk_core::db::PageRequest;
use fleetdesk_core::item::{Item, ItemFilter, ItemInput};
use serde::Deserialize;

use crate::auth::CompanyAuth;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::response::{self, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ItemParams {
    pub active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_items(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiQuery(params): ApiQuery<ItemParams>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let page = PageRequest::new(params.page, params.per_page);
    let filter = ItemFilter {
        active: params.active,
        search: params.search.filter(|s| !s.trim().is_empty()),
    };
    let items = tokio::task::spawn_blocking(move || {
        store.read(|conn| Item::list(conn, company_id, &filter, page))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Items fetched successfully.", items)
}

pub async fn get_item(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let company_id = auth.company_id();
    let item = tokio::task::spawn_blocking(move || store.read(|conn| Item::get(conn, company_id, id)))
        .await
        .map_err(AppError::join)??;
    response::ok("Item fetched successfully.", item)
}

pub async fn create_item(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiJson(body): ApiJson<ItemInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let item = tokio::task::spawn_blocking(move || store.write(|tx| Item::create(tx, &scope, body)))
        .await
        .map_err(AppError::join)??;
    response::ok("Item created successfully.", item)
}

pub async fn update_item(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ItemInput>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    let item = tokio::task::spawn_blocking(move || {
        store.write(|tx| Item::update(tx, &scope, id, body))
    })
    .await
    .map_err(AppError::join)??;
    response::ok("Item updated successfully.", item)
}

pub async fn delete_item(
    State(app): State<AppState>,
    Extension(auth): Extension<CompanyAuth>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let store = app.store.clone();
    let scope = auth.scope();
    tokio::task::spawn_blocking(move || store.write(|tx| Item::delete(tx, &scope, id)))
        .await
        .map_err(AppError::join)??;
    response::done("Item deleted successfully.")
}
