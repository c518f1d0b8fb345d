pub mod addresses;
pub mod auth;
pub mod customers;
pub mod dashboard;
pub mod deliveries;
pub mod delivery_men;
pub mod items;
pub mod notifications;
pub mod rider;

use axum::http::StatusCode;
use axum::response::Response;

use crate::response::{self, ApiResult};

/// GET /api/up
pub async fn health() -> ApiResult {
    response::ok("OK", serde_json::json!({ "status": "ok" }))
}

pub async fn not_found() -> Response {
    response::fail(StatusCode::NOT_FOUND, "Not Found.")
}
