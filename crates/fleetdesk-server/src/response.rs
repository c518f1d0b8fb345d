//! Success envelope: `{"success": true, "message": ..., "data": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::AppError;

pub type ApiResult = Result<Response, AppError>;

fn respond(status: StatusCode, message: impl Into<String>, data: impl Serialize) -> ApiResult {
    let body = serde_json::json!({
        "success": true,
        "message": message.into(),
        "data": serde_json::to_value(data)?,
    });
    Ok((status, Json(body)).into_response())
}

pub fn ok(message: impl Into<String>, data: impl Serialize) -> ApiResult {
    respond(StatusCode::OK, message, data)
}

/// Success with `data: null`.
pub fn done(message: impl Into<String>) -> ApiResult {
    respond(StatusCode::OK, message, serde_json::Value::Null)
}

/// Failure envelope for handlers that pick their own status.
pub fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "success": false, "message": message.into() });
    (status, Json(body)).into_response()
}
