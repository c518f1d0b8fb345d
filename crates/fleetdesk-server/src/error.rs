use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fleetdesk_core::error::DeskError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. Rendered in the same envelope as
/// successful responses, with `success: false`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(DeskError::BadRequest(msg.into()).into())
    }

    pub fn unauthenticated() -> Self {
        Self(DeskError::Unauthenticated.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(DeskError::Forbidden(msg.into()).into())
    }

    pub fn join(e: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {e}"))
    }
}

fn envelope(status: StatusCode, message: String, errors: Option<serde_json::Value>) -> Response {
    let mut body = serde_json::json!({ "success": false, "message": message });
    if let Some(errors) = errors {
        body["errors"] = errors;
    }
    (status, axum::Json(body)).into_response()
}

fn desk_status(e: &DeskError) -> StatusCode {
    match e {
        DeskError::NotFound(_) => StatusCode::NOT_FOUND,
        DeskError::Validation(_) | DeskError::Conflict(_) | DeskError::InvalidTransition { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DeskError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DeskError::Unauthenticated | DeskError::InvalidCredentials | DeskError::Token(_) => {
            StatusCode::UNAUTHORIZED
        }
        DeskError::Forbidden(_) => StatusCode::FORBIDDEN,
        DeskError::Push(_)
        | DeskError::Geocode(_)
        | DeskError::Config(_)
        | DeskError::Sqlite(_)
        | DeskError::Io(_)
        | DeskError::Yaml(_)
        | DeskError::Json(_)
        | DeskError::Http(_)
        | DeskError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Extractor rejections carry their own status.
        if let Some(r) = self.0.downcast_ref::<JsonRejection>() {
            return envelope(r.status(), r.body_text(), None);
        }
        if let Some(r) = self.0.downcast_ref::<PathRejection>() {
            return envelope(r.status(), r.body_text(), None);
        }
        if let Some(r) = self.0.downcast_ref::<QueryRejection>() {
            return envelope(r.status(), r.body_text(), None);
        }

        let Some(e) = self.0.downcast_ref::<DeskError>() else {
            tracing::error!(error = %format!("{:#}", self.0), "unhandled error");
            return envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server Error.".to_string(),
                None,
            );
        };

        let status = desk_status(e);
        match e {
            DeskError::Validation(v) => envelope(
                status,
                v.first().unwrap_or("The given data was invalid.").to_string(),
                serde_json::to_value(v).ok(),
            ),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "request failed");
                envelope(status, "Server Error.".to_string(), None)
            }
            DeskError::Token(_) => envelope(status, "Unauthenticated.".to_string(), None),
            DeskError::NotFound(what) => envelope(status, format!("{what} not found."), None),
            _ => envelope(status, e.to_string(), None),
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
