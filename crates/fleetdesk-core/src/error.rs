use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Field-level validation failures, keyed by request field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// First message overall, used as the summary line of a 422 response.
    pub fn first(&self) -> Option<&str> {
        self.0.values().flatten().next().map(String::as_str)
    }

    /// `Ok(())` when nothing was collected, otherwise the validation error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DeskError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.first().unwrap_or("The given data was invalid."))
    }
}

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(ValidationErrors),

    /// A business rule refused the write (duplicate label, item in use, ...).
    #[error("{0}")]
    Conflict(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("push notification error: {0}")]
    Push(String),

    #[error("geocoding error: {0}")]
    Geocode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("token error: {0}")]
    Token(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Hash(#[from] bcrypt::BcryptError),
}

impl DeskError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DeskError::NotFound(what.into())
    }

    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        DeskError::Validation(errors)
    }
}

pub type Result<T> = std::result::Result<T, DeskError>;
