use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A field-level input problem detected before any store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// JSON body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code: `invalid`, `not-found`, `conflict` or `exception`
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    /// Create a new error body
    pub fn error(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: code.into(),
            detail: detail.into(),
            field: None,
        }
    }

    /// Create validation error with field location
    pub fn validation_error(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: "invalid".to_string(),
            detail: detail.into(),
            field: Some(field.into()),
        }
    }
}

impl From<ValidationError> for ErrorResponse {
    fn from(err: ValidationError) -> Self {
        Self::validation_error(err.field, err.message)
    }
}
