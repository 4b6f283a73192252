use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ErrorResponse;
use crate::service::ServiceError;

/// Error response carrying an HTTP status and an [`ErrorResponse`] body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    /// Create validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::validation_error(field, message),
        }
    }

    /// Input that is well-formed JSON but cannot be processed, such as a bad path id
    pub fn unprocessable(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorResponse::validation_error(field, message),
        }
    }

    /// Create not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse::error("not-found", message),
        }
    }

    /// Create conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::error("conflict", message),
        }
    }

    /// Create server error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse::error("exception", message),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => {
                tracing::debug!("Rejected request: {}", e);
                Self::validation(e.field, e.message)
            }
            ServiceError::NotFound(_) => Self::not_found(err.to_string()),
            ServiceError::Conflict(message) => {
                tracing::debug!("Conflicting write: {}", message);
                Self::conflict(message)
            }
            ServiceError::Store(_) | ServiceError::Internal(_) => {
                tracing::error!("✗ {}", err);
                Self::internal_error(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            body: ErrorResponse::validation_error("body", rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
