use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// HTTP-facing error. Every variant carries a machine-readable kind so callers can
/// tell "refresh and retry" apart from "fix your input".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Store(_) => "store_error",
            AppError::Internal(_) => "internal",
        }
    }

    /// Only conflicts are worth retrying, after re-fetching availability.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidState(msg)
            | AppError::Store(msg)
            | AppError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        match &self {
            AppError::Store(_) | AppError::Internal(_) => {
                tracing::error!("Error: {}: {}", status, message);
            }
            _ => tracing::warn!("Request rejected ({}): {}", self.kind(), message),
        }

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": message,
                "retryable": self.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}
