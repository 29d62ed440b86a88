//! API error responses
//!
//! Every error is rendered as `{"error": {"code": ..., "message": ...}}`.
//! Storage failures are logged and replaced by a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{ErrorKind, SyncError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or wrong bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Common(#[from] madmp_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Sync(err) => {
                let (status, code) = match err.kind() {
                    ErrorKind::Document => (StatusCode::BAD_REQUEST, "INVALID_DOCUMENT"),
                    ErrorKind::Ambiguity => (StatusCode::UNPROCESSABLE_ENTITY, "AMBIGUOUS_DISTRIBUTION"),
                    ErrorKind::IdentityResolution => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "IDENTITY_RESOLUTION")
                    }
                    ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                    ErrorKind::Permission => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
                    ErrorKind::Storage => {
                        error!(error = ?err, "Request failed with storage error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                (status, code, err.public_message())
            }
            ApiError::Common(err) => match err {
                madmp_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                madmp_common::Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
                madmp_common::Error::DuplicateKey { .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                madmp_common::Error::Busy(_) => (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    "storage is busy, retry later".to_string(),
                ),
                other => {
                    error!(error = ?other, "Request failed with storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "internal storage error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
