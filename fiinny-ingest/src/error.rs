//! Error types for the HTTP trigger surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::DeliveryError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed event envelope (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Job document absent and no snapshot supplied (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Store could not be read or written (503)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::JobNotFound(_) => ApiError::NotFound(err.to_string()),
            DeliveryError::Store(e) => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(path) => ApiError::BadRequest(format!("invalid path: {}", path)),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", msg)
            }
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
