//! API error types and conversions

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::registrar::RegistrarError;
use crate::storage::error::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Unknown or revoked api key, or a missing/wrong bearer token
    Unauthorized(String),

    /// Malformed body or invalid parameters
    InvalidRequest(String),

    /// Resource not found
    NotFound(String),

    /// Duplicate name or api key
    Conflict(String),

    /// Storage operation failed
    StorageError(String),

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::StorageError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::StorageError(other.to_string()),
        }
    }
}

impl From<RegistrarError> for ApiError {
    fn from(err: RegistrarError) -> Self {
        match err {
            RegistrarError::UnknownApiKey => {
                ApiError::Unauthorized("unknown or revoked api key".to_string())
            }
            RegistrarError::Storage(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}
