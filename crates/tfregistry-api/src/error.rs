//! API error handling
//!
//! Converts service errors into HTTP responses. The body always carries a
//! stable error code next to the message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tfregistry_core::RegistryError;
use tfregistry_service::ServiceError;
use tfregistry_storage::StorageError;

/// API error type that can be converted to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    message: String,
    error_code: Option<String>,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn with_code(
        status_code: StatusCode,
        message: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_code: Some(error_code.into()),
        }
    }

    /// 400
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, message, "INVALID_INPUT")
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, message, "NOT_FOUND")
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            status: self.status_code.as_u16(),
            error: self.message,
            code: self.error_code,
            timestamp: chrono::Utc::now(),
        };

        (self.status_code, Json(error_response)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Conflict(msg) => {
                ApiError::with_code(StatusCode::CONFLICT, msg, "CONFLICT")
            }
            ServiceError::InvalidInput(msg) => ApiError::bad_request(msg),
            ServiceError::Unauthorized(msg) => {
                ApiError::with_code(StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED")
            }
            ServiceError::IncompleteUpload { path, missing } => ApiError::with_code(
                StatusCode::CONFLICT,
                format!("Upload of {} is missing chunks {:?}", path, missing),
                "INCOMPLETE_UPLOAD",
            ),
            ServiceError::Storage {
                message,
                retryable: true,
            } => ApiError::with_code(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Storage unavailable: {}", message),
                "STORAGE_UNAVAILABLE",
            ),
            ServiceError::Storage { message, .. } => ApiError::with_code(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", message),
                "STORAGE_ERROR",
            ),
            ServiceError::Cancelled(msg) => {
                ApiError::with_code(StatusCode::SERVICE_UNAVAILABLE, msg, "CANCELLED")
            }
            ServiceError::Internal(msg) => ApiError::with_code(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", msg),
                "INTERNAL_ERROR",
            ),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ServiceError::from(err).into()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ServiceError::from(err).into()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
