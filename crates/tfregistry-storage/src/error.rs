//! Asset storage error types

use tfregistry_core::{Cancelled, ErrorKind, RegistryError};
use thiserror::Error;

/// Result type for asset storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Asset storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object absent
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Transfer token missing, malformed, expired or signed with another key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed path or chunk metadata
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another request is assembling the same object
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Chunked upload is missing parts
    #[error("Incomplete upload for {path}: missing chunks {missing:?}")]
    IncompleteUpload { path: String, missing: Vec<u32> },

    /// Filesystem or object-store failure
    #[error("Storage I/O error during {operation}: {message}")]
    Io { operation: String, message: String },

    /// Storage misconfigured or used before `configure`
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error(transparent)]
    Domain(#[from] RegistryError),
}

impl StorageError {
    /// Wrap an I/O failure with the operation that hit it
    pub fn io(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StorageError::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Unauthorized(_) => ErrorKind::Unauthorized,
            StorageError::InvalidInput(_) => ErrorKind::InvalidInput,
            StorageError::Conflict(_) => ErrorKind::Conflict,
            StorageError::IncompleteUpload { .. } => ErrorKind::IncompleteUpload,
            StorageError::Io { .. } | StorageError::Configuration(_) => ErrorKind::StorageIo,
            StorageError::Cancelled(_) => ErrorKind::Cancelled,
            StorageError::Domain(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            _ => StorageError::io("filesystem", err),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for StorageError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

        match err.kind() {
            JwtErrorKind::ExpiredSignature => StorageError::Unauthorized("token expired".to_string()),
            JwtErrorKind::InvalidSignature => {
                StorageError::Unauthorized("token signature mismatch".to_string())
            }
            _ => StorageError::Unauthorized(format!("invalid token: {}", err)),
        }
    }
}
