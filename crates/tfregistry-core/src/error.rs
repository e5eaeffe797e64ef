//! Error types for the provider registry
//!
//! Every layer of the registry classifies its failures into the small
//! [`ErrorKind`] taxonomy defined here. Callers map kinds to transport-level
//! codes; only [`ErrorKind::StorageIo`] is worth retrying.

use std::fmt;
use thiserror::Error;

use crate::context::Cancelled;

/// Result type alias for registry domain operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Classification shared by all registry error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity, key, or file absent
    NotFound,
    /// Uniqueness violation on create
    Conflict,
    /// Malformed caller input (armored key, chunk headers, names)
    InvalidInput,
    /// Transfer token invalid, expired, or signed by someone else
    Unauthorized,
    /// Underlying engine, filesystem, or network failure
    StorageIo,
    /// Chunk assembly is missing a part
    IncompleteUpload,
    /// The caller's context was cancelled or its deadline passed
    Cancelled,
}

impl ErrorKind {
    /// Whether a caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageIo)
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::StorageIo => "STORAGE_IO",
            ErrorKind::IncompleteUpload => "INCOMPLETE_UPLOAD",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Domain error type for registry operations
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// Entity not found by its natural key
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Entity already exists under the same natural key
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// Validation error on caller-supplied input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid version format
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// ASCII-armored public key could not be parsed
    #[error("Invalid GPG key: {0}")]
    InvalidKey(String),

    /// Caller is not authorized for the requested operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage failure with operation context
    #[error("Storage error during {operation}: {message}")]
    StorageIo { operation: String, message: String },

    /// Chunked upload assembly could not find every part
    #[error("Incomplete upload for {path}: missing chunks {missing:?}")]
    IncompleteUpload { path: String, missing: Vec<u32> },

    /// Operation was cancelled
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl RegistryError {
    /// Shorthand for a not-found error
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        RegistryError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Shorthand for a conflict error
    pub fn conflict(entity: &'static str, key: impl fmt::Display) -> Self {
        RegistryError::Conflict {
            entity,
            key: key.to_string(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound { .. } => ErrorKind::NotFound,
            RegistryError::Conflict { .. } => ErrorKind::Conflict,
            RegistryError::ValidationError(_)
            | RegistryError::InvalidVersion(_)
            | RegistryError::InvalidKey(_) => ErrorKind::InvalidInput,
            RegistryError::Unauthorized(_) => ErrorKind::Unauthorized,
            RegistryError::StorageIo { .. } => ErrorKind::StorageIo,
            RegistryError::IncompleteUpload { .. } => ErrorKind::IncompleteUpload,
            RegistryError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Whether a caller may retry
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<semver::Error> for RegistryError {
    fn from(err: semver::Error) -> Self {
        RegistryError::InvalidVersion(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            RegistryError::not_found("provider", "acme/widget").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RegistryError::InvalidKey("bad armor".to_string()).kind(),
            ErrorKind::InvalidInput
        );
        assert!(RegistryError::StorageIo {
            operation: "get".to_string(),
            message: "timeout".to_string(),
        }
        .is_retryable());
        assert!(!RegistryError::conflict("provider", "acme/widget").is_retryable());
    }

    #[test]
    fn test_error_display_includes_key() {
        let err = RegistryError::conflict("provider platform", "acme/widget@1.0.0 linux/amd64");
        assert_eq!(
            err.to_string(),
            "provider platform already exists: acme/widget@1.0.0 linux/amd64"
        );
    }
}
