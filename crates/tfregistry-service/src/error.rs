//! Service-layer error types
//!
//! This module maps domain, database and storage errors onto one
//! service-level error that keeps the shared error classification.

use tfregistry_core::{ErrorKind, RegistryError};
use tfregistry_db::DbError;
use tfregistry_storage::StorageError;
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Service-layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Entity, version, platform or object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transfer token rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Chunked upload missing parts
    #[error("Incomplete upload for {path}: missing chunks {missing:?}")]
    IncompleteUpload { path: String, missing: Vec<u32> },

    /// Backing store failure
    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },

    /// The request was cancelled or timed out
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal service error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::IncompleteUpload { .. } => ErrorKind::IncompleteUpload,
            ServiceError::Storage { .. } | ServiceError::Internal(_) => ErrorKind::StorageIo,
            ServiceError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Storage { retryable: true, .. })
    }

    fn storage(message: impl Into<String>, retryable: bool) -> Self {
        ServiceError::Storage {
            message: message.into(),
            retryable,
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            RegistryError::Conflict { .. } => ServiceError::Conflict(err.to_string()),
            RegistryError::ValidationError(msg)
            | RegistryError::InvalidVersion(msg)
            | RegistryError::InvalidKey(msg) => ServiceError::InvalidInput(msg),
            RegistryError::Unauthorized(msg) => ServiceError::Unauthorized(msg),
            RegistryError::StorageIo { .. } => ServiceError::storage(err.to_string(), true),
            RegistryError::IncompleteUpload { path, missing } => {
                ServiceError::IncompleteUpload { path, missing }
            }
            RegistryError::Cancelled(c) => ServiceError::Cancelled(c.to_string()),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        let retryable = err.is_retryable();
        match err {
            DbError::NotFound(msg) => ServiceError::NotFound(msg),
            DbError::AlreadyExists(msg) => ServiceError::Conflict(msg),
            DbError::Connection(msg)
            | DbError::Query(msg)
            | DbError::Transaction(msg)
            | DbError::Contention(msg) => ServiceError::storage(msg, retryable),
            DbError::InvalidData(msg) | DbError::Serialization(msg) => {
                ServiceError::storage(msg, false)
            }
            DbError::Configuration(msg) | DbError::Internal(msg) => ServiceError::Internal(msg),
            DbError::Cancelled(c) => ServiceError::Cancelled(c.to_string()),
            DbError::Domain(err) => ServiceError::from(err),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => ServiceError::NotFound(msg),
            StorageError::Unauthorized(msg) => ServiceError::Unauthorized(msg),
            StorageError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            StorageError::Conflict(msg) => ServiceError::Conflict(msg),
            StorageError::IncompleteUpload { path, missing } => {
                ServiceError::IncompleteUpload { path, missing }
            }
            StorageError::Io { .. } => ServiceError::storage(err.to_string(), false),
            StorageError::Configuration(msg) => ServiceError::Internal(msg),
            StorageError::Cancelled(c) => ServiceError::Cancelled(c.to_string()),
            StorageError::Domain(err) => ServiceError::from(err),
        }
    }
}
