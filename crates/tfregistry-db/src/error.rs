//! Database-specific error types and conversions
//!
//! Driver errors from sqlx, redis and the AWS SDK are flattened into
//! string-carrying variants here, so no driver type appears in a public
//! signature. Every variant classifies into the shared [`ErrorKind`].

use thiserror::Error;
use tfregistry_core::{Cancelled, ErrorKind, RegistryError};

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Database-specific errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Connection to the store failed or was lost
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Query or command rejected by the store
    #[error("Query error: {0}")]
    Query(String),

    /// Transaction could not be started or committed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Record not found by its natural key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists under the same natural key
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stored data could not be interpreted
    #[error("Invalid data format: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Engine misconfigured or used outside its lifecycle
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Optimistic update kept losing to concurrent writers
    #[error("Write contention: {0}")]
    Contention(String),

    /// Internal database error
    #[error("Internal database error: {0}")]
    Internal(String),

    /// Request context ended before the operation did
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Domain error from core crate
    #[error("Domain error: {0}")]
    Domain(#[from] RegistryError),
}

impl DbError {
    /// Not-found error naming the entity and its natural key
    pub fn not_found(entity: &str, key: impl std::fmt::Display) -> Self {
        DbError::NotFound(format!("{} {}", entity, key))
    }

    /// Duplicate error naming the entity and its natural key
    pub fn already_exists(entity: &str, key: impl std::fmt::Display) -> Self {
        DbError::AlreadyExists(format!("{} {}", entity, key))
    }

    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error is a duplicate/already exists error
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Check if this is a transient error that could be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Connection(_) | DbError::Transaction(_) | DbError::Contention(_)
        )
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound(_) => ErrorKind::NotFound,
            DbError::AlreadyExists(_) => ErrorKind::Conflict,
            DbError::Cancelled(_) => ErrorKind::Cancelled,
            DbError::Domain(e) => e.kind(),
            DbError::Connection(_)
            | DbError::Query(_)
            | DbError::Transaction(_)
            | DbError::InvalidData(_)
            | DbError::Serialization(_)
            | DbError::Configuration(_)
            | DbError::Contention(_)
            | DbError::Internal(_) => ErrorKind::StorageIo,
        }
    }

    /// Whether the caller may retry the request
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Convert SQLx database errors to our error type
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound("No rows returned".to_string()),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => DbError::AlreadyExists(message),
                    sqlx::error::ErrorKind::ForeignKeyViolation => DbError::NotFound(message),
                    _ => DbError::Query(message),
                }
            }

            sqlx::Error::PoolTimedOut => {
                DbError::Connection("Connection pool timeout".to_string())
            }

            sqlx::Error::PoolClosed => DbError::Configuration("Connection pool closed".to_string()),

            sqlx::Error::Io(io_err) => DbError::Connection(format!("I/O error: {}", io_err)),

            sqlx::Error::Tls(tls_err) => DbError::Connection(format!("TLS error: {}", tls_err)),

            sqlx::Error::Protocol(msg) => DbError::Connection(format!("Protocol error: {}", msg)),

            sqlx::Error::ColumnNotFound(col) => {
                DbError::InvalidData(format!("Column not found: {}", col))
            }

            sqlx::Error::Decode(msg) => DbError::Serialization(format!("Decode error: {}", msg)),

            _ => DbError::Internal(format!("{}", err)),
        }
    }
}

/// Convert Redis errors
impl From<redis::RedisError> for DbError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            DbError::Connection(format!("Redis: {}", err))
        } else {
            DbError::Query(format!("Redis: {}", err))
        }
    }
}

/// Convert serde_json errors
impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(format!("{}", err))
    }
}

/// Convert URL parse errors
impl From<url::ParseError> for DbError {
    fn from(err: url::ParseError) -> Self {
        DbError::Configuration(format!("Invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfregistry_core::CancelReason;

    #[test]
    fn test_error_classification() {
        let not_found = DbError::not_found("provider", "org1/private/acme/widget");
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transient());

        let dup = DbError::already_exists("provider version", "acme/widget@1.0.0");
        assert!(dup.is_already_exists());
        assert_eq!(dup.kind(), ErrorKind::Conflict);

        let connection = DbError::Connection("refused".to_string());
        assert!(connection.is_transient());
        assert_eq!(connection.kind(), ErrorKind::StorageIo);

        let contention = DbError::Contention("platform list".to_string());
        assert!(contention.is_retryable());

        let config = DbError::Configuration("not configured".to_string());
        assert_eq!(config.kind(), ErrorKind::StorageIo);
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_domain_and_cancel_kinds() {
        let domain: DbError = RegistryError::InvalidKey("bad".to_string()).into();
        assert_eq!(domain.kind(), ErrorKind::InvalidInput);

        let cancelled: DbError = Cancelled {
            operation: "get".to_string(),
            reason: CancelReason::DeadlineExceeded,
        }
        .into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_error_display() {
        let err = DbError::not_found("provider", "org1/private/acme/widget");
        assert_eq!(err.to_string(), "Not found: provider org1/private/acme/widget");
    }
}
