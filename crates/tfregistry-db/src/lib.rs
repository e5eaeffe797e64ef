//! Storage engines for the provider registry
//!
//! This crate defines the backend contract every storage engine implements
//! and ships three engines behind it:
//! - a key/value engine (in-memory or Redis) using prefix scans and
//!   compare-and-swap
//! - a document engine (in-memory or DynamoDB) using conditional writes and
//!   atomic list appends
//! - a relational engine (PostgreSQL or SQLite via sqlx) using composite
//!   unique constraints and transactions
//!
//! Engines are picked by name through [`BackendRegistry`].
//!
//! # Example
//!
//! ```rust,no_run
//! use tfregistry_core::RequestContext;
//! use tfregistry_db::{BackendRegistry, EngineConfig, EngineLifecycle};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default().with_database_url("sqlite::memory:");
//! let backend = BackendRegistry::with_defaults().build("sql", &config)?;
//! backend.configure(&RequestContext::new()).await?;
//! # Ok(())
//! # }
//! ```

// Re-export core domain types for convenience
pub use tfregistry_core;

pub mod backend;
pub mod document;
pub mod error;
pub mod keyvalue;
pub mod lifecycle;
pub mod pool;
pub mod registry;
pub mod sql;

#[cfg(test)]
mod testing;

pub use backend::{
    Backend, EngineLifecycle, GpgKeyStore, ModuleStore, PlatformLookup, ProviderPlatformStore,
    ProviderStore, ProviderVersionStore, RegistryLookup,
};
pub use document::DocumentBackend;
pub use error::{DbError, DbResult};
pub use keyvalue::KeyValueBackend;
pub use pool::{close_pool, create_pool, mask_password, verify_pool_health, PoolConfig};
pub use registry::{BackendConstructor, BackendRegistry, EngineConfig};
pub use sql::SqlBackend;

/// Database layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
