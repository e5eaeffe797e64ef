//! Named backend constructors
//!
//! Engines are selected at startup by name. The registry maps each name to
//! a constructor; once a backend is built nothing downstream branches on
//! which engine it is.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tfregistry_core::CreatePolicy;
use tracing::info;

use crate::backend::{Backend, EngineLifecycle};
use crate::document::DocumentBackend;
use crate::error::{DbError, DbResult};
use crate::keyvalue::KeyValueBackend;
use crate::pool::PoolConfig;
use crate::sql::SqlBackend;

/// Settings consumed by backend constructors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub create_policy: CreatePolicy,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub dynamodb_table: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_policy: CreatePolicy::default(),
            redis_url: None,
            database_url: None,
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
            dynamodb_table: None,
        }
    }
}

impl EngineConfig {
    pub fn with_policy(mut self, policy: CreatePolicy) -> Self {
        self.create_policy = policy;
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_dynamodb_table(mut self, table: impl Into<String>) -> Self {
        self.dynamodb_table = Some(table.into());
        self
    }

    fn require<'a>(value: &'a Option<String>, setting: &str, engine: &str) -> DbResult<&'a str> {
        value.as_deref().filter(|v| !v.trim().is_empty()).ok_or_else(|| {
            DbError::Configuration(format!("engine '{}' requires {}", engine, setting))
        })
    }
}

/// Function building an unconfigured backend
pub type BackendConstructor = fn(&EngineConfig) -> DbResult<Arc<dyn Backend>>;

/// Registry of named backend constructors
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every engine compiled into this build
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", build_memory);
        registry.register("redis", build_redis);
        registry.register("sql", build_sql);
        registry.register("document-memory", build_document_memory);
        #[cfg(feature = "dynamodb")]
        registry.register("dynamodb", build_dynamodb);
        registry
    }

    /// Register a constructor, replacing any previous one with that name
    pub fn register(&mut self, name: impl Into<String>, constructor: BackendConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build the named backend. The result still needs `configure`.
    pub fn build(&self, name: &str, config: &EngineConfig) -> DbResult<Arc<dyn Backend>> {
        let constructor = self.constructors.get(name).ok_or_else(|| {
            DbError::Configuration(format!(
                "unknown storage engine '{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })?;

        let backend = constructor(config)?;
        info!(
            engine = name,
            policy = %backend.create_policy(),
            "Selected storage engine"
        );
        Ok(backend)
    }
}

fn build_memory(config: &EngineConfig) -> DbResult<Arc<dyn Backend>> {
    Ok(Arc::new(KeyValueBackend::memory(config.create_policy)))
}

fn build_redis(config: &EngineConfig) -> DbResult<Arc<dyn Backend>> {
    let url = EngineConfig::require(&config.redis_url, "a redis url", "redis")?;
    Ok(Arc::new(KeyValueBackend::redis(url, config.create_policy)))
}

fn build_sql(config: &EngineConfig) -> DbResult<Arc<dyn Backend>> {
    let url = EngineConfig::require(&config.database_url, "a database url", "sql")?;
    let mut pool = PoolConfig::new(url)
        .max_connections(config.max_connections)
        .connect_timeout(config.connect_timeout);
    if pool.is_sqlite_memory() {
        pool = PoolConfig::sqlite_memory();
    }
    pool.validate()?;
    Ok(Arc::new(SqlBackend::new(pool, config.create_policy)))
}

fn build_document_memory(config: &EngineConfig) -> DbResult<Arc<dyn Backend>> {
    Ok(Arc::new(DocumentBackend::memory(config.create_policy)))
}

#[cfg(feature = "dynamodb")]
fn build_dynamodb(config: &EngineConfig) -> DbResult<Arc<dyn Backend>> {
    let table = EngineConfig::require(&config.dynamodb_table, "a table name", "dynamodb")?;
    Ok(Arc::new(DocumentBackend::dynamodb(table, config.create_policy)))
}
