//! Server configuration
//!
//! Sources, later overriding earlier:
//! 1. `config/default.toml`
//! 2. `config/{environment}.toml`
//! 3. `TFREGISTRY_*` environment variables, `__` separating sections
//!    (e.g. `TFREGISTRY_BACKEND__ENGINE=sql`)

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tfregistry_api::{CorsConfig, MiddlewareConfig, RouteConfig};
use tfregistry_core::CreatePolicy;
use tfregistry_db::EngineConfig;
use tfregistry_storage::StorageConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cors: CorsSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for each request's storage operations
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub graceful_shutdown: bool,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    RouteConfig::default().max_upload_bytes
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            graceful_shutdown: default_true(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Storage engine selection
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Registered engine name
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default)]
    pub create_policy: CreatePolicy,

    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_timeout")]
    pub connect_timeout_seconds: u64,

    #[serde(default)]
    pub dynamodb_table: Option<String>,
}

fn default_engine() -> String {
    "memory".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            create_policy: CreatePolicy::default(),
            redis_url: None,
            database_url: None,
            max_connections: default_max_connections(),
            connect_timeout_seconds: default_timeout(),
            dynamodb_table: None,
        }
    }
}

impl BackendConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            create_policy: self.create_policy,
            redis_url: self.redis_url.clone(),
            database_url: self.database_url.clone(),
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            dynamodb_table: self.dynamodb_table.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,

    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_target: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (empty means all)
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_cors_max_age")]
    pub max_age_seconds: u64,
}

fn default_cors_max_age() -> u64 {
    3600
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            max_age_seconds: default_cors_max_age(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_dir: impl Into<PathBuf>, environment: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", environment))).required(false),
            )
            .add_source(
                Environment::with_prefix("TFREGISTRY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn middleware(&self) -> MiddlewareConfig {
        MiddlewareConfig::new()
            .with_cors(CorsConfig {
                allowed_origins: self.cors.allowed_origins.clone(),
                max_age_seconds: Some(self.cors.max_age_seconds),
            })
            .with_timeout(self.server.timeout_seconds)
    }

    pub fn routes(&self) -> RouteConfig {
        RouteConfig::new().with_max_upload_bytes(self.server.max_upload_bytes)
    }
}
