//! Storage selection from configuration

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::asset::AssetBackend;
use crate::error::{StorageError, StorageResult};
use crate::local::LocalAssetStorage;
use crate::token::{TokenSigner, DEFAULT_DOWNLOAD_TTL_SECS, DEFAULT_UPLOAD_TTL_SECS};

/// Which asset store to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
}

/// Asset storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_kind")]
    pub kind: StorageKind,

    /// Root directory for local storage
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    /// Base URL clients use to reach this server's transfer routes
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Secret signing transfer tokens
    #[serde(default = "default_token_secret")]
    pub token_secret: SecretString,

    #[serde(default = "default_upload_ttl")]
    pub upload_ttl_seconds: i64,

    #[serde(default = "default_download_ttl")]
    pub download_ttl_seconds: i64,

    #[serde(default)]
    pub s3_bucket: String,

    #[serde(default)]
    pub s3_region: Option<String>,

    #[serde(default)]
    pub s3_endpoint: Option<String>,

    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
}

fn default_kind() -> StorageKind {
    StorageKind::Local
}

fn default_local_root() -> PathBuf {
    PathBuf::from("./data/assets")
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_token_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_upload_ttl() -> i64 {
    DEFAULT_UPLOAD_TTL_SECS
}

fn default_download_ttl() -> i64 {
    DEFAULT_DOWNLOAD_TTL_SECS
}

fn default_presign_ttl() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            local_root: default_local_root(),
            public_base_url: default_public_base_url(),
            token_secret: default_token_secret(),
            upload_ttl_seconds: default_upload_ttl(),
            download_ttl_seconds: default_download_ttl(),
            s3_bucket: String::new(),
            s3_region: None,
            s3_endpoint: None,
            presign_ttl_seconds: default_presign_ttl(),
        }
    }
}

impl StorageConfig {
    pub fn local(root: impl Into<PathBuf>, public_base_url: &str, secret: &str) -> Self {
        Self {
            local_root: root.into(),
            public_base_url: public_base_url.to_string(),
            token_secret: SecretString::new(secret.to_string()),
            ..Self::default()
        }
    }

    pub fn signer(&self) -> StorageResult<TokenSigner> {
        TokenSigner::with_ttls(
            self.token_secret.expose_secret().as_bytes(),
            ttl_seconds("upload_ttl_seconds", self.upload_ttl_seconds)?,
            ttl_seconds("download_ttl_seconds", self.download_ttl_seconds)?,
        )
    }
}

fn ttl_seconds(field: &str, seconds: i64) -> StorageResult<Duration> {
    Duration::try_seconds(seconds).ok_or_else(|| {
        StorageError::Configuration(format!("{} out of range: {}", field, seconds))
    })
}

/// The selected store, plus the local store when it is the one selected
/// (the transfer routes need its concrete API)
#[derive(Clone)]
pub struct AssetStack {
    pub storage: Arc<dyn AssetBackend>,
    pub local: Option<Arc<LocalAssetStorage>>,
}

/// Build the configured asset store. It still needs `configure`.
pub async fn create_asset_storage(config: &StorageConfig) -> StorageResult<AssetStack> {
    match config.kind {
        StorageKind::Local => {
            info!(
                root = %config.local_root.display(),
                base_url = %config.public_base_url,
                "Using local asset storage"
            );
            let signer = Arc::new(config.signer()?);
            let local = Arc::new(LocalAssetStorage::new(
                config.local_root.clone(),
                &config.public_base_url,
                signer,
            )?);
            Ok(AssetStack {
                storage: local.clone(),
                local: Some(local),
            })
        }
        #[cfg(feature = "s3")]
        StorageKind::S3 => {
            info!(
                bucket = %config.s3_bucket,
                endpoint = config.s3_endpoint.as_deref().unwrap_or("<default>"),
                "Using S3 asset storage"
            );
            let settings = crate::s3::S3Settings {
                bucket: config.s3_bucket.clone(),
                region: config.s3_region.clone(),
                endpoint: config.s3_endpoint.clone(),
                presign_ttl: std::time::Duration::from_secs(config.presign_ttl_seconds),
            };
            let storage = crate::s3::S3AssetStorage::connect(&settings).await?;
            Ok(AssetStack {
                storage: Arc::new(storage),
                local: None,
            })
        }
        #[cfg(not(feature = "s3"))]
        StorageKind::S3 => Err(crate::error::StorageError::Configuration(
            "S3 storage requires the 's3' feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetStorage;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.kind, StorageKind::Local);
        assert_eq!(config.upload_ttl_seconds, 300);
        assert_eq!(config.download_ttl_seconds, 3600);
        assert!(config.signer().is_err());
    }

    #[test]
    fn test_deserialize_hides_secret() {
        let config: StorageConfig = serde_json::from_str(
            r#"{"kind": "local", "token_secret": "hunter2", "upload_ttl_seconds": 60}"#,
        )
        .unwrap();
        assert_eq!(config.upload_ttl_seconds, 60);
        assert!(!format!("{:?}", config).contains("hunter2"));
        assert!(config.signer().is_ok());
    }

    #[test]
    fn test_ttl_bounds() {
        let mut config = StorageConfig::local("/tmp", "http://localhost", "secret");
        config.upload_ttl_seconds = 7200;
        assert!(matches!(
            config.signer(),
            Err(StorageError::Configuration(_))
        ));

        config.upload_ttl_seconds = 300;
        config.download_ttl_seconds = i64::MAX;
        assert!(matches!(
            config.signer(),
            Err(StorageError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_local_stack() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::local(dir.path(), "http://localhost:8080", "secret");
        let stack = create_asset_storage(&config).await.unwrap();
        assert_eq!(stack.storage.kind(), "local");
        assert!(stack.local.is_some());
    }
}
