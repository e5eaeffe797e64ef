//! S3 storage with pre-signed URLs
//!
//! Scoping and expiry are delegated to S3: upload URLs are pre-signed PUTs
//! and download URLs pre-signed GETs, both for a fixed window.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::time::Duration;
use tfregistry_core::RequestContext;
use tracing::{debug, info, instrument};

use crate::asset::{AssetStorage, ObjectProbe};
use crate::error::{StorageError, StorageResult};
use crate::path::AssetPath;

/// Default pre-signed URL lifetime (60 minutes)
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 3600;

/// Connection settings for [`S3AssetStorage`]
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    /// Endpoint of an S3-compatible service
    pub endpoint: Option<String>,
    pub presign_ttl: Duration,
}

/// S3-backed asset storage
#[derive(Debug, Clone)]
pub struct S3AssetStorage {
    client: Client,
    bucket: String,
    presign: PresigningConfig,
}

impl S3AssetStorage {
    /// Build a client from the default AWS credential chain
    pub async fn connect(settings: &S3Settings) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = settings.region.as_ref().filter(|r| !r.is_empty()) {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(settings.endpoint.is_some())
            .build();

        Self::new(Client::from_conf(s3_config), &settings.bucket, settings.presign_ttl)
    }

    pub fn new(client: Client, bucket: &str, presign_ttl: Duration) -> StorageResult<Self> {
        if bucket.is_empty() {
            return Err(StorageError::Configuration(
                "S3 bucket cannot be empty".to_string(),
            ));
        }
        let presign = PresigningConfig::expires_in(presign_ttl).map_err(|e| {
            StorageError::Configuration(format!("invalid presign lifetime: {}", e))
        })?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            presign,
        })
    }
}

#[async_trait]
impl AssetStorage for S3AssetStorage {
    fn kind(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self, ctx), fields(bucket = %self.bucket))]
    async fn configure(&self, ctx: &RequestContext) -> StorageResult<()> {
        ctx.run("s3.configure", async {
            self.client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| map_s3_error("HeadBucket", e))
        })
        .await?;
        info!("S3 asset storage ready");
        Ok(())
    }

    async fn upload_url(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<String> {
        let request = ctx
            .run("s3.upload_url", async {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(path.as_str())
                    .presigned(self.presign.clone())
                    .await
                    .map_err(|e| map_s3_error("PresignPutObject", e))
            })
            .await?;
        Ok(request.uri().to_string())
    }

    async fn download_url(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<String> {
        let request = ctx
            .run("s3.download_url", async {
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(path.as_str())
                    .presigned(self.presign.clone())
                    .await
                    .map_err(|e| map_s3_error("PresignGetObject", e))
            })
            .await?;
        Ok(request.uri().to_string())
    }

    #[instrument(skip(self, ctx), fields(path = %path))]
    async fn remove(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<()> {
        ctx.run("s3.remove", async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(path.as_str())
                .send()
                .await
                .map_err(|e| map_s3_error("DeleteObject", e))
        })
        .await?;
        debug!("Removed object");
        Ok(())
    }
}

#[async_trait]
impl ObjectProbe for S3AssetStorage {
    async fn exists(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<bool> {
        ctx.run("s3.exists", async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(path.as_str())
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e)
                    if e.as_service_error()
                        .map(|se| se.is_not_found())
                        .unwrap_or(false) =>
                {
                    Ok(false)
                }
                Err(e) => Err(map_s3_error("HeadObject", e)),
            }
        })
        .await
    }
}

fn map_s3_error<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.as_service_error().and_then(|se| se.code());
    let status = err.raw_response().map(|raw| raw.status().as_u16());
    let message = match err.as_service_error() {
        Some(se) => se.to_string(),
        None => err.to_string(),
    };

    if is_not_found(code, status) {
        StorageError::NotFound(format!("S3 {}: {}", operation, message))
    } else {
        StorageError::io(format!("S3 {}", operation), message)
    }
}

fn is_not_found(code: Option<&str>, status: Option<u16>) -> bool {
    matches!(code, Some("NoSuchKey" | "NotFound")) || status == Some(404)
}
