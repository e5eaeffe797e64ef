//! Asset storage contract

use async_trait::async_trait;
use tfregistry_core::RequestContext;

use crate::error::StorageResult;
use crate::path::AssetPath;

/// Blob storage holding provider binaries, checksum manifests and module
/// archives. Callers only ever receive URLs; the bytes travel directly
/// between the client and the store.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Short name used in logs and configuration
    fn kind(&self) -> &'static str;

    /// Prepare the store once at startup
    async fn configure(&self, ctx: &RequestContext) -> StorageResult<()>;

    /// URL a client can PUT the object to
    async fn upload_url(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<String>;

    /// URL a client can GET the object from
    async fn download_url(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<String>;

    async fn remove(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<()>;
}

/// Presence checks used to derive publish state
#[async_trait]
pub trait ObjectProbe: Send + Sync {
    async fn exists(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<bool>;
}

/// Storage plus probing, as the service layer consumes it
pub trait AssetBackend: AssetStorage + ObjectProbe {}

impl<T> AssetBackend for T where T: AssetStorage + ObjectProbe {}
