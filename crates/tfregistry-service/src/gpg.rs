//! GPG key registration
//!
//! Key IDs are always derived from the armored key itself; a malformed
//! armor block is an input error for the one request that sent it.

use async_trait::async_trait;
use std::sync::Arc;
use tfregistry_core::{GpgKey, RequestContext};
use tfregistry_db::{Backend, GpgKeyStore};
use tracing::{info, instrument};

use crate::error::ServiceResult;

/// Trait for GPG key operations
#[async_trait]
pub trait GpgKeyService: Send + Sync {
    /// Register a public key for a namespace; registering it again returns the same record
    async fn add_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        ascii_armor: &str,
    ) -> ServiceResult<GpgKey>;

    async fn get_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key_id: &str,
    ) -> ServiceResult<GpgKey>;

    async fn list_keys(&self, ctx: &RequestContext, namespace: &str) -> ServiceResult<Vec<GpgKey>>;
}

/// Default implementation of GpgKeyService
pub struct DefaultGpgKeyService {
    backend: Arc<dyn Backend>,
}

impl DefaultGpgKeyService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl GpgKeyService for DefaultGpgKeyService {
    #[instrument(skip(self, ctx, ascii_armor), fields(namespace = %namespace))]
    async fn add_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        ascii_armor: &str,
    ) -> ServiceResult<GpgKey> {
        let key = self.backend.add_gpg_key(ctx, namespace, ascii_armor).await?;
        info!(key_id = %key.key_id, "Registered GPG key");
        Ok(key)
    }

    async fn get_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key_id: &str,
    ) -> ServiceResult<GpgKey> {
        Ok(self.backend.get_gpg_key(ctx, namespace, key_id).await?)
    }

    async fn list_keys(&self, ctx: &RequestContext, namespace: &str) -> ServiceResult<Vec<GpgKey>> {
        Ok(self.backend.list_gpg_keys(ctx, namespace).await?)
    }
}
