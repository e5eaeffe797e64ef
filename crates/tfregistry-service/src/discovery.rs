//! Discovery and download resolution
//!
//! Read side of the registry protocol. Resolution is exact-version only and
//! every miss along the way collapses into one `NotFound` naming what was
//! asked for, so callers cannot tell which step failed.

use async_trait::async_trait;
use std::sync::Arc;
use tfregistry_core::{
    ModuleKey, ModuleVersionKey, ProviderKey, ProviderVersionKey, RequestContext,
};
use tfregistry_db::{Backend, DbError, ModuleStore, ProviderVersionStore, RegistryLookup};
use tfregistry_storage::{AssetBackend, AssetPath, AssetStorage};
use tracing::{debug, instrument};

use crate::dto::{
    GpgPublicKey, ModuleDownload, ModuleVersionList, ModuleVersionSummary, ModuleVersionsResponse,
    ProviderDownload, ProviderVersionsResponse, SigningKeys, VersionSummary,
};
use crate::error::{ServiceError, ServiceResult};
use crate::naming;

/// Trait for discovery operations
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// All versions of a provider with their protocols and platforms
    async fn list_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> ServiceResult<ProviderVersionsResponse>;

    /// Resolve one platform of one version and mint download URLs for it
    async fn resolve_provider_download(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
        os: &str,
        arch: &str,
    ) -> ServiceResult<ProviderDownload>;

    async fn list_module_versions(
        &self,
        ctx: &RequestContext,
        key: &ModuleKey,
    ) -> ServiceResult<ModuleVersionsResponse>;

    /// Mint a download URL for a module version archive
    async fn resolve_module_download(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
    ) -> ServiceResult<ModuleDownload>;
}

/// Default implementation of DiscoveryService
pub struct DefaultDiscoveryService {
    backend: Arc<dyn Backend>,
    storage: Arc<dyn AssetBackend>,
}

impl DefaultDiscoveryService {
    pub fn new(backend: Arc<dyn Backend>, storage: Arc<dyn AssetBackend>) -> Self {
        Self { backend, storage }
    }
}

fn collapse_not_found(err: DbError, what: impl FnOnce() -> String) -> ServiceError {
    if err.is_not_found() {
        ServiceError::NotFound(what())
    } else {
        err.into()
    }
}

#[async_trait]
impl DiscoveryService for DefaultDiscoveryService {
    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn list_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> ServiceResult<ProviderVersionsResponse> {
        let versions = self
            .backend
            .get_provider_versions(ctx, key)
            .await
            .map_err(|e| collapse_not_found(e, || format!("provider {}", key)))?;

        Ok(ProviderVersionsResponse {
            versions: versions.iter().map(VersionSummary::from).collect(),
        })
    }

    #[instrument(skip(self, ctx), fields(version = %key, os = %os, arch = %arch))]
    async fn resolve_provider_download(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
        os: &str,
        arch: &str,
    ) -> ServiceResult<ProviderDownload> {
        let lookup = self
            .backend
            .lookup_platform(ctx, key, os, arch)
            .await
            .map_err(|e| {
                collapse_not_found(e, || format!("provider platform {} {}/{}", key, os, arch))
            })?;

        let binary = AssetPath::for_provider(key, &lookup.platform.filename)?;
        let shasums = AssetPath::for_provider(key, &naming::shasums(key))?;
        let signature = AssetPath::for_provider(key, &naming::shasums_signature(key))?;

        let download = ProviderDownload {
            protocols: lookup.version.protocols,
            os: lookup.platform.os,
            arch: lookup.platform.arch,
            filename: lookup.platform.filename,
            download_url: self.storage.download_url(ctx, &binary).await?,
            shasums_url: self.storage.download_url(ctx, &shasums).await?,
            shasums_signature_url: self.storage.download_url(ctx, &signature).await?,
            shasum: lookup.platform.shasum.to_string(),
            signing_keys: SigningKeys {
                gpg_public_keys: vec![GpgPublicKey {
                    key_id: lookup.signing_key.key_id,
                    ascii_armor: lookup.signing_key.ascii_armor,
                }],
            },
        };

        debug!(path = %binary, "Resolved provider download");
        Ok(download)
    }

    #[instrument(skip(self, ctx), fields(module = %key))]
    async fn list_module_versions(
        &self,
        ctx: &RequestContext,
        key: &ModuleKey,
    ) -> ServiceResult<ModuleVersionsResponse> {
        let versions = self
            .backend
            .list_module_versions(ctx, key)
            .await
            .map_err(|e| collapse_not_found(e, || format!("module {}", key)))?;

        Ok(ModuleVersionsResponse {
            modules: vec![ModuleVersionList {
                versions: versions
                    .into_iter()
                    .map(|v| ModuleVersionSummary { version: v.version })
                    .collect(),
            }],
        })
    }

    #[instrument(skip(self, ctx), fields(version = %key))]
    async fn resolve_module_download(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
    ) -> ServiceResult<ModuleDownload> {
        let version = self
            .backend
            .get_module_version(ctx, key)
            .await
            .map_err(|e| collapse_not_found(e, || format!("module version {}", key)))?;

        let path = AssetPath::for_module(key, &version.filename)?;
        Ok(ModuleDownload {
            download_url: self.storage.download_url(ctx, &path).await?,
        })
    }
}
