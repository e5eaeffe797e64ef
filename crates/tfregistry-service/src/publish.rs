//! Publish service
//!
//! Orchestrates the publish flow: provider, then a version bound to a
//! registered signing key, then one platform per OS/architecture. Every
//! step that expects bytes hands back an upload URL scoped to exactly the
//! object that belongs there.

use async_trait::async_trait;
use std::sync::Arc;
use tfregistry_core::{
    ArtifactPresence, Module, ModuleKey, ModuleVersionKey, NewModuleVersion, NewProviderPlatform,
    NewProviderVersion, Provider, ProviderKey, ProviderVersionKey, PublishState, RequestContext,
};
use tfregistry_db::{
    Backend, ModuleStore, ProviderPlatformStore, ProviderStore, ProviderVersionStore,
};
use tfregistry_storage::{AssetBackend, AssetPath, AssetStorage, ObjectProbe};
use tracing::{debug, info, instrument};

use crate::dto::{ModuleVersionUpload, PlatformRequest, PlatformUpload, VersionUploads};
use crate::error::{ServiceError, ServiceResult};
use crate::naming;

/// Trait for publish operations
#[async_trait]
pub trait PublishService: Send + Sync {
    /// Create a provider, subject to the engine's create policy
    async fn create_provider(&self, ctx: &RequestContext, key: &ProviderKey)
        -> ServiceResult<Provider>;

    /// Create a version and mint upload URLs for its checksum manifest and signature
    async fn create_version(
        &self,
        ctx: &RequestContext,
        params: &NewProviderVersion,
    ) -> ServiceResult<VersionUploads>;

    /// Add a platform to a version and mint the binary's upload URL
    async fn create_platform(
        &self,
        ctx: &RequestContext,
        request: PlatformRequest,
    ) -> ServiceResult<PlatformUpload>;

    async fn create_module(&self, ctx: &RequestContext, key: &ModuleKey) -> ServiceResult<Module>;

    /// Create a module version and mint the archive's upload URL
    async fn create_module_version(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
        source_ref: &str,
    ) -> ServiceResult<ModuleVersionUpload>;

    /// Derive how far a version has been published
    async fn version_state(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
    ) -> ServiceResult<PublishState>;
}

/// Default implementation of PublishService
pub struct DefaultPublishService {
    backend: Arc<dyn Backend>,
    storage: Arc<dyn AssetBackend>,
}

impl DefaultPublishService {
    pub fn new(backend: Arc<dyn Backend>, storage: Arc<dyn AssetBackend>) -> Self {
        Self { backend, storage }
    }

    /// A binary must not take the object name of the checksum manifest,
    /// its signature, or another platform of the same version
    async fn check_platform_filename(
        &self,
        ctx: &RequestContext,
        params: &NewProviderPlatform,
    ) -> ServiceResult<()> {
        let reserved = [
            naming::shasums(&params.version),
            naming::shasums_signature(&params.version),
        ];
        if reserved.contains(&params.filename) {
            return Err(ServiceError::InvalidInput(format!(
                "filename '{}' is reserved for the version's checksum files",
                params.filename
            )));
        }

        let version = self.backend.get_provider_version(ctx, &params.version).await?;
        if let Some(existing) = version
            .platforms
            .iter()
            .find(|p| p.filename == params.filename)
        {
            return Err(ServiceError::Conflict(format!(
                "filename '{}' is already used by {}_{}",
                params.filename, existing.os, existing.arch
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PublishService for DefaultPublishService {
    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn create_provider(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> ServiceResult<Provider> {
        Ok(self.backend.create_provider(ctx, key).await?)
    }

    #[instrument(skip(self, ctx, params), fields(version = %params.key))]
    async fn create_version(
        &self,
        ctx: &RequestContext,
        params: &NewProviderVersion,
    ) -> ServiceResult<VersionUploads> {
        let version = self.backend.create_provider_version(ctx, params).await?;

        let shasums = AssetPath::for_provider(&params.key, &naming::shasums(&params.key))?;
        let signature =
            AssetPath::for_provider(&params.key, &naming::shasums_signature(&params.key))?;

        let uploads = VersionUploads {
            version,
            shasums_upload_url: self.storage.upload_url(ctx, &shasums).await?,
            shasums_signature_upload_url: self.storage.upload_url(ctx, &signature).await?,
        };

        info!("Provider version declared");
        Ok(uploads)
    }

    #[instrument(skip(self, ctx, request), fields(version = %request.version, platform = %request.platform))]
    async fn create_platform(
        &self,
        ctx: &RequestContext,
        request: PlatformRequest,
    ) -> ServiceResult<PlatformUpload> {
        let filename = request
            .filename
            .unwrap_or_else(|| naming::provider_binary(&request.version, &request.platform));
        let params =
            NewProviderPlatform::new(request.version, request.platform, filename, request.shasum)?;
        self.check_platform_filename(ctx, &params).await?;

        let platform = self.backend.create_provider_platform(ctx, &params).await?;
        let path = AssetPath::for_provider(&params.version, &platform.filename)?;
        let upload_url = self.storage.upload_url(ctx, &path).await?;

        debug!(path = %path, "Minted binary upload URL");
        Ok(PlatformUpload {
            platform,
            upload_url,
        })
    }

    #[instrument(skip(self, ctx), fields(module = %key))]
    async fn create_module(&self, ctx: &RequestContext, key: &ModuleKey) -> ServiceResult<Module> {
        Ok(self.backend.create_module(ctx, key).await?)
    }

    #[instrument(skip(self, ctx), fields(version = %key))]
    async fn create_module_version(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
        source_ref: &str,
    ) -> ServiceResult<ModuleVersionUpload> {
        let module = self.backend.get_module(ctx, &key.module).await?;
        let params = NewModuleVersion::new(key.clone(), source_ref, naming::module_archive(key))?;
        let version = self.backend.create_module_version(ctx, &params).await?;

        let path = AssetPath::for_module(key, &version.filename)?;
        let upload_url = self.storage.upload_url(ctx, &path).await?;

        info!("Module version declared");
        Ok(ModuleVersionUpload {
            module,
            version,
            upload_url,
        })
    }

    #[instrument(skip(self, ctx), fields(version = %key))]
    async fn version_state(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
    ) -> ServiceResult<PublishState> {
        let version = self.backend.get_provider_version(ctx, key).await?;

        let shasums = AssetPath::for_provider(key, &naming::shasums(key))?;
        let signature = AssetPath::for_provider(key, &naming::shasums_signature(key))?;

        let mut binaries = Vec::with_capacity(version.platforms.len());
        for platform in &version.platforms {
            let path = AssetPath::for_provider(key, &platform.filename)?;
            binaries.push(self.storage.exists(ctx, &path).await?);
        }

        let presence = ArtifactPresence {
            shasums: self.storage.exists(ctx, &shasums).await?,
            shasums_signature: self.storage.exists(ctx, &signature).await?,
            binaries,
        };
        let state = presence.derive(&version);
        debug!(state = %state, "Derived publish state");
        Ok(state)
    }
}
