//! Backend contract
//!
//! Every storage engine implements the traits below, and callers program
//! only against [`Backend`]. Each operation takes the caller's
//! [`RequestContext`] first; engines race their I/O against it, so a
//! cancelled request returns [`DbError::Cancelled`](crate::DbError::Cancelled)
//! instead of completing.
//!
//! Uniqueness rules shared by all engines:
//! - providers and modules follow the engine's [`CreatePolicy`]
//! - GPG keys are get-or-create on (namespace, derived key ID)
//! - versions and platforms are always exclusive

use async_trait::async_trait;
use tfregistry_core::{
    CreatePolicy, GpgKey, Module, ModuleKey, ModuleVersion, ModuleVersionKey, NewModuleVersion,
    NewProviderPlatform, NewProviderVersion, Provider, ProviderKey, ProviderPlatform,
    ProviderVersion, ProviderVersionKey, RequestContext,
};

use crate::error::{DbError, DbResult};

/// Engine lifecycle: configure once, use, close once
#[async_trait]
pub trait EngineLifecycle: Send + Sync {
    /// Name the engine is registered under
    fn engine_name(&self) -> &'static str;

    /// Policy applied when a provider or module create hits an existing key
    fn create_policy(&self) -> CreatePolicy;

    /// Open connections. Fails if called twice or after [`close`](Self::close).
    async fn configure(&self, ctx: &RequestContext) -> DbResult<()>;

    /// Release connections
    async fn close(&self, ctx: &RequestContext) -> DbResult<()>;

    /// Verify the store is reachable
    async fn health_check(&self, ctx: &RequestContext) -> DbResult<()>;
}

/// Provider persistence
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Create a provider, or apply the engine's [`CreatePolicy`] if one
    /// already exists under `key`
    async fn create_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider>;

    /// Get a provider by natural key
    async fn get_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider>;
}

/// Provider version persistence
#[async_trait]
pub trait ProviderVersionStore: Send + Sync {
    /// Create a provider version
    ///
    /// # Returns
    /// * `Err(DbError::NotFound)` - If the provider or the GPG key is missing
    /// * `Err(DbError::AlreadyExists)` - If the version already exists
    async fn create_provider_version(
        &self,
        ctx: &RequestContext,
        params: &NewProviderVersion,
    ) -> DbResult<ProviderVersion>;

    /// Get one version with its platforms
    async fn get_provider_version(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
    ) -> DbResult<ProviderVersion>;

    /// All versions of a provider with their platforms, in semver order
    ///
    /// Returns `NotFound` if the provider is missing or has no versions.
    async fn get_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> DbResult<Vec<ProviderVersion>>;

    /// Version strings of a provider, in semver order
    async fn list_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> DbResult<Vec<String>> {
        let versions = self.get_provider_versions(ctx, key).await?;
        Ok(versions.into_iter().map(|v| v.version).collect())
    }
}

/// Provider platform persistence
#[async_trait]
pub trait ProviderPlatformStore: Send + Sync {
    /// Append a platform to a provider version
    ///
    /// # Returns
    /// * `Err(DbError::NotFound)` - If the version is missing
    /// * `Err(DbError::AlreadyExists)` - If the version already has this OS/arch
    async fn create_provider_platform(
        &self,
        ctx: &RequestContext,
        params: &NewProviderPlatform,
    ) -> DbResult<ProviderPlatform>;
}

/// Module persistence
#[async_trait]
pub trait ModuleStore: Send + Sync {
    async fn create_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module>;

    async fn get_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module>;

    async fn create_module_version(
        &self,
        ctx: &RequestContext,
        params: &NewModuleVersion,
    ) -> DbResult<ModuleVersion>;

    async fn get_module_version(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
    ) -> DbResult<ModuleVersion>;

    /// All versions of a module in semver order; `NotFound` if none
    async fn list_module_versions(
        &self,
        ctx: &RequestContext,
        key: &ModuleKey,
    ) -> DbResult<Vec<ModuleVersion>>;
}

/// GPG key persistence
#[async_trait]
pub trait GpgKeyStore: Send + Sync {
    /// Register an armored public key for a namespace
    ///
    /// The key ID is derived from the armor. Registering the same key twice
    /// returns the existing record.
    async fn add_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        ascii_armor: &str,
    ) -> DbResult<GpgKey>;

    async fn get_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key_id: &str,
    ) -> DbResult<GpgKey>;

    /// Every key registered for a namespace (possibly empty)
    async fn list_gpg_keys(&self, ctx: &RequestContext, namespace: &str) -> DbResult<Vec<GpgKey>>;
}

/// Everything download resolution needs about one platform binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformLookup {
    pub provider: Provider,
    pub version: ProviderVersion,
    pub platform: ProviderPlatform,
    pub signing_key: GpgKey,
}

/// Read paths used by the registry download protocol
#[async_trait]
pub trait RegistryLookup: ProviderStore + ProviderVersionStore + GpgKeyStore {
    /// Resolve provider, exact version, platform (ignoring case) and the
    /// version's signing key. Any miss is `NotFound`.
    async fn lookup_platform(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
        os: &str,
        arch: &str,
    ) -> DbResult<PlatformLookup> {
        let provider = self.get_provider(ctx, &key.provider).await?;
        let version = self.get_provider_version(ctx, key).await?;

        let platform = version
            .find_platform(os, arch)
            .cloned()
            .ok_or_else(|| DbError::not_found("provider platform", format!("{} {}/{}", key, os, arch)))?;

        let signing_key = self
            .get_gpg_key(ctx, &provider.namespace, &version.key_id)
            .await?;

        Ok(PlatformLookup {
            provider,
            version,
            platform,
            signing_key,
        })
    }
}

/// The full backend contract
pub trait Backend:
    EngineLifecycle
    + RegistryLookup
    + ProviderStore
    + ProviderVersionStore
    + ProviderPlatformStore
    + ModuleStore
    + GpgKeyStore
{
}

impl<T> Backend for T where
    T: EngineLifecycle
        + RegistryLookup
        + ProviderStore
        + ProviderVersionStore
        + ProviderPlatformStore
        + ModuleStore
        + GpgKeyStore
{
}
