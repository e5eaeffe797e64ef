//! Key/value storage engine
//!
//! Records are stored as JSON under the keys produced by
//! [`tfregistry_core::keys`]. Children live under their parent's record ID,
//! so "all versions of a provider" is a prefix scan.
//!
//! Creates use the store's put-if-absent primitive. A provider version
//! embeds its platform list; appending a platform is a compare-and-swap on
//! the version record, retried a bounded number of times before giving up
//! with a retryable contention error.

pub mod redis;
pub mod store;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tfregistry_core::model::compare_versions;
use tfregistry_core::validation::validate_segment;
use tfregistry_core::{
    key_id_from_armor, keys, CreatePolicy, GpgKey, Module, ModuleKey, ModuleVersion,
    ModuleVersionKey, NewModuleVersion, NewProviderPlatform, NewProviderVersion, Provider,
    ProviderKey, ProviderPlatform, ProviderVersion, ProviderVersionKey, RequestContext,
};
use tracing::{debug, info, instrument, warn};

use crate::backend::{
    EngineLifecycle, GpgKeyStore, ModuleStore, ProviderPlatformStore, ProviderStore,
    ProviderVersionStore, RegistryLookup,
};
use crate::error::{DbError, DbResult};
use crate::lifecycle::Lifecycle;

pub use self::redis::{RedisConnector, RedisKvStore};
pub use self::store::{KvConnector, KvStore, MemoryConnector, MemoryKvStore};

/// Attempts at appending a platform before reporting contention
pub const MAX_CAS_ATTEMPTS: usize = 8;

/// Storage engine over any [`KvStore`]
pub struct KeyValueBackend {
    name: &'static str,
    connector: Arc<dyn KvConnector>,
    store: Lifecycle<Arc<dyn KvStore>>,
    policy: CreatePolicy,
}

impl KeyValueBackend {
    pub fn new(name: &'static str, connector: Arc<dyn KvConnector>, policy: CreatePolicy) -> Self {
        Self {
            name,
            connector,
            store: Lifecycle::new(name),
            policy,
        }
    }

    /// In-process engine backed by [`MemoryKvStore`]
    pub fn memory(policy: CreatePolicy) -> Self {
        Self::new("memory", Arc::new(MemoryConnector), policy)
    }

    /// Engine backed by Redis
    pub fn redis(redis_url: impl Into<String>, policy: CreatePolicy) -> Self {
        Self::new("redis", Arc::new(RedisConnector::new(redis_url)), policy)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> DbResult<Option<(T, Vec<u8>)>> {
        let store = self.store.handle()?;
        let raw = ctx.run("kv.get", store.get(key)).await?;
        match raw {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some((value, bytes)))
            }
            None => Ok(None),
        }
    }

    async fn insert<T: Serialize + Sync>(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &T,
    ) -> DbResult<bool> {
        let store = self.store.handle()?;
        let bytes = serde_json::to_vec(value)?;
        ctx.run("kv.put_if_absent", store.put_if_absent(key, bytes))
            .await
    }

    async fn scan<T: DeserializeOwned>(&self, ctx: &RequestContext, prefix: &str) -> DbResult<Vec<T>> {
        let store = self.store.handle()?;
        let entries = ctx.run("kv.scan_prefix", store.scan_prefix(prefix)).await?;
        entries
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(DbError::from))
            .collect()
    }

    async fn find_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        self.read(ctx, &keys::module(key).render())
            .await?
            .map(|(module, _)| module)
            .ok_or_else(|| DbError::not_found("module", key))
    }
}

#[async_trait]
impl EngineLifecycle for KeyValueBackend {
    fn engine_name(&self) -> &'static str {
        self.name
    }

    fn create_policy(&self) -> CreatePolicy {
        self.policy
    }

    #[instrument(skip(self, ctx), fields(engine = self.name))]
    async fn configure(&self, ctx: &RequestContext) -> DbResult<()> {
        self.store.ensure_unconfigured()?;
        let store = ctx.run("kv.connect", self.connector.connect()).await?;
        self.store.install(store)?;
        info!("Key/value engine configured");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(engine = self.name))]
    async fn close(&self, ctx: &RequestContext) -> DbResult<()> {
        let store = self.store.take()?;
        ctx.run("kv.close", store.close()).await?;
        info!("Key/value engine closed");
        Ok(())
    }

    async fn health_check(&self, ctx: &RequestContext) -> DbResult<()> {
        let store = self.store.handle()?;
        ctx.run("kv.ping", store.ping()).await
    }
}

#[async_trait]
impl ProviderStore for KeyValueBackend {
    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn create_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider> {
        debug!("Creating provider");

        let provider = Provider::new(key);
        if self.insert(ctx, &keys::provider(key).render(), &provider).await? {
            info!(provider_id = %provider.id, "Created provider");
            return Ok(provider);
        }

        match self.policy {
            CreatePolicy::CreateOrGet => self.get_provider(ctx, key).await,
            CreatePolicy::CreateExclusive => Err(DbError::already_exists("provider", key)),
        }
    }

    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn get_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider> {
        self.read(ctx, &keys::provider(key).render())
            .await?
            .map(|(provider, _)| provider)
            .ok_or_else(|| DbError::not_found("provider", key))
    }
}

#[async_trait]
impl ProviderVersionStore for KeyValueBackend {
    #[instrument(skip(self, ctx, params), fields(version = %params.key, key_id = %params.key_id))]
    async fn create_provider_version(
        &self,
        ctx: &RequestContext,
        params: &NewProviderVersion,
    ) -> DbResult<ProviderVersion> {
        debug!("Creating provider version");

        let provider = self.get_provider(ctx, &params.key.provider).await?;

        let gpg_key = keys::gpg_key(&provider.namespace, &params.key_id).render();
        if self.read::<GpgKey>(ctx, &gpg_key).await?.is_none() {
            return Err(DbError::not_found(
                "gpg key",
                format!("{}/{}", provider.namespace, params.key_id),
            ));
        }

        let version = ProviderVersion::new(provider.id, params);
        let key = keys::provider_version(provider.id, &version.version).render();
        if !self.insert(ctx, &key, &version).await? {
            return Err(DbError::already_exists("provider version", &params.key));
        }

        info!(version_id = %version.id, "Created provider version");
        Ok(version)
    }

    #[instrument(skip(self, ctx), fields(version = %key))]
    async fn get_provider_version(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
    ) -> DbResult<ProviderVersion> {
        let provider = self.get_provider(ctx, &key.provider).await?;
        self.read(ctx, &keys::provider_version(provider.id, &key.version).render())
            .await?
            .map(|(version, _)| version)
            .ok_or_else(|| DbError::not_found("provider version", key))
    }

    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn get_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> DbResult<Vec<ProviderVersion>> {
        let provider = self.get_provider(ctx, key).await?;
        let mut versions: Vec<ProviderVersion> = self
            .scan(ctx, &keys::provider_versions_prefix(provider.id))
            .await?;

        if versions.is_empty() {
            return Err(DbError::not_found("provider versions", key));
        }

        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        debug!("Found {} versions", versions.len());
        Ok(versions)
    }
}

#[async_trait]
impl ProviderPlatformStore for KeyValueBackend {
    #[instrument(skip(self, ctx, params), fields(version = %params.version, platform = %params.platform))]
    async fn create_provider_platform(
        &self,
        ctx: &RequestContext,
        params: &NewProviderPlatform,
    ) -> DbResult<ProviderPlatform> {
        debug!("Creating provider platform");

        let provider = self.get_provider(ctx, &params.version.provider).await?;
        let key = keys::provider_version(provider.id, &params.version.version).render();
        let store = self.store.handle()?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut version, current) = self
                .read::<ProviderVersion>(ctx, &key)
                .await?
                .ok_or_else(|| DbError::not_found("provider version", &params.version))?;

            if version.has_platform(&params.platform) {
                return Err(DbError::already_exists(
                    "provider platform",
                    format!("{} {}", params.version, params.platform),
                ));
            }
            if version.platforms.iter().any(|p| p.filename == params.filename) {
                return Err(DbError::already_exists(
                    "provider platform file",
                    format!("{} {}", params.version, params.filename),
                ));
            }

            let platform = ProviderPlatform::new(version.id, params);
            version.platforms.push(platform.clone());
            let updated = serde_json::to_vec(&version)?;

            let swapped = ctx
                .run("kv.compare_and_swap", store.compare_and_swap(&key, &current, updated))
                .await?;
            if swapped {
                info!(platform_id = %platform.id, "Created provider platform");
                return Ok(platform);
            }

            warn!(attempt, "Provider version changed during platform append, retrying");
        }

        Err(DbError::Contention(format!(
            "platform list of {} changed {} times during append",
            params.version, MAX_CAS_ATTEMPTS
        )))
    }
}

#[async_trait]
impl ModuleStore for KeyValueBackend {
    #[instrument(skip(self, ctx), fields(module = %key))]
    async fn create_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        debug!("Creating module");

        let module = Module::new(key);
        if self.insert(ctx, &keys::module(key).render(), &module).await? {
            info!(module_id = %module.id, "Created module");
            return Ok(module);
        }

        match self.policy {
            CreatePolicy::CreateOrGet => self.find_module(ctx, key).await,
            CreatePolicy::CreateExclusive => Err(DbError::already_exists("module", key)),
        }
    }

    async fn get_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        self.find_module(ctx, key).await
    }

    #[instrument(skip(self, ctx, params), fields(version = %params.key))]
    async fn create_module_version(
        &self,
        ctx: &RequestContext,
        params: &NewModuleVersion,
    ) -> DbResult<ModuleVersion> {
        let module = self.find_module(ctx, &params.key.module).await?;
        let version = ModuleVersion::new(module.id, params);
        let key = keys::module_version(module.id, &version.version).render();

        if !self.insert(ctx, &key, &version).await? {
            return Err(DbError::already_exists("module version", &params.key));
        }

        info!(version_id = %version.id, "Created module version");
        Ok(version)
    }

    async fn get_module_version(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
    ) -> DbResult<ModuleVersion> {
        let module = self.find_module(ctx, &key.module).await?;
        self.read(ctx, &keys::module_version(module.id, &key.version).render())
            .await?
            .map(|(version, _)| version)
            .ok_or_else(|| DbError::not_found("module version", key))
    }

    async fn list_module_versions(
        &self,
        ctx: &RequestContext,
        key: &ModuleKey,
    ) -> DbResult<Vec<ModuleVersion>> {
        let module = self.find_module(ctx, key).await?;
        let mut versions: Vec<ModuleVersion> = self
            .scan(ctx, &keys::module_versions_prefix(module.id))
            .await?;

        if versions.is_empty() {
            return Err(DbError::not_found("module versions", key));
        }

        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }
}

#[async_trait]
impl GpgKeyStore for KeyValueBackend {
    #[instrument(skip(self, ctx, ascii_armor), fields(namespace = %namespace))]
    async fn add_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        ascii_armor: &str,
    ) -> DbResult<GpgKey> {
        validate_segment("namespace", namespace)?;
        let key_id = key_id_from_armor(ascii_armor)?;
        let key = keys::gpg_key(namespace, &key_id).render();

        let gpg_key = GpgKey::new(namespace, &key_id, ascii_armor);
        if self.insert(ctx, &key, &gpg_key).await? {
            info!(key_id = %key_id, "Added GPG key");
            return Ok(gpg_key);
        }

        debug!(key_id = %key_id, "GPG key already registered");
        self.get_gpg_key(ctx, namespace, &key_id).await
    }

    async fn get_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key_id: &str,
    ) -> DbResult<GpgKey> {
        let key_id = key_id.to_ascii_uppercase();
        self.read(ctx, &keys::gpg_key(namespace, &key_id).render())
            .await?
            .map(|(key, _)| key)
            .ok_or_else(|| DbError::not_found("gpg key", format!("{}/{}", namespace, key_id)))
    }

    async fn list_gpg_keys(&self, ctx: &RequestContext, namespace: &str) -> DbResult<Vec<GpgKey>> {
        self.scan(ctx, &keys::gpg_keys_prefix(namespace)).await
    }
}

impl RegistryLookup for KeyValueBackend {}
