//! Document storage engine
//!
//! Each record is one document addressed by the (partition, sort) split of
//! its storage key; listing the children of a record is a partition query.
//! Creates are conditional puts. A provider version document carries its
//! platforms as an item list, and platforms are added with a conditional
//! list-append keyed by `os/arch`, so concurrent appends neither overwrite
//! each other nor admit duplicates.

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod table;

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
    StorageKey,
};
use tracing::{debug, info, instrument};

use crate::backend::{
    EngineLifecycle, GpgKeyStore, ModuleStore, ProviderPlatformStore, ProviderStore,
    ProviderVersionStore, RegistryLookup,
};
use crate::error::{DbError, DbResult};
use crate::lifecycle::Lifecycle;

#[cfg(feature = "dynamodb")]
pub use self::dynamodb::{DynamoConnector, DynamoDocumentTable};
pub use self::table::{
    AppendOutcome, Document, DocumentConnector, DocumentTable, MemoryDocumentConnector,
    MemoryDocumentTable,
};

/// Storage engine over any [`DocumentTable`]
pub struct DocumentBackend {
    name: &'static str,
    connector: Arc<dyn DocumentConnector>,
    table: Lifecycle<Arc<dyn DocumentTable>>,
    policy: CreatePolicy,
}

impl DocumentBackend {
    pub fn new(
        name: &'static str,
        connector: Arc<dyn DocumentConnector>,
        policy: CreatePolicy,
    ) -> Self {
        Self {
            name,
            connector,
            table: Lifecycle::new(name),
            policy,
        }
    }

    /// In-process engine backed by [`MemoryDocumentTable`]
    pub fn memory(policy: CreatePolicy) -> Self {
        Self::new("document-memory", Arc::new(MemoryDocumentConnector), policy)
    }

    /// Engine backed by a DynamoDB table
    #[cfg(feature = "dynamodb")]
    pub fn dynamodb(table: impl Into<String>, policy: CreatePolicy) -> Self {
        Self::new("dynamodb", Arc::new(DynamoConnector::new(table)), policy)
    }

    async fn fetch(&self, ctx: &RequestContext, key: &StorageKey) -> DbResult<Option<Document>> {
        let table = self.table.handle()?;
        ctx.run("document.get", table.get(key)).await
    }

    async fn fetch_record<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        key: &StorageKey,
    ) -> DbResult<Option<T>> {
        match self.fetch(ctx, key).await? {
            Some(document) => Ok(Some(serde_json::from_str(&document.data)?)),
            None => Ok(None),
        }
    }

    async fn put_record<T: Serialize + Sync>(
        &self,
        ctx: &RequestContext,
        key: &StorageKey,
        record: &T,
    ) -> DbResult<bool> {
        let table = self.table.handle()?;
        let document = Document::new(key, serde_json::to_string(record)?);
        ctx.run("document.put_if_absent", table.put_if_absent(document))
            .await
    }

    async fn query(&self, ctx: &RequestContext, partition: &str) -> DbResult<Vec<Document>> {
        let table = self.table.handle()?;
        ctx.run("document.query", table.query(partition)).await
    }

    async fn find_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        self.fetch_record(ctx, &keys::module(key))
            .await?
            .ok_or_else(|| DbError::not_found("module", key))
    }
}

/// Rebuild a provider version from its document and platform items
fn version_from_document(document: &Document) -> DbResult<ProviderVersion> {
    let mut version: ProviderVersion = serde_json::from_str(&document.data)?;
    version.platforms = document
        .items
        .iter()
        .map(|item| serde_json::from_str(item).map_err(DbError::from))
        .collect::<DbResult<_>>()?;
    Ok(version)
}

#[async_trait]
impl EngineLifecycle for DocumentBackend {
    fn engine_name(&self) -> &'static str {
        self.name
    }

    fn create_policy(&self) -> CreatePolicy {
        self.policy
    }

    #[instrument(skip(self, ctx), fields(engine = self.name))]
    async fn configure(&self, ctx: &RequestContext) -> DbResult<()> {
        self.table.ensure_unconfigured()?;
        let table = ctx.run("document.connect", self.connector.connect()).await?;
        self.table.install(table)?;
        info!("Document engine configured");
        Ok(())
    }

    #[instrument(skip(self, _ctx), fields(engine = self.name))]
    async fn close(&self, _ctx: &RequestContext) -> DbResult<()> {
        drop(self.table.take()?);
        info!("Document engine closed");
        Ok(())
    }

    async fn health_check(&self, ctx: &RequestContext) -> DbResult<()> {
        let table = self.table.handle()?;
        ctx.run("document.ping", table.ping()).await
    }
}

#[async_trait]
impl ProviderStore for DocumentBackend {
    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn create_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider> {
        debug!("Creating provider");

        let provider = Provider::new(key);
        if self.put_record(ctx, &keys::provider(key), &provider).await? {
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
        self.fetch_record(ctx, &keys::provider(key))
            .await?
            .ok_or_else(|| DbError::not_found("provider", key))
    }
}

#[async_trait]
impl ProviderVersionStore for DocumentBackend {
    #[instrument(skip(self, ctx, params), fields(version = %params.key, key_id = %params.key_id))]
    async fn create_provider_version(
        &self,
        ctx: &RequestContext,
        params: &NewProviderVersion,
    ) -> DbResult<ProviderVersion> {
        debug!("Creating provider version");

        let provider = self.get_provider(ctx, &params.key.provider).await?;
        let gpg_key = keys::gpg_key(&provider.namespace, &params.key_id);
        if self.fetch(ctx, &gpg_key).await?.is_none() {
            return Err(DbError::not_found(
                "gpg key",
                format!("{}/{}", provider.namespace, params.key_id),
            ));
        }

        let version = ProviderVersion::new(provider.id, params);
        let key = keys::provider_version(provider.id, &version.version);
        if !self.put_record(ctx, &key, &version).await? {
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
        let document = self
            .fetch(ctx, &keys::provider_version(provider.id, &key.version))
            .await?
            .ok_or_else(|| DbError::not_found("provider version", key))?;
        version_from_document(&document)
    }

    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn get_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> DbResult<Vec<ProviderVersion>> {
        let provider = self.get_provider(ctx, key).await?;
        let partition = keys::provider_version(provider.id, "").partition;

        let mut versions = self
            .query(ctx, &partition)
            .await?
            .iter()
            .map(version_from_document)
            .collect::<DbResult<Vec<_>>>()?;

        if versions.is_empty() {
            return Err(DbError::not_found("provider versions", key));
        }

        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }
}

#[async_trait]
impl ProviderPlatformStore for DocumentBackend {
    #[instrument(skip(self, ctx, params), fields(version = %params.version, platform = %params.platform))]
    async fn create_provider_platform(
        &self,
        ctx: &RequestContext,
        params: &NewProviderPlatform,
    ) -> DbResult<ProviderPlatform> {
        debug!("Creating provider platform");

        let version = self.get_provider_version(ctx, &params.version).await?;
        let key = keys::provider_version(version.provider_id, &version.version);
        let platform = ProviderPlatform::new(version.id, params);
        let item = serde_json::to_string(&platform)?;
        let item_key = params.platform.to_string();

        let table = self.table.handle()?;
        let outcome = ctx
            .run("document.append_unique", table.append_unique(&key, &item_key, item))
            .await?;

        match outcome {
            AppendOutcome::Appended => {
                info!(platform_id = %platform.id, "Created provider platform");
                Ok(platform)
            }
            AppendOutcome::Duplicate => Err(DbError::already_exists(
                "provider platform",
                format!("{} {}", params.version, params.platform),
            )),
            AppendOutcome::Missing => Err(DbError::not_found("provider version", &params.version)),
        }
    }
}

#[async_trait]
impl ModuleStore for DocumentBackend {
    #[instrument(skip(self, ctx), fields(module = %key))]
    async fn create_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        let module = Module::new(key);
        if self.put_record(ctx, &keys::module(key), &module).await? {
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
        let key = keys::module_version(module.id, &version.version);

        if !self.put_record(ctx, &key, &version).await? {
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
        self.fetch_record(ctx, &keys::module_version(module.id, &key.version))
            .await?
            .ok_or_else(|| DbError::not_found("module version", key))
    }

    async fn list_module_versions(
        &self,
        ctx: &RequestContext,
        key: &ModuleKey,
    ) -> DbResult<Vec<ModuleVersion>> {
        let module = self.find_module(ctx, key).await?;
        let partition = keys::module_version(module.id, "").partition;

        let mut versions = self
            .query(ctx, &partition)
            .await?
            .iter()
            .map(|d| serde_json::from_str::<ModuleVersion>(&d.data).map_err(DbError::from))
            .collect::<DbResult<Vec<_>>>()?;

        if versions.is_empty() {
            return Err(DbError::not_found("module versions", key));
        }

        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }
}

#[async_trait]
impl GpgKeyStore for DocumentBackend {
    #[instrument(skip(self, ctx, ascii_armor), fields(namespace = %namespace))]
    async fn add_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        ascii_armor: &str,
    ) -> DbResult<GpgKey> {
        validate_segment("namespace", namespace)?;
        let key_id = key_id_from_armor(ascii_armor)?;

        let gpg_key = GpgKey::new(namespace, &key_id, ascii_armor);
        if self
            .put_record(ctx, &keys::gpg_key(namespace, &key_id), &gpg_key)
            .await?
        {
            info!(key_id = %key_id, "Added GPG key");
            return Ok(gpg_key);
        }

        self.get_gpg_key(ctx, namespace, &key_id).await
    }

    async fn get_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key_id: &str,
    ) -> DbResult<GpgKey> {
        let key_id = key_id.to_ascii_uppercase();
        self.fetch_record(ctx, &keys::gpg_key(namespace, &key_id))
            .await?
            .ok_or_else(|| DbError::not_found("gpg key", format!("{}/{}", namespace, key_id)))
    }

    async fn list_gpg_keys(&self, ctx: &RequestContext, namespace: &str) -> DbResult<Vec<GpgKey>> {
        let partition = keys::gpg_key(namespace, "").partition;
        self.query(ctx, &partition)
            .await?
            .iter()
            .map(|d| serde_json::from_str(&d.data).map_err(DbError::from))
            .collect()
    }
}

impl RegistryLookup for DocumentBackend {}
