//! Relational storage engine
//!
//! Runs on PostgreSQL or SQLite through sqlx's `Any` driver. Every
//! operation acquires a pooled connection (or a transaction, for creates
//! that check a parent first) and releases it before returning, on error
//! paths included. Uniqueness comes from the schema's composite
//! constraints; a unique violation is reported as `AlreadyExists` naming
//! the natural key.

pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use std::collections::HashMap;
use tfregistry_core::model::compare_versions;
use tfregistry_core::validation::validate_segment;
use tfregistry_core::{
    key_id_from_armor, CreatePolicy, GpgKey, Module, ModuleKey, ModuleVersion, ModuleVersionKey,
    NewModuleVersion, NewProviderPlatform, NewProviderVersion, Provider, ProviderKey,
    ProviderPlatform, ProviderVersion, ProviderVersionKey, RecordId, RequestContext, Shasum,
};
use tracing::{debug, info, instrument};

use crate::backend::{
    EngineLifecycle, GpgKeyStore, ModuleStore, ProviderPlatformStore, ProviderStore,
    ProviderVersionStore, RegistryLookup,
};
use crate::error::{DbError, DbResult};
use crate::lifecycle::Lifecycle;
use crate::pool::{close_pool, create_pool, verify_pool_health, PoolConfig};

const SELECT_PROVIDER: &str = r#"
    SELECT id, organization, registry, namespace, name, created_at
    FROM providers
    WHERE organization = $1 AND registry = $2 AND namespace = $3 AND name = $4
"#;

const SELECT_PROVIDER_VERSION: &str = r#"
    SELECT v.id, v.provider_id, v.version, v.protocols, v.key_id, v.created_at
    FROM provider_versions v
    JOIN providers p ON p.id = v.provider_id
    WHERE p.organization = $1 AND p.registry = $2 AND p.namespace = $3 AND p.name = $4
      AND v.version = $5
"#;

const SELECT_MODULE: &str = r#"
    SELECT id, organization, registry, namespace, name, system, created_at
    FROM modules
    WHERE organization = $1 AND registry = $2 AND namespace = $3 AND name = $4 AND system = $5
"#;

/// Relational storage engine
pub struct SqlBackend {
    config: PoolConfig,
    pool: Lifecycle<AnyPool>,
    policy: CreatePolicy,
}

impl SqlBackend {
    pub fn new(config: PoolConfig, policy: CreatePolicy) -> Self {
        Self {
            config,
            pool: Lifecycle::new("sql"),
            policy,
        }
    }

    /// Engine on a private in-memory SQLite database
    pub fn sqlite_memory(policy: CreatePolicy) -> Self {
        Self::new(PoolConfig::sqlite_memory(), policy)
    }

    fn pool(&self) -> DbResult<AnyPool> {
        self.pool.handle()
    }

    async fn find_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider> {
        let pool = self.pool()?;
        let row = ctx
            .run("sql.get_provider", async {
                sqlx::query(SELECT_PROVIDER)
                    .bind(key.organization.as_str())
                    .bind(key.registry.as_str())
                    .bind(key.namespace.as_str())
                    .bind(key.name.as_str())
                    .fetch_optional(&pool)
                    .await
                    .map_err(DbError::from)
            })
            .await?;

        match row {
            Some(row) => provider_from_row(&row),
            None => Err(DbError::not_found("provider", key)),
        }
    }

    async fn find_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        let pool = self.pool()?;
        let row = ctx
            .run("sql.get_module", async {
                sqlx::query(SELECT_MODULE)
                    .bind(key.organization.as_str())
                    .bind(key.registry.as_str())
                    .bind(key.namespace.as_str())
                    .bind(key.name.as_str())
                    .bind(key.system.as_str())
                    .fetch_optional(&pool)
                    .await
                    .map_err(DbError::from)
            })
            .await?;

        match row {
            Some(row) => module_from_row(&row),
            None => Err(DbError::not_found("module", key)),
        }
    }

    async fn platforms_of(
        &self,
        ctx: &RequestContext,
        version_ids: &[RecordId],
    ) -> DbResult<HashMap<RecordId, Vec<ProviderPlatform>>> {
        let pool = self.pool()?;
        let mut grouped: HashMap<RecordId, Vec<ProviderPlatform>> = HashMap::new();

        for version_id in version_ids {
            let rows = ctx
                .run("sql.list_platforms", async {
                    sqlx::query(
                        r#"
                        SELECT id, provider_version_id, os, arch, filename, shasum, created_at
                        FROM provider_platforms
                        WHERE provider_version_id = $1
                        ORDER BY created_at, id
                        "#,
                    )
                    .bind(version_id.to_string())
                    .fetch_all(&pool)
                    .await
                    .map_err(DbError::from)
                })
                .await?;

            let platforms = rows
                .iter()
                .map(platform_from_row)
                .collect::<DbResult<Vec<_>>>()?;
            grouped.insert(*version_id, platforms);
        }

        Ok(grouped)
    }

    async fn with_platforms(
        &self,
        ctx: &RequestContext,
        mut versions: Vec<ProviderVersion>,
    ) -> DbResult<Vec<ProviderVersion>> {
        let ids: Vec<RecordId> = versions.iter().map(|v| v.id).collect();
        let mut platforms = self.platforms_of(ctx, &ids).await?;
        for version in &mut versions {
            version.platforms = platforms.remove(&version.id).unwrap_or_default();
        }
        Ok(versions)
    }
}

#[async_trait]
impl EngineLifecycle for SqlBackend {
    fn engine_name(&self) -> &'static str {
        "sql"
    }

    fn create_policy(&self) -> CreatePolicy {
        self.policy
    }

    #[instrument(skip(self, ctx))]
    async fn configure(&self, ctx: &RequestContext) -> DbResult<()> {
        self.pool.ensure_unconfigured()?;
        let pool = ctx
            .run("sql.connect", async {
                let pool = create_pool(&self.config).await?;
                schema::apply(&pool).await?;
                Ok::<_, DbError>(pool)
            })
            .await?;
        self.pool.install(pool)?;
        info!("Relational engine configured");
        Ok(())
    }

    #[instrument(skip(self, _ctx))]
    async fn close(&self, _ctx: &RequestContext) -> DbResult<()> {
        let pool = self.pool.take()?;
        close_pool(pool).await;
        Ok(())
    }

    async fn health_check(&self, ctx: &RequestContext) -> DbResult<()> {
        let pool = self.pool()?;
        ctx.run("sql.health_check", verify_pool_health(&pool)).await
    }
}

#[async_trait]
impl ProviderStore for SqlBackend {
    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn create_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider> {
        debug!("Creating provider");

        let pool = self.pool()?;
        let provider = Provider::new(key);
        let inserted = ctx
            .run("sql.create_provider", async {
                sqlx::query(
                    r#"
                    INSERT INTO providers (id, organization, registry, namespace, name, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(provider.id.to_string())
                .bind(provider.organization.as_str())
                .bind(provider.registry.as_str())
                .bind(provider.namespace.as_str())
                .bind(provider.name.as_str())
                .bind(timestamp(&provider.created_at))
                .execute(&pool)
                .await
                .map_err(|e| insert_error(e, || DbError::already_exists("provider", key)))
            })
            .await;

        match inserted {
            Ok(_) => {
                info!(provider_id = %provider.id, "Created provider");
                Ok(provider)
            }
            Err(DbError::AlreadyExists(_)) if self.policy == CreatePolicy::CreateOrGet => {
                self.find_provider(ctx, key).await
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn get_provider(&self, ctx: &RequestContext, key: &ProviderKey) -> DbResult<Provider> {
        self.find_provider(ctx, key).await
    }
}

#[async_trait]
impl ProviderVersionStore for SqlBackend {
    #[instrument(skip(self, ctx, params), fields(version = %params.key, key_id = %params.key_id))]
    async fn create_provider_version(
        &self,
        ctx: &RequestContext,
        params: &NewProviderVersion,
    ) -> DbResult<ProviderVersion> {
        debug!("Creating provider version");

        let pool = self.pool()?;
        let provider_key = &params.key.provider;

        let version = ctx
            .run("sql.create_provider_version", async {
                let mut tx = pool.begin().await?;

                let row = sqlx::query(SELECT_PROVIDER)
                    .bind(provider_key.organization.as_str())
                    .bind(provider_key.registry.as_str())
                    .bind(provider_key.namespace.as_str())
                    .bind(provider_key.name.as_str())
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| DbError::not_found("provider", provider_key))?;
                let provider = provider_from_row(&row)?;

                let gpg_key = sqlx::query("SELECT id FROM gpg_keys WHERE namespace = $1 AND key_id = $2")
                    .bind(provider.namespace.as_str())
                    .bind(params.key_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
                if gpg_key.is_none() {
                    return Err(DbError::not_found(
                        "gpg key",
                        format!("{}/{}", provider.namespace, params.key_id),
                    ));
                }

                let version = ProviderVersion::new(provider.id, params);
                sqlx::query(
                    r#"
                    INSERT INTO provider_versions (id, provider_id, version, protocols, key_id, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(version.id.to_string())
                .bind(version.provider_id.to_string())
                .bind(version.version.as_str())
                .bind(serde_json::to_string(&version.protocols)?)
                .bind(version.key_id.as_str())
                .bind(timestamp(&version.created_at))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    insert_error(e, || DbError::already_exists("provider version", &params.key))
                })?;

                tx.commit().await?;
                Ok::<_, DbError>(version)
            })
            .await?;

        info!(version_id = %version.id, "Created provider version");
        Ok(version)
    }

    #[instrument(skip(self, ctx), fields(version = %key))]
    async fn get_provider_version(
        &self,
        ctx: &RequestContext,
        key: &ProviderVersionKey,
    ) -> DbResult<ProviderVersion> {
        let pool = self.pool()?;
        let provider = &key.provider;
        let row = ctx
            .run("sql.get_provider_version", async {
                sqlx::query(SELECT_PROVIDER_VERSION)
                    .bind(provider.organization.as_str())
                    .bind(provider.registry.as_str())
                    .bind(provider.namespace.as_str())
                    .bind(provider.name.as_str())
                    .bind(key.version.as_str())
                    .fetch_optional(&pool)
                    .await
                    .map_err(DbError::from)
            })
            .await?
            .ok_or_else(|| DbError::not_found("provider version", key))?;

        let version = version_from_row(&row)?;
        let mut versions = self.with_platforms(ctx, vec![version]).await?;
        versions
            .pop()
            .ok_or_else(|| DbError::Internal("version lost while loading platforms".to_string()))
    }

    #[instrument(skip(self, ctx), fields(provider = %key))]
    async fn get_provider_versions(
        &self,
        ctx: &RequestContext,
        key: &ProviderKey,
    ) -> DbResult<Vec<ProviderVersion>> {
        let provider = self.find_provider(ctx, key).await?;
        let pool = self.pool()?;
        let rows = ctx
            .run("sql.list_provider_versions", async {
                sqlx::query(
                    r#"
                    SELECT id, provider_id, version, protocols, key_id, created_at
                    FROM provider_versions
                    WHERE provider_id = $1
                    "#,
                )
                .bind(provider.id.to_string())
                .fetch_all(&pool)
                .await
                .map_err(DbError::from)
            })
            .await?;

        if rows.is_empty() {
            return Err(DbError::not_found("provider versions", key));
        }

        let versions = rows
            .iter()
            .map(version_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        let mut versions = self.with_platforms(ctx, versions).await?;
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }
}

#[async_trait]
impl ProviderPlatformStore for SqlBackend {
    #[instrument(skip(self, ctx, params), fields(version = %params.version, platform = %params.platform))]
    async fn create_provider_platform(
        &self,
        ctx: &RequestContext,
        params: &NewProviderPlatform,
    ) -> DbResult<ProviderPlatform> {
        debug!("Creating provider platform");

        let pool = self.pool()?;
        let key = &params.version;

        let platform = ctx
            .run("sql.create_provider_platform", async {
                let mut tx = pool.begin().await?;

                let row = sqlx::query(SELECT_PROVIDER_VERSION)
                    .bind(key.provider.organization.as_str())
                    .bind(key.provider.registry.as_str())
                    .bind(key.provider.namespace.as_str())
                    .bind(key.provider.name.as_str())
                    .bind(key.version.as_str())
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| DbError::not_found("provider version", key))?;
                let version_id = parse_id(&row.try_get::<String, _>("id")?)?;

                let platform = ProviderPlatform::new(version_id, params);
                sqlx::query(
                    r#"
                    INSERT INTO provider_platforms
                        (id, provider_version_id, os, arch, filename, shasum, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(platform.id.to_string())
                .bind(platform.provider_version_id.to_string())
                .bind(platform.os.to_ascii_lowercase())
                .bind(platform.arch.to_ascii_lowercase())
                .bind(platform.filename.as_str())
                .bind(platform.shasum.as_str())
                .bind(timestamp(&platform.created_at))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    insert_error(e, || {
                        DbError::already_exists(
                            "provider platform",
                            format!("{} {}", key, params.platform),
                        )
                    })
                })?;

                tx.commit().await?;
                Ok::<_, DbError>(platform)
            })
            .await?;

        info!(platform_id = %platform.id, "Created provider platform");
        Ok(platform)
    }
}

#[async_trait]
impl ModuleStore for SqlBackend {
    #[instrument(skip(self, ctx), fields(module = %key))]
    async fn create_module(&self, ctx: &RequestContext, key: &ModuleKey) -> DbResult<Module> {
        let pool = self.pool()?;
        let module = Module::new(key);
        let inserted = ctx
            .run("sql.create_module", async {
                sqlx::query(
                    r#"
                    INSERT INTO modules (id, organization, registry, namespace, name, system, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(module.id.to_string())
                .bind(module.organization.as_str())
                .bind(module.registry.as_str())
                .bind(module.namespace.as_str())
                .bind(module.name.as_str())
                .bind(module.system.as_str())
                .bind(timestamp(&module.created_at))
                .execute(&pool)
                .await
                .map_err(|e| insert_error(e, || DbError::already_exists("module", key)))
            })
            .await;

        match inserted {
            Ok(_) => {
                info!(module_id = %module.id, "Created module");
                Ok(module)
            }
            Err(DbError::AlreadyExists(_)) if self.policy == CreatePolicy::CreateOrGet => {
                self.find_module(ctx, key).await
            }
            Err(e) => Err(e),
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
        let pool = self.pool()?;
        let version = ModuleVersion::new(module.id, params);

        ctx.run("sql.create_module_version", async {
            sqlx::query(
                r#"
                INSERT INTO module_versions (id, module_id, version, source_ref, filename, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(version.id.to_string())
            .bind(version.module_id.to_string())
            .bind(version.version.as_str())
            .bind(version.source_ref.as_str())
            .bind(version.filename.as_str())
            .bind(timestamp(&version.created_at))
            .execute(&pool)
            .await
            .map_err(|e| insert_error(e, || DbError::already_exists("module version", &params.key)))
        })
        .await?;

        info!(version_id = %version.id, "Created module version");
        Ok(version)
    }

    async fn get_module_version(
        &self,
        ctx: &RequestContext,
        key: &ModuleVersionKey,
    ) -> DbResult<ModuleVersion> {
        let module = self.find_module(ctx, &key.module).await?;
        let pool = self.pool()?;
        let row = ctx
            .run("sql.get_module_version", async {
                sqlx::query(
                    r#"
                    SELECT id, module_id, version, source_ref, filename, created_at
                    FROM module_versions
                    WHERE module_id = $1 AND version = $2
                    "#,
                )
                .bind(module.id.to_string())
                .bind(key.version.as_str())
                .fetch_optional(&pool)
                .await
                .map_err(DbError::from)
            })
            .await?
            .ok_or_else(|| DbError::not_found("module version", key))?;

        module_version_from_row(&row)
    }

    async fn list_module_versions(
        &self,
        ctx: &RequestContext,
        key: &ModuleKey,
    ) -> DbResult<Vec<ModuleVersion>> {
        let module = self.find_module(ctx, key).await?;
        let pool = self.pool()?;
        let rows = ctx
            .run("sql.list_module_versions", async {
                sqlx::query(
                    r#"
                    SELECT id, module_id, version, source_ref, filename, created_at
                    FROM module_versions
                    WHERE module_id = $1
                    "#,
                )
                .bind(module.id.to_string())
                .fetch_all(&pool)
                .await
                .map_err(DbError::from)
            })
            .await?;

        if rows.is_empty() {
            return Err(DbError::not_found("module versions", key));
        }

        let mut versions = rows
            .iter()
            .map(module_version_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(versions)
    }
}

#[async_trait]
impl GpgKeyStore for SqlBackend {
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
        let pool = self.pool()?;

        let inserted = ctx
            .run("sql.add_gpg_key", async {
                sqlx::query(
                    r#"
                    INSERT INTO gpg_keys (id, namespace, key_id, ascii_armor, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(gpg_key.id.to_string())
                .bind(gpg_key.namespace.as_str())
                .bind(gpg_key.key_id.as_str())
                .bind(gpg_key.ascii_armor.as_str())
                .bind(timestamp(&gpg_key.created_at))
                .execute(&pool)
                .await
                .map_err(|e| {
                    insert_error(e, || {
                        DbError::already_exists("gpg key", format!("{}/{}", namespace, key_id))
                    })
                })
            })
            .await;

        match inserted {
            Ok(_) => {
                info!(key_id = %key_id, "Added GPG key");
                Ok(gpg_key)
            }
            Err(DbError::AlreadyExists(_)) => self.get_gpg_key(ctx, namespace, &key_id).await,
            Err(e) => Err(e),
        }
    }

    async fn get_gpg_key(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        key_id: &str,
    ) -> DbResult<GpgKey> {
        let key_id = key_id.to_ascii_uppercase();
        let pool = self.pool()?;
        let row = ctx
            .run("sql.get_gpg_key", async {
                sqlx::query(
                    r#"
                    SELECT id, namespace, key_id, ascii_armor, created_at
                    FROM gpg_keys
                    WHERE namespace = $1 AND key_id = $2
                    "#,
                )
                .bind(namespace)
                .bind(key_id.as_str())
                .fetch_optional(&pool)
                .await
                .map_err(DbError::from)
            })
            .await?
            .ok_or_else(|| DbError::not_found("gpg key", format!("{}/{}", namespace, key_id)))?;

        gpg_key_from_row(&row)
    }

    async fn list_gpg_keys(&self, ctx: &RequestContext, namespace: &str) -> DbResult<Vec<GpgKey>> {
        let pool = self.pool()?;
        let rows = ctx
            .run("sql.list_gpg_keys", async {
                sqlx::query(
                    r#"
                    SELECT id, namespace, key_id, ascii_armor, created_at
                    FROM gpg_keys
                    WHERE namespace = $1
                    ORDER BY created_at, id
                    "#,
                )
                .bind(namespace)
                .fetch_all(&pool)
                .await
                .map_err(DbError::from)
            })
            .await?;

        rows.iter().map(gpg_key_from_row).collect()
    }
}

impl RegistryLookup for SqlBackend {}

/// Rewrite a unique violation into a conflict naming the natural key
fn insert_error(err: sqlx::Error, conflict: impl FnOnce() -> DbError) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return conflict();
        }
    }
    DbError::from(err)
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidData(format!("Invalid timestamp '{}': {}", value, e)))
}

fn parse_id(value: &str) -> DbResult<RecordId> {
    RecordId::parse(value).map_err(|e| DbError::InvalidData(e.to_string()))
}

fn provider_from_row(row: &AnyRow) -> DbResult<Provider> {
    Ok(Provider {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        organization: row.try_get("organization")?,
        registry: row
            .try_get::<String, _>("registry")?
            .parse()
            .map_err(|e: tfregistry_core::RegistryError| DbError::InvalidData(e.to_string()))?,
        namespace: row.try_get("namespace")?,
        name: row.try_get("name")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn version_from_row(row: &AnyRow) -> DbResult<ProviderVersion> {
    let protocols: String = row.try_get("protocols")?;
    Ok(ProviderVersion {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        provider_id: parse_id(&row.try_get::<String, _>("provider_id")?)?,
        version: row.try_get("version")?,
        protocols: serde_json::from_str(&protocols)?,
        key_id: row.try_get("key_id")?,
        platforms: Vec::new(),
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn platform_from_row(row: &AnyRow) -> DbResult<ProviderPlatform> {
    Ok(ProviderPlatform {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        provider_version_id: parse_id(&row.try_get::<String, _>("provider_version_id")?)?,
        os: row.try_get("os")?,
        arch: row.try_get("arch")?,
        filename: row.try_get("filename")?,
        shasum: Shasum::new(row.try_get::<String, _>("shasum")?)
            .map_err(|e| DbError::InvalidData(e.to_string()))?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn gpg_key_from_row(row: &AnyRow) -> DbResult<GpgKey> {
    Ok(GpgKey {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        namespace: row.try_get("namespace")?,
        key_id: row.try_get("key_id")?,
        ascii_armor: row.try_get("ascii_armor")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn module_from_row(row: &AnyRow) -> DbResult<Module> {
    Ok(Module {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        organization: row.try_get("organization")?,
        registry: row
            .try_get::<String, _>("registry")?
            .parse()
            .map_err(|e: tfregistry_core::RegistryError| DbError::InvalidData(e.to_string()))?,
        namespace: row.try_get("namespace")?,
        name: row.try_get("name")?,
        system: row.try_get("system")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn module_version_from_row(row: &AnyRow) -> DbResult<ModuleVersion> {
    Ok(ModuleVersion {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        module_id: parse_id(&row.try_get::<String, _>("module_id")?)?,
        version: row.try_get("version")?,
        source_ref: row.try_get("source_ref")?,
        filename: row.try_get("filename")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, sample_armor};
    use tfregistry_core::Platform;

    async fn backend(policy: CreatePolicy) -> (SqlBackend, RequestContext) {
        let ctx = RequestContext::new();
        let backend = SqlBackend::sqlite_memory(policy);
        backend.configure(&ctx).await.unwrap();
        (backend, ctx)
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let (backend, _ctx) = backend(CreatePolicy::CreateOrGet).await;
        let pool = backend.pool().unwrap();
        schema::apply(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_round_trip() {
        let (backend, ctx) = backend(CreatePolicy::CreateExclusive).await;
        let key = fixtures::provider_key();

        let created = backend.create_provider(&ctx, &key).await.unwrap();
        let fetched = backend.get_provider(&ctx, &key).await.unwrap();
        assert_eq!(created, fetched);

        let err = backend.create_provider(&ctx, &key).await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("org1/private/acme/widget"));
    }

    #[tokio::test]
    async fn test_platform_unique_constraint() {
        let (backend, ctx) = backend(CreatePolicy::CreateOrGet).await;
        backend
            .create_provider(&ctx, &fixtures::provider_key())
            .await
            .unwrap();
        let key = backend.add_gpg_key(&ctx, "acme", &sample_armor()).await.unwrap();
        backend
            .create_provider_version(&ctx, &fixtures::new_version("1.0.0", &key.key_id))
            .await
            .unwrap();

        let platform = |os: &str, arch: &str| {
            NewProviderPlatform::new(
                fixtures::version_key("1.0.0"),
                Platform::new(os, arch).unwrap(),
                "terraform-provider-widget_1.0.0_linux_amd64.zip",
                Shasum::new("abc123").unwrap(),
            )
            .unwrap()
        };

        backend
            .create_provider_platform(&ctx, &platform("linux", "amd64"))
            .await
            .unwrap();
        let err = backend
            .create_provider_platform(&ctx, &platform("LINUX", "amd64"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("linux/amd64"));

        // Same file name under another platform
        let err = backend
            .create_provider_platform(&ctx, &platform("darwin", "arm64"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        let version = backend
            .get_provider_version(&ctx, &fixtures::version_key("1.0.0"))
            .await
            .unwrap();
        assert_eq!(version.platforms.len(), 1);
        assert_eq!(version.platforms[0].shasum.as_str(), "abc123");
    }

    #[tokio::test]
    async fn test_platform_for_missing_version() {
        let (backend, ctx) = backend(CreatePolicy::CreateOrGet).await;
        let params = NewProviderPlatform::new(
            fixtures::version_key("9.9.9"),
            Platform::new("linux", "amd64").unwrap(),
            "terraform-provider-widget_9.9.9_linux_amd64.zip",
            Shasum::new("abc123").unwrap(),
        )
        .unwrap();
        let err = backend
            .create_provider_platform(&ctx, &params)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_gpg_key_get_or_create() {
        let (backend, ctx) = backend(CreatePolicy::CreateOrGet).await;
        let first = backend.add_gpg_key(&ctx, "acme", &sample_armor()).await.unwrap();
        let second = backend.add_gpg_key(&ctx, "acme", &sample_armor()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.key_id, "905C0D6D7D0E6E1D");

        let keys = backend.list_gpg_keys(&ctx, "acme").await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn test_timestamp_round_trip() {
        let now = Utc::now();
        assert_eq!(parse_timestamp(&timestamp(&now)).unwrap(), now);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
