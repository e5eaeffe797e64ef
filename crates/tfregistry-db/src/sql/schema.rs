//! Relational schema
//!
//! The statements are portable between PostgreSQL and SQLite. Natural-key
//! uniqueness is enforced by composite UNIQUE constraints; platform OS and
//! architecture are stored lowercased so the (version, os, arch) constraint
//! is case-insensitive. Timestamps are RFC 3339 text with fixed nanosecond
//! precision, which sorts chronologically.

use sqlx::AnyPool;
use tracing::{debug, info};

use crate::error::DbResult;

pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS providers (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        registry TEXT NOT NULL,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (organization, registry, namespace, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gpg_keys (
        id TEXT PRIMARY KEY,
        namespace TEXT NOT NULL,
        key_id TEXT NOT NULL,
        ascii_armor TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (namespace, key_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS provider_versions (
        id TEXT PRIMARY KEY,
        provider_id TEXT NOT NULL REFERENCES providers (id),
        version TEXT NOT NULL,
        protocols TEXT NOT NULL,
        key_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (provider_id, version)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS provider_platforms (
        id TEXT PRIMARY KEY,
        provider_version_id TEXT NOT NULL REFERENCES provider_versions (id),
        os TEXT NOT NULL,
        arch TEXT NOT NULL,
        filename TEXT NOT NULL,
        shasum TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (provider_version_id, os, arch)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        registry TEXT NOT NULL,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        system TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (organization, registry, namespace, name, system)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS module_versions (
        id TEXT PRIMARY KEY,
        module_id TEXT NOT NULL REFERENCES modules (id),
        version TEXT NOT NULL,
        source_ref TEXT NOT NULL,
        filename TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (module_id, version)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_provider_platforms_version
        ON provider_platforms (provider_version_id)
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_provider_platforms_filename
        ON provider_platforms (provider_version_id, filename)
    "#,
];

/// Create every table and index that does not exist yet
pub async fn apply(pool: &AnyPool) -> DbResult<()> {
    info!("Applying relational schema");
    for statement in STATEMENTS {
        debug!("Executing schema statement");
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
