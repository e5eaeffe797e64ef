//! Storage key scheme
//!
//! Engines that address records by raw key (key/value, document store) build
//! every key here so that the layout is identical across them. A key is a
//! (partition, sort) pair; its flat form joins the two with [`DELIMITER`].
//! All records sharing a partition can be found with a prefix scan on
//! `partition` followed by the delimiter.

use std::fmt;

use crate::model::{ModuleKey, ProviderKey};
use crate::types::RecordId;

/// Separator between key components
pub const DELIMITER: char = ':';

/// Logical tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Providers,
    ProviderVersions,
    GpgKeys,
    Modules,
    ModuleVersions,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Providers => "providers",
            Table::ProviderVersions => "provider_versions",
            Table::GpgKeys => "gpg_keys",
            Table::Modules => "modules",
            Table::ModuleVersions => "module_versions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composite storage key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    /// Everything up to the last tuple element
    pub partition: String,
    /// The last tuple element
    pub sort: String,
}

impl StorageKey {
    fn new(partition: String, sort: impl Into<String>) -> Self {
        Self {
            partition,
            sort: sort.into(),
        }
    }

    /// Flat key, `{partition}:{sort}`
    pub fn render(&self) -> String {
        format!("{}{}{}", self.partition, DELIMITER, self.sort)
    }

    /// Prefix matching every key in this key's partition
    pub fn partition_prefix(&self) -> String {
        prefix(&self.partition)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.partition, DELIMITER, self.sort)
    }
}

fn join(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        out.push_str(part);
    }
    out
}

fn prefix(partition: &str) -> String {
    format!("{}{}", partition, DELIMITER)
}

/// `providers:{org}:{registry}:{namespace}/{name}`
pub fn provider(key: &ProviderKey) -> StorageKey {
    StorageKey::new(
        join(&[
            Table::Providers.as_str(),
            &key.organization,
            key.registry.as_str(),
        ]),
        format!("{}/{}", key.namespace, key.name),
    )
}

/// `provider_versions:{provider_id}:{version}`
pub fn provider_version(provider_id: RecordId, version: &str) -> StorageKey {
    StorageKey::new(
        join(&[Table::ProviderVersions.as_str(), &provider_id.to_string()]),
        version,
    )
}

/// Prefix of every version of a provider
pub fn provider_versions_prefix(provider_id: RecordId) -> String {
    prefix(&join(&[
        Table::ProviderVersions.as_str(),
        &provider_id.to_string(),
    ]))
}

/// `gpg_keys:{namespace}:{key_id}`
pub fn gpg_key(namespace: &str, key_id: &str) -> StorageKey {
    StorageKey::new(join(&[Table::GpgKeys.as_str(), namespace]), key_id)
}

/// Prefix of every GPG key registered for a namespace
pub fn gpg_keys_prefix(namespace: &str) -> String {
    prefix(&join(&[Table::GpgKeys.as_str(), namespace]))
}

/// `modules:{org}:{registry}:{namespace}/{name}/{system}`
pub fn module(key: &ModuleKey) -> StorageKey {
    StorageKey::new(
        join(&[Table::Modules.as_str(), &key.organization, key.registry.as_str()]),
        format!("{}/{}/{}", key.namespace, key.name, key.system),
    )
}

/// `module_versions:{module_id}:{version}`
pub fn module_version(module_id: RecordId, version: &str) -> StorageKey {
    StorageKey::new(
        join(&[Table::ModuleVersions.as_str(), &module_id.to_string()]),
        version,
    )
}

/// Prefix of every version of a module
pub fn module_versions_prefix(module_id: RecordId) -> String {
    prefix(&join(&[Table::ModuleVersions.as_str(), &module_id.to_string()]))
}
