//! Logical asset paths
//!
//! An [`AssetPath`] is a slash-separated object key derived from a natural
//! key, never a filesystem path supplied by a caller. Every segment passes
//! the same validation as key segments, so a path cannot be absolute, cannot
//! contain `.`/`..` segments or backslashes, and joins safely under a root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tfregistry_core::validation::validate_segment;
use tfregistry_core::{ModuleVersionKey, ProviderVersionKey, RegistryError};

const PROVIDERS: &str = "providers";
const MODULES: &str = "modules";

/// Validated logical object key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetPath(String);

impl AssetPath {
    /// Parse and validate a logical path such as `providers/org1/private/acme/widget/1.0.0/file.zip`
    pub fn parse(value: &str) -> Result<Self, RegistryError> {
        if value.is_empty() {
            return Err(RegistryError::ValidationError(
                "asset path cannot be empty".to_string(),
            ));
        }
        for segment in value.split('/') {
            validate_segment("asset path segment", segment)?;
        }
        Ok(Self(value.to_string()))
    }

    /// Path of a file belonging to a provider version
    pub fn for_provider(key: &ProviderVersionKey, file_name: &str) -> Result<Self, RegistryError> {
        let provider = &key.provider;
        Self::from_segments(&[
            PROVIDERS,
            &provider.organization,
            provider.registry.as_str(),
            &provider.namespace,
            &provider.name,
            &key.version,
            file_name,
        ])
    }

    /// Path of a module version archive
    pub fn for_module(key: &ModuleVersionKey, file_name: &str) -> Result<Self, RegistryError> {
        let module = &key.module;
        Self::from_segments(&[
            MODULES,
            &module.organization,
            module.registry.as_str(),
            &module.namespace,
            &module.name,
            &module.system,
            &key.version,
            file_name,
        ])
    }

    fn from_segments(segments: &[&str]) -> Result<Self, RegistryError> {
        Self::parse(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Everything before the last segment, if there is anything
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AssetPath {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AssetPath {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AssetPath> for String {
    fn from(path: AssetPath) -> Self {
        path.0
    }
}
