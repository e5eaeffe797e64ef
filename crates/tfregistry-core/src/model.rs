//! Registry data model
//!
//! Entities are created once and never deleted. A provider owns versions,
//! a version owns the platforms it was published for, and a version refers
//! to its signing key by (namespace, key ID) rather than by record ID.
//!
//! The `*Key` and `New*` types carry the natural keys and caller attributes
//! of create operations. Their constructors validate and normalize input so
//! storage engines only ever see canonical values.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::checksum::Shasum;
use crate::error::{RegistryError, Result};
use crate::types::{RecordId, RegistryTier};
use crate::validation::{
    normalize_platform_part, normalize_version, validate_filename, validate_protocol,
    validate_segment,
};

/// Natural key of a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderKey {
    pub organization: String,
    pub registry: RegistryTier,
    pub namespace: String,
    pub name: String,
}

impl ProviderKey {
    pub fn new(
        organization: impl Into<String>,
        registry: RegistryTier,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            organization: organization.into(),
            registry,
            namespace: namespace.into(),
            name: name.into(),
        };
        validate_segment("organization", &key.organization)?;
        validate_segment("namespace", &key.namespace)?;
        validate_segment("name", &key.name)?;
        Ok(key)
    }

    /// Key of one version of this provider
    pub fn version(&self, version: &str) -> Result<ProviderVersionKey> {
        ProviderVersionKey::new(self.clone(), version)
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.organization, self.registry, self.namespace, self.name
        )
    }
}

/// Natural key of a provider version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderVersionKey {
    pub provider: ProviderKey,
    pub version: String,
}

impl ProviderVersionKey {
    pub fn new(provider: ProviderKey, version: &str) -> Result<Self> {
        Ok(Self {
            provider,
            version: normalize_version(version)?,
        })
    }
}

impl fmt::Display for ProviderVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.provider, self.version)
    }
}

/// Operating system and architecture pair, lowercased
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Result<Self> {
        Ok(Self {
            os: normalize_platform_part("os", os)?,
            arch: normalize_platform_part("arch", arch)?,
        })
    }

    /// Case-insensitive match against raw labels
    pub fn matches(&self, os: &str, arch: &str) -> bool {
        self.os.eq_ignore_ascii_case(os.trim()) && self.arch.eq_ignore_ascii_case(arch.trim())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Attributes for creating a provider version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderVersion {
    pub key: ProviderVersionKey,
    pub protocols: Vec<String>,
    /// Key ID of a GPG key already registered for the provider's namespace
    pub key_id: String,
}

impl NewProviderVersion {
    pub fn new(
        key: ProviderVersionKey,
        protocols: Vec<String>,
        key_id: impl Into<String>,
    ) -> Result<Self> {
        if protocols.is_empty() {
            return Err(RegistryError::ValidationError(
                "at least one protocol version is required".to_string(),
            ));
        }
        for protocol in &protocols {
            validate_protocol(protocol)?;
        }

        let key_id = key_id.into().trim().to_ascii_uppercase();
        if key_id.is_empty() || !key_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RegistryError::ValidationError(format!(
                "Invalid key id: '{}'",
                key_id
            )));
        }

        Ok(Self {
            key,
            protocols,
            key_id,
        })
    }
}

/// Attributes for creating a provider platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderPlatform {
    pub version: ProviderVersionKey,
    pub platform: Platform,
    pub filename: String,
    pub shasum: Shasum,
}

impl NewProviderPlatform {
    pub fn new(
        version: ProviderVersionKey,
        platform: Platform,
        filename: impl Into<String>,
        shasum: Shasum,
    ) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self {
            version,
            platform,
            filename,
            shasum,
        })
    }
}

/// Natural key of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleKey {
    pub organization: String,
    pub registry: RegistryTier,
    pub namespace: String,
    pub name: String,
    /// Target provider system, e.g. `aws`
    pub system: String,
}

impl ModuleKey {
    pub fn new(
        organization: impl Into<String>,
        registry: RegistryTier,
        namespace: impl Into<String>,
        name: impl Into<String>,
        system: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            organization: organization.into(),
            registry,
            namespace: namespace.into(),
            name: name.into(),
            system: system.into(),
        };
        validate_segment("organization", &key.organization)?;
        validate_segment("namespace", &key.namespace)?;
        validate_segment("name", &key.name)?;
        validate_segment("system", &key.system)?;
        Ok(key)
    }

    pub fn version(&self, version: &str) -> Result<ModuleVersionKey> {
        ModuleVersionKey::new(self.clone(), version)
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.organization, self.registry, self.namespace, self.name, self.system
        )
    }
}

/// Natural key of a module version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleVersionKey {
    pub module: ModuleKey,
    pub version: String,
}

impl ModuleVersionKey {
    pub fn new(module: ModuleKey, version: &str) -> Result<Self> {
        Ok(Self {
            module,
            version: normalize_version(version)?,
        })
    }
}

impl fmt::Display for ModuleVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.module, self.version)
    }
}

/// Attributes for creating a module version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewModuleVersion {
    pub key: ModuleVersionKey,
    /// Commit or tag the version was cut from
    pub source_ref: String,
    pub filename: String,
}

impl NewModuleVersion {
    pub fn new(
        key: ModuleVersionKey,
        source_ref: impl Into<String>,
        filename: impl Into<String>,
    ) -> Result<Self> {
        let source_ref = source_ref.into();
        if source_ref.trim().is_empty() {
            return Err(RegistryError::ValidationError(
                "source reference cannot be empty".to_string(),
            ));
        }
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self {
            key,
            source_ref,
            filename,
        })
    }
}

/// A publishable provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: RecordId,
    pub organization: String,
    pub registry: RegistryTier,
    pub namespace: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(key: &ProviderKey) -> Self {
        Self {
            id: RecordId::new(),
            organization: key.organization.clone(),
            registry: key.registry,
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ProviderKey {
        ProviderKey {
            organization: self.organization.clone(),
            registry: self.registry,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// One released version of a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVersion {
    pub id: RecordId,
    pub provider_id: RecordId,
    pub version: String,
    pub protocols: Vec<String>,
    /// Key ID of the signing key, resolved in the provider's namespace
    pub key_id: String,
    /// Platforms in the order they were added
    #[serde(default)]
    pub platforms: Vec<ProviderPlatform>,
    pub created_at: DateTime<Utc>,
}

impl ProviderVersion {
    pub fn new(provider_id: RecordId, params: &NewProviderVersion) -> Self {
        Self {
            id: RecordId::new(),
            provider_id,
            version: params.key.version.clone(),
            protocols: params.protocols.clone(),
            key_id: params.key_id.clone(),
            platforms: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Platform matching `os`/`arch`, ignoring case
    pub fn find_platform(&self, os: &str, arch: &str) -> Option<&ProviderPlatform> {
        self.platforms
            .iter()
            .find(|p| p.os.eq_ignore_ascii_case(os.trim()) && p.arch.eq_ignore_ascii_case(arch.trim()))
    }

    pub fn has_platform(&self, platform: &Platform) -> bool {
        self.find_platform(&platform.os, &platform.arch).is_some()
    }
}

/// A platform-specific binary of a provider version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPlatform {
    pub id: RecordId,
    pub provider_version_id: RecordId,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub shasum: Shasum,
    pub created_at: DateTime<Utc>,
}

impl ProviderPlatform {
    pub fn new(provider_version_id: RecordId, params: &NewProviderPlatform) -> Self {
        Self {
            id: RecordId::new(),
            provider_version_id,
            os: params.platform.os.clone(),
            arch: params.platform.arch.clone(),
            filename: params.filename.clone(),
            shasum: params.shasum.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            os: self.os.clone(),
            arch: self.arch.clone(),
        }
    }
}

/// A publisher's public signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgKey {
    pub id: RecordId,
    pub namespace: String,
    /// Derived from `ascii_armor`
    pub key_id: String,
    pub ascii_armor: String,
    pub created_at: DateTime<Utc>,
}

impl GpgKey {
    pub fn new(namespace: &str, key_id: &str, ascii_armor: &str) -> Self {
        Self {
            id: RecordId::new(),
            namespace: namespace.to_string(),
            key_id: key_id.to_string(),
            ascii_armor: ascii_armor.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A publishable module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: RecordId,
    pub organization: String,
    pub registry: RegistryTier,
    pub namespace: String,
    pub name: String,
    pub system: String,
    pub created_at: DateTime<Utc>,
}

impl Module {
    pub fn new(key: &ModuleKey) -> Self {
        Self {
            id: RecordId::new(),
            organization: key.organization.clone(),
            registry: key.registry,
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            system: key.system.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey {
            organization: self.organization.clone(),
            registry: self.registry,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            system: self.system.clone(),
        }
    }
}

/// One released version of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub id: RecordId,
    pub module_id: RecordId,
    pub version: String,
    pub source_ref: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl ModuleVersion {
    pub fn new(module_id: RecordId, params: &NewModuleVersion) -> Self {
        Self {
            id: RecordId::new(),
            module_id,
            version: params.key.version.clone(),
            source_ref: params.source_ref.clone(),
            filename: params.filename.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Order version strings by semantic version precedence
///
/// Strings that fail to parse sort after valid versions, lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> ProviderKey {
        ProviderKey::new("org1", RegistryTier::Private, "acme", "widget").unwrap()
    }

    #[test]
    fn test_provider_key_validation() {
        assert!(ProviderKey::new("org1", RegistryTier::Private, "acme", "").is_err());
        assert!(ProviderKey::new("org:1", RegistryTier::Private, "acme", "widget").is_err());
        assert_eq!(widget().to_string(), "org1/private/acme/widget");
    }

    #[test]
    fn test_version_key_normalizes() {
        let key = widget().version(" 1.0.0").unwrap();
        assert_eq!(key.version, "1.0.0");
        assert_eq!(key.to_string(), "org1/private/acme/widget@1.0.0");
        assert!(widget().version("latest").is_err());
    }

    #[test]
    fn test_platform_is_lowercased() {
        let platform = Platform::new("Linux", "AMD64").unwrap();
        assert_eq!(platform.to_string(), "linux/amd64");
        assert!(platform.matches("LINUX", "amd64"));
        assert!(!platform.matches("linux", "arm64"));
    }

    #[test]
    fn test_new_provider_version_requires_protocols() {
        let key = widget().version("1.0.0").unwrap();
        assert!(NewProviderVersion::new(key.clone(), vec![], "ABCD").is_err());
        assert!(NewProviderVersion::new(key.clone(), vec!["5.0".into()], "not hex").is_err());

        let params = NewProviderVersion::new(key, vec!["5.0".into()], "abcd1234").unwrap();
        assert_eq!(params.key_id, "ABCD1234");
    }

    #[test]
    fn test_find_platform_ignores_case() {
        let key = widget().version("1.0.0").unwrap();
        let params = NewProviderVersion::new(key.clone(), vec!["5.0".into()], "ABCD").unwrap();
        let mut version = ProviderVersion::new(RecordId::new(), &params);

        let platform = NewProviderPlatform::new(
            key,
            Platform::new("linux", "amd64").unwrap(),
            "terraform-provider-widget_1.0.0_linux_amd64.zip",
            Shasum::new("abc123").unwrap(),
        )
        .unwrap();
        version
            .platforms
            .push(ProviderPlatform::new(version.id, &platform));

        assert!(version.find_platform("Linux", "AMD64").is_some());
        assert!(version.find_platform("linux", "arm64").is_none());
    }

    #[test]
    fn test_module_version_requires_source_ref() {
        let module = ModuleKey::new("org1", RegistryTier::Private, "acme", "vpc", "aws").unwrap();
        let key = module.version("0.1.0").unwrap();
        assert!(NewModuleVersion::new(key.clone(), " ", "vpc-aws-0.1.0.tar.gz").is_err());
        assert!(NewModuleVersion::new(key, "v0.1.0", "vpc-aws-0.1.0.tar.gz").is_ok());
    }

    #[test]
    fn test_compare_versions() {
        let mut versions = vec!["1.10.0", "1.2.0", "1.2.0-rc.1", "0.9.0"];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(versions, vec!["0.9.0", "1.2.0-rc.1", "1.2.0", "1.10.0"]);
    }

    #[test]
    fn test_version_record_serde_defaults_platforms() {
        let json = serde_json::json!({
            "id": RecordId::new(),
            "provider_id": RecordId::new(),
            "version": "1.0.0",
            "protocols": ["5.0"],
            "key_id": "ABCD",
            "created_at": "2024-01-01T00:00:00Z",
        });
        let version: ProviderVersion = serde_json::from_value(json).unwrap();
        assert!(version.platforms.is_empty());
    }
}
