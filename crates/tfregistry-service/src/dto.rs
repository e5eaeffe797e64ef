//! Data Transfer Objects (DTOs) for service layer
//!
//! Publish results carry the records plus the URLs the client uploads to.
//! Discovery responses follow the registry protocol's JSON shapes.

use serde::{Deserialize, Serialize};
use tfregistry_core::{
    Module, ModuleVersion, Platform, ProviderPlatform, ProviderVersion, ProviderVersionKey, Shasum,
};

// ============================================================================
// Publish DTOs
// ============================================================================

/// A created provider version and where its checksum files go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionUploads {
    pub version: ProviderVersion,
    pub shasums_upload_url: String,
    pub shasums_signature_upload_url: String,
}

/// Request to add a platform binary to a version
#[derive(Debug, Clone)]
pub struct PlatformRequest {
    pub version: ProviderVersionKey,
    pub platform: Platform,
    /// Binary file name; the conventional name is used when absent
    pub filename: Option<String>,
    pub shasum: Shasum,
}

/// A created platform and where its binary goes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformUpload {
    pub platform: ProviderPlatform,
    pub upload_url: String,
}

/// A created module version and where its archive goes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleVersionUpload {
    pub module: Module,
    pub version: ModuleVersion,
    pub upload_url: String,
}

// ============================================================================
// Discovery DTOs
// ============================================================================

/// OS/architecture pair as listed in version listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub os: String,
    pub arch: String,
}

/// One entry of a provider's version listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: String,
    pub protocols: Vec<String>,
    pub platforms: Vec<PlatformSummary>,
}

/// Response of the provider versions endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVersionsResponse {
    pub versions: Vec<VersionSummary>,
}

impl From<&ProviderVersion> for VersionSummary {
    fn from(version: &ProviderVersion) -> Self {
        Self {
            version: version.version.clone(),
            protocols: version.protocols.clone(),
            platforms: version
                .platforms
                .iter()
                .map(|p| PlatformSummary {
                    os: p.os.clone(),
                    arch: p.arch.clone(),
                })
                .collect(),
        }
    }
}

/// Public key a client verifies the checksum signature with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgPublicKey {
    pub key_id: String,
    pub ascii_armor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeys {
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

/// Response of the provider download endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDownload {
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub signing_keys: SigningKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersionSummary {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersionList {
    pub versions: Vec<ModuleVersionSummary>,
}

/// Response of the module versions endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersionsResponse {
    pub modules: Vec<ModuleVersionList>,
}

/// Where to fetch a module version archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDownload {
    pub download_url: String,
}
