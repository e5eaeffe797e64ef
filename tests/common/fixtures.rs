//! Test fixtures

use tfregistry_core::{
    ModuleKey, NewProviderVersion, Platform, ProviderKey, ProviderVersionKey, RegistryTier, Shasum,
};
use tfregistry_service::PlatformRequest;

/// Ed25519 public key exported by `gpg --armor --export`, key ID 905C0D6D7D0E6E1D
pub const SAMPLE_ARMOR: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----

mDMEatXVLhYJKwYBBAHaRw8BAQdAWzRx2HxTQUC3aEVHs/aB/a61uR8dUj8FevSQ
mJS2Any0HUFjbWUgVGVzdCA8dGVzdEBhY21lLmV4YW1wbGU+iJAEExYIADgWIQRu
XyXZ5TYcbxNdwkqQXA1tfQ5uHQUCatXVLgIbAwULCQgHAgYVCgkICwIEFgIDAQIe
AQIXgAAKCRCQXA1tfQ5uHU7zAQCz7s8p//EuB3NHIgZuKyJBjCu8/TjtX/wEtp+z
VPCkHQD7Bb1ERCWWhsjTwtiomHnwj2wlbEV1QE9hxP66aZS8/A4=
=Xal4
-----END PGP PUBLIC KEY BLOCK-----
";

pub const SAMPLE_KEY_ID: &str = "905C0D6D7D0E6E1D";

pub fn widget() -> ProviderKey {
    ProviderKey::new("org1", RegistryTier::Private, "acme", "widget").unwrap()
}

pub fn widget_version(version: &str) -> ProviderVersionKey {
    widget().version(version).unwrap()
}

pub fn new_version(version: &str) -> NewProviderVersion {
    NewProviderVersion::new(
        widget_version(version),
        vec!["5.0".to_string()],
        SAMPLE_KEY_ID,
    )
    .unwrap()
}

pub fn platform_request(version: &str, os: &str, arch: &str, shasum: &str) -> PlatformRequest {
    PlatformRequest {
        version: widget_version(version),
        platform: Platform::new(os, arch).unwrap(),
        filename: None,
        shasum: Shasum::new(shasum).unwrap(),
    }
}

pub fn vpc() -> ModuleKey {
    ModuleKey::new("org1", RegistryTier::Private, "acme", "vpc", "aws").unwrap()
}
