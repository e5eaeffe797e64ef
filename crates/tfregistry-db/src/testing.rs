//! Shared fixtures for engine tests

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

pub fn sample_armor() -> String {
    SAMPLE_ARMOR.to_string()
}

pub mod fixtures {
    use tfregistry_core::{
        ModuleKey, NewModuleVersion, NewProviderVersion, ProviderKey, ProviderVersionKey,
        RegistryTier,
    };

    pub fn provider_key() -> ProviderKey {
        ProviderKey::new("org1", RegistryTier::Private, "acme", "widget").unwrap()
    }

    pub fn version_key(version: &str) -> ProviderVersionKey {
        provider_key().version(version).unwrap()
    }

    pub fn new_version(version: &str, key_id: &str) -> NewProviderVersion {
        NewProviderVersion::new(version_key(version), vec!["5.0".to_string()], key_id).unwrap()
    }

    pub fn module_key() -> ModuleKey {
        ModuleKey::new("org1", RegistryTier::Private, "acme", "vpc", "aws").unwrap()
    }

    pub fn new_module_version(version: &str) -> NewModuleVersion {
        NewModuleVersion::new(
            module_key().version(version).unwrap(),
            format!("v{}", version),
            format!("vpc-aws-{}.tar.gz", version),
        )
        .unwrap()
    }
}
