//! Conventional artifact file names

use tfregistry_core::{ModuleVersionKey, Platform, ProviderVersionKey};

/// `terraform-provider-{name}_{version}_{os}_{arch}.zip`
pub fn provider_binary(key: &ProviderVersionKey, platform: &Platform) -> String {
    format!(
        "terraform-provider-{}_{}_{}_{}.zip",
        key.provider.name, key.version, platform.os, platform.arch
    )
}

/// `terraform-provider-{name}_{version}_SHA256SUMS`
pub fn shasums(key: &ProviderVersionKey) -> String {
    format!(
        "terraform-provider-{}_{}_SHA256SUMS",
        key.provider.name, key.version
    )
}

/// `terraform-provider-{name}_{version}_SHA256SUMS.sig`
pub fn shasums_signature(key: &ProviderVersionKey) -> String {
    format!("{}.sig", shasums(key))
}

/// `{name}-{system}-{version}.tar.gz`
pub fn module_archive(key: &ModuleVersionKey) -> String {
    format!(
        "{}-{}-{}.tar.gz",
        key.module.name, key.module.system, key.version
    )
}
