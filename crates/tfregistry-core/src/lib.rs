//! Core domain models and types for the provider registry
//!
//! This crate contains the data model for providers, modules, their
//! versions and platforms, and the GPG keys that sign them, together with
//! the storage key scheme, key identity derivation and the error taxonomy
//! shared by every other crate in the workspace.

pub mod checksum;
pub mod context;
pub mod error;
pub mod gpg;
pub mod keys;
pub mod model;
pub mod state;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use checksum::Shasum;
pub use context::{CancelReason, Cancelled, RequestContext};
pub use error::{ErrorKind, RegistryError, Result};
pub use gpg::{key_id_from_armor, KeyIdentity};
pub use keys::StorageKey;
pub use model::{
    GpgKey, Module, ModuleKey, ModuleVersion, ModuleVersionKey, NewModuleVersion,
    NewProviderPlatform, NewProviderVersion, Platform, Provider, ProviderKey, ProviderPlatform,
    ProviderVersion, ProviderVersionKey,
};
pub use state::{ArtifactPresence, PublishState};
pub use types::{CreatePolicy, RecordId, RegistryTier};
