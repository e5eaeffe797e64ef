//! Publish state of a provider version
//!
//! Nothing stores this state. It is derived from the version's platform
//! records and from which of the version's files exist in asset storage.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ProviderVersion;

/// How far a provider version has progressed through publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    /// Version record exists, no platforms
    Declared,
    /// At least one platform, but some files are not uploaded yet
    PartiallyPublished,
    /// Checksum manifest and every platform binary are present
    Published,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishState::Declared => write!(f, "declared"),
            PublishState::PartiallyPublished => write!(f, "partially_published"),
            PublishState::Published => write!(f, "published"),
        }
    }
}

/// Which of a version's files are present in asset storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPresence {
    pub shasums: bool,
    pub shasums_signature: bool,
    /// One entry per platform, in platform order
    pub binaries: Vec<bool>,
}

impl ArtifactPresence {
    /// Derive the state of `version`
    pub fn derive(&self, version: &ProviderVersion) -> PublishState {
        if version.platforms.is_empty() {
            return PublishState::Declared;
        }

        let binaries_present = self.binaries.len() == version.platforms.len()
            && self.binaries.iter().all(|present| *present);

        if self.shasums && binaries_present {
            PublishState::Published
        } else {
            PublishState::PartiallyPublished
        }
    }
}
