//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{RegistryError, Result};

/// Record identifier using ULID (Universally Unique Lexicographically Sortable Identifier)
///
/// Generated by the registry for every stored entity; never supplied by
/// clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Ulid);

impl RecordId {
    /// Generate a new RecordId
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| RegistryError::ValidationError(format!("Invalid record id: {}", e)))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        RecordId::parse(s)
    }
}

/// Distribution scope of a provider or module within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryTier {
    /// Visible only to the owning organization
    Private,
    /// Published for everyone
    Public,
}

impl RegistryTier {
    /// Lowercase label used in keys and paths
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryTier::Private => "private",
            RegistryTier::Public => "public",
        }
    }
}

impl Default for RegistryTier {
    fn default() -> Self {
        Self::Private
    }
}

impl fmt::Display for RegistryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryTier {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            _ => Err(RegistryError::ValidationError(format!(
                "Invalid registry tier: {}",
                s
            ))),
        }
    }
}

/// Policy an engine applies when a create hits an existing natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreatePolicy {
    /// Return the existing record without error
    CreateOrGet,
    /// Fail with a conflict
    CreateExclusive,
}

impl Default for CreatePolicy {
    fn default() -> Self {
        Self::CreateOrGet
    }
}

impl fmt::Display for CreatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatePolicy::CreateOrGet => write!(f, "create-or-get"),
            CreatePolicy::CreateExclusive => write!(f, "create-exclusive"),
        }
    }
}

impl FromStr for CreatePolicy {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create-or-get" => Ok(Self::CreateOrGet),
            "create-exclusive" => Ok(Self::CreateExclusive),
            _ => Err(RegistryError::ValidationError(format!(
                "Invalid create policy: {}",
                s
            ))),
        }
    }
}
