//! SHA-256 checksums recorded for provider platform binaries
//!
//! The registry stores the checksum a publisher declares and hands it back
//! during download resolution. It never verifies a downloaded binary against
//! it, so the only validation here is on the textual form.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{RegistryError, Result};

/// Hex length of a full SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 checksum of a platform binary
///
/// Publishers may record an abbreviated digest, so any non-empty hex string
/// up to the full digest length is accepted. Values are normalized to
/// lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Shasum(String);

impl Shasum {
    /// Create a new checksum with validation
    ///
    /// # Errors
    /// Returns a validation error if the value is empty, too long, or not hex
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(RegistryError::ValidationError(
                "shasum cannot be empty".to_string(),
            ));
        }

        if normalized.len() > SHA256_HEX_LEN {
            return Err(RegistryError::ValidationError(format!(
                "shasum exceeds {} characters",
                SHA256_HEX_LEN
            )));
        }

        if !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RegistryError::ValidationError(
                "shasum must be a hexadecimal string".to_string(),
            ));
        }

        Ok(Self(normalized))
    }

    /// Compute the checksum of `data`
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    /// Compare against a raw hex value, ignoring case
    pub fn verify_hash(&self, hash_value: &str) -> bool {
        self.0 == hash_value.trim().to_ascii_lowercase()
    }

    /// Whether this is a full-length digest
    pub fn is_full_digest(&self) -> bool {
        self.0.len() == SHA256_HEX_LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Shasum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Shasum {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Shasum::new(s)
    }
}

impl TryFrom<String> for Shasum {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self> {
        Shasum::new(value)
    }
}

impl From<Shasum> for String {
    fn from(value: Shasum) -> Self {
        value.0
    }
}
