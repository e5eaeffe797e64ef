//! Input validation for natural-key components
//!
//! Every segment that ends up inside a storage key or an asset path passes
//! through here, which keeps key rendering injective and keeps asset paths
//! inside the asset root.

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

use crate::error::{RegistryError, Result};

/// Maximum length of a single key segment
pub const MAX_SEGMENT_LEN: usize = 128;

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.+-]*$").expect("valid regex"));

static PROTOCOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("valid regex"));

static PLATFORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));

/// Validate one natural-key segment (organization, namespace, name, ...)
pub fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(RegistryError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }

    if value.len() > MAX_SEGMENT_LEN {
        return Err(RegistryError::ValidationError(format!(
            "{} exceeds {} characters",
            field, MAX_SEGMENT_LEN
        )));
    }

    if !SEGMENT_RE.is_match(value) {
        return Err(RegistryError::ValidationError(format!(
            "{} '{}' contains invalid characters",
            field, value
        )));
    }

    Ok(())
}

/// Parse and normalize a semantic version string
pub fn normalize_version(version: &str) -> Result<String> {
    let parsed = Version::parse(version.trim())?;
    Ok(parsed.to_string())
}

/// Validate a registry protocol version such as `5.0` or `6`
pub fn validate_protocol(protocol: &str) -> Result<()> {
    if !PROTOCOL_RE.is_match(protocol) {
        return Err(RegistryError::ValidationError(format!(
            "Invalid protocol version: {}",
            protocol
        )));
    }
    Ok(())
}

/// Lowercase and validate an OS or architecture label
pub fn normalize_platform_part(field: &str, value: &str) -> Result<String> {
    let lowered = value.trim().to_ascii_lowercase();
    if !PLATFORM_RE.is_match(&lowered) {
        return Err(RegistryError::ValidationError(format!(
            "Invalid {}: '{}'",
            field, value
        )));
    }
    Ok(lowered)
}

/// Validate a stored file name (a single path segment)
pub fn validate_filename(filename: &str) -> Result<()> {
    validate_segment("filename", filename)?;
    if filename.contains("..") {
        return Err(RegistryError::ValidationError(format!(
            "filename '{}' may not contain '..'",
            filename
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_validation() {
        assert!(validate_segment("namespace", "acme").is_ok());
        assert!(validate_segment("name", "my-widget_2").is_ok());
        assert!(validate_segment("name", "").is_err());
        assert!(validate_segment("name", "a/b").is_err());
        assert!(validate_segment("name", "a:b").is_err());
        assert!(validate_segment("name", "-leading").is_err());
        assert!(validate_segment("name", &"x".repeat(129)).is_err());
    }

    #[test]
    fn test_version_normalization() {
        assert_eq!(normalize_version(" 1.0.0 ").unwrap(), "1.0.0");
        assert_eq!(normalize_version("2.1.0-beta.1").unwrap(), "2.1.0-beta.1");
        assert!(normalize_version("1.0").is_err());
    }

    #[test]
    fn test_protocol_validation() {
        assert!(validate_protocol("5.0").is_ok());
        assert!(validate_protocol("6").is_ok());
        assert!(validate_protocol("v5").is_err());
    }

    #[test]
    fn test_platform_normalization() {
        assert_eq!(normalize_platform_part("os", "Linux").unwrap(), "linux");
        assert_eq!(normalize_platform_part("arch", "AMD64").unwrap(), "amd64");
        assert!(normalize_platform_part("arch", "arm/v7").is_err());
    }

    #[test]
    fn test_filename_validation() {
        assert!(validate_filename("terraform-provider-widget_1.0.0_linux_amd64.zip").is_ok());
        assert!(validate_filename("a..zip").is_err());
        assert!(validate_filename("../etc").is_err());
    }
}
