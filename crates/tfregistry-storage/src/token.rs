//! Transfer capability tokens
//!
//! A transfer token is an HS256 JWT binding exactly one logical asset path
//! and one operation until an expiry. The holder cannot read anything useful
//! out of it and only the server verifies it. Upload tokens expire sooner
//! than download tokens.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::path::AssetPath;

/// Default upload token lifetime (5 minutes)
pub const DEFAULT_UPLOAD_TTL_SECS: i64 = 300;

/// Default download token lifetime (1 hour)
pub const DEFAULT_DOWNLOAD_TTL_SECS: i64 = 3600;

/// Operation a token grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOp {
    Upload,
    Download,
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOp::Upload => write!(f, "upload"),
            TransferOp::Download => write!(f, "download"),
        }
    }
}

/// Claims carried by a transfer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferClaims {
    /// Logical asset path
    pub sub: String,
    pub op: TransferOp,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// A verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferGrant {
    pub path: AssetPath,
    pub op: TransferOp,
    pub expires_at: DateTime<Utc>,
    pub token_id: String,
}

/// Mints and verifies transfer tokens
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl TokenSigner {
    /// Signer with the default lifetimes
    pub fn new(secret: &[u8]) -> StorageResult<Self> {
        Self::with_ttls(
            secret,
            Duration::seconds(DEFAULT_UPLOAD_TTL_SECS),
            Duration::seconds(DEFAULT_DOWNLOAD_TTL_SECS),
        )
    }

    pub fn with_ttls(
        secret: &[u8],
        upload_ttl: Duration,
        download_ttl: Duration,
    ) -> StorageResult<Self> {
        if secret.is_empty() {
            return Err(StorageError::Configuration(
                "token secret cannot be empty".to_string(),
            ));
        }
        if upload_ttl <= Duration::zero() || download_ttl <= Duration::zero() {
            return Err(StorageError::Configuration(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if upload_ttl >= download_ttl {
            return Err(StorageError::Configuration(format!(
                "upload token lifetime ({}s) must be shorter than download lifetime ({}s)",
                upload_ttl.num_seconds(),
                download_ttl.num_seconds()
            )));
        }

        // Expiry is checked by hand against an explicit clock
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            upload_ttl,
            download_ttl,
        })
    }

    pub fn ttl(&self, op: TransferOp) -> Duration {
        match op {
            TransferOp::Upload => self.upload_ttl,
            TransferOp::Download => self.download_ttl,
        }
    }

    /// Mint a token for `op` on `path` valid from now
    pub fn mint(&self, op: TransferOp, path: &AssetPath) -> StorageResult<String> {
        self.mint_at(op, path, Utc::now(), self.ttl(op))
    }

    /// Mint a token issued at `issued_at` that lives for `ttl`
    pub fn mint_at(
        &self,
        op: TransferOp,
        path: &AssetPath,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> StorageResult<String> {
        let expires_at = issued_at.checked_add_signed(ttl).ok_or_else(|| {
            StorageError::Configuration(format!(
                "token lifetime of {}s overflows the clock",
                ttl.num_seconds()
            ))
        })?;
        let claims = TransferClaims {
            sub: path.to_string(),
            op,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        debug!(path = %path, op = %op, exp = claims.exp, "Minting transfer token");
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| StorageError::Configuration(format!("failed to sign token: {}", e)))
    }

    /// Verify a token for `op` against the current time
    pub fn verify(&self, token: &str, op: TransferOp) -> StorageResult<TransferGrant> {
        self.verify_at(token, op, Utc::now())
    }

    /// Verify signature, operation and expiry against `now`
    pub fn verify_at(
        &self,
        token: &str,
        op: TransferOp,
        now: DateTime<Utc>,
    ) -> StorageResult<TransferGrant> {
        let claims = decode::<TransferClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                warn!(op = %op, "Rejected transfer token: {}", e);
                StorageError::from(e)
            })?
            .claims;

        if claims.op != op {
            warn!(expected = %op, actual = %claims.op, "Transfer token used for the wrong operation");
            return Err(StorageError::Unauthorized(format!(
                "token does not grant {}",
                op
            )));
        }

        if now.timestamp() >= claims.exp {
            warn!(path = %claims.sub, "Transfer token expired");
            return Err(StorageError::Unauthorized("token expired".to_string()));
        }

        let path = AssetPath::parse(&claims.sub)
            .map_err(|e| StorageError::Unauthorized(format!("token path rejected: {}", e)))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| StorageError::Unauthorized("token expiry out of range".to_string()))?;

        Ok(TransferGrant {
            path,
            op: claims.op,
            expires_at,
            token_id: claims.jti,
        })
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("upload_ttl", &self.upload_ttl)
            .field("download_ttl", &self.download_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret-key-for-testing").unwrap()
    }

    fn path() -> AssetPath {
        AssetPath::parse("providers/org1/private/acme/widget/1.0.0/widget.zip").unwrap()
    }

    #[test]
    fn test_round_trip() {
        let signer = signer();
        let token = signer.mint(TransferOp::Download, &path()).unwrap();
        let grant = signer.verify(&token, TransferOp::Download).unwrap();
        assert_eq!(grant.path, path());
        assert_eq!(grant.op, TransferOp::Download);
        assert!(grant.expires_at > Utc::now());
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer();
        let issued = Utc::now();
        let token = signer
            .mint_at(TransferOp::Upload, &path(), issued, Duration::seconds(1))
            .unwrap();

        assert!(signer
            .verify_at(&token, TransferOp::Upload, issued)
            .is_ok());
        let err = signer
            .verify_at(&token, TransferOp::Upload, issued + Duration::seconds(2))
            .unwrap_err();
        assert!(matches!(err, StorageError::Unauthorized(_)));
    }

    #[test]
    fn test_wrong_operation_rejected() {
        let signer = signer();
        let token = signer.mint(TransferOp::Download, &path()).unwrap();
        assert!(matches!(
            signer.verify(&token, TransferOp::Upload),
            Err(StorageError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let other = TokenSigner::new(b"another-secret").unwrap();
        let token = other.mint(TransferOp::Upload, &path()).unwrap();
        assert!(matches!(
            signer().verify(&token, TransferOp::Upload),
            Err(StorageError::Unauthorized(_))
        ));
        assert!(matches!(
            signer().verify("not.a.token", TransferOp::Upload),
            Err(StorageError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_upload_expires_before_download() {
        let signer = signer();
        assert!(signer.ttl(TransferOp::Upload) < signer.ttl(TransferOp::Download));
        assert!(TokenSigner::new(b"").is_err());

        for (upload, download) in [(3600, 300), (600, 600)] {
            assert!(matches!(
                TokenSigner::with_ttls(
                    b"secret",
                    Duration::seconds(upload),
                    Duration::seconds(download)
                ),
                Err(StorageError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_expiry_overflow_is_configuration_error() {
        let issued = Utc::now();
        assert!(matches!(
            signer().mint_at(TransferOp::Download, &path(), issued, Duration::days(365_000_000)),
            Err(StorageError::Configuration(_))
        ));
    }
}
