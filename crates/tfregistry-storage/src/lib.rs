//! Asset storage for the provider registry
//!
//! Binaries, checksum manifests and module archives never pass through the
//! registry API itself. Callers get a URL scoped to one object:
//! - [`LocalAssetStorage`] serves objects from a sandboxed directory and
//!   scopes URLs with signed, expiring [transfer tokens](token), including
//!   [chunked uploads](chunk) reassembled on the server
//! - `S3AssetStorage` (feature `s3`) hands out S3 pre-signed URLs

pub mod asset;
pub mod chunk;
pub mod config;
pub mod error;
pub mod local;
pub mod path;
#[cfg(feature = "s3")]
pub mod s3;
pub mod token;

pub use asset::{AssetBackend, AssetStorage, ObjectProbe};
pub use chunk::{ChunkAssembler, ChunkInfo, ChunkOutcome, MAX_CHUNKS};
pub use config::{create_asset_storage, AssetStack, StorageConfig, StorageKind};
pub use error::{StorageError, StorageResult};
pub use local::LocalAssetStorage;
pub use path::AssetPath;
#[cfg(feature = "s3")]
pub use s3::{S3AssetStorage, S3Settings};
pub use token::{TokenSigner, TransferClaims, TransferGrant, TransferOp};
