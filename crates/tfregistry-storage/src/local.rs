//! Local filesystem storage with capability tokens
//!
//! Objects live under a sandboxed root directory. Upload and download URLs
//! point back at this server and carry a transfer token bound to a single
//! logical path; the transfer routes verify the token and resolve the file
//! from the token's claims, never from the URL.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tfregistry_core::RequestContext;
use tokio::fs::{self, File};
use tracing::{debug, info, instrument};
use url::Url;

use crate::asset::{AssetStorage, ObjectProbe};
use crate::chunk::{write_atomically, ChunkAssembler, ChunkInfo, ChunkOutcome};
use crate::error::{StorageError, StorageResult};
use crate::path::AssetPath;
use crate::token::{TokenSigner, TransferGrant, TransferOp};

/// Filesystem-backed asset storage
#[derive(Debug)]
pub struct LocalAssetStorage {
    root: PathBuf,
    public_base_url: String,
    signer: Arc<TokenSigner>,
    assembler: ChunkAssembler,
    configured: AtomicBool,
}

impl LocalAssetStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: &str,
        signer: Arc<TokenSigner>,
    ) -> StorageResult<Self> {
        let parsed = Url::parse(public_base_url).map_err(|e| {
            StorageError::Configuration(format!(
                "invalid public base url '{}': {}",
                public_base_url, e
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StorageError::Configuration(format!(
                "public base url must be http(s): {}",
                public_base_url
            )));
        }

        let stale_after = signer
            .ttl(TransferOp::Upload)
            .to_std()
            .map_err(|e| StorageError::Configuration(format!("invalid upload ttl: {}", e)))?;

        Ok(Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer,
            assembler: ChunkAssembler::new().with_stale_after(stale_after),
            configured: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    fn ensure_configured(&self) -> StorageResult<()> {
        if self.configured.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Configuration(
                "local asset storage used before configure".to_string(),
            ))
        }
    }

    /// Filesystem location of a logical path, always under the root
    pub fn resolve(&self, path: &AssetPath) -> StorageResult<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.segments() {
            resolved.push(segment);
        }
        if !resolved.starts_with(&self.root) {
            return Err(StorageError::InvalidInput(format!(
                "{} escapes the asset root",
                path
            )));
        }
        Ok(resolved)
    }

    /// Verify an upload token and return what it grants
    pub fn authorize_upload(&self, token: &str) -> StorageResult<TransferGrant> {
        self.signer.verify(token, TransferOp::Upload)
    }

    /// Verify a download token and return what it grants
    pub fn authorize_download(&self, token: &str) -> StorageResult<TransferGrant> {
        self.signer.verify(token, TransferOp::Download)
    }

    /// Store a whole object; readers never observe a partial write
    #[instrument(skip(self, ctx, data), fields(path = %path, bytes = data.len()))]
    pub async fn put_object(
        &self,
        ctx: &RequestContext,
        path: &AssetPath,
        data: &[u8],
    ) -> StorageResult<u64> {
        self.ensure_configured()?;
        let target = self.resolve(path)?;

        ctx.run("local.put_object", async {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::io("create directories", e))?;
            }
            write_atomically(&target, data).await
        })
        .await?;

        info!("Stored object");
        Ok(data.len() as u64)
    }

    /// Store one chunk of the upload authorized by `grant`
    #[instrument(skip(self, ctx, grant, info, data), fields(path = %grant.path, chunk = info.number, total = info.total))]
    pub async fn put_chunk(
        &self,
        ctx: &RequestContext,
        grant: &TransferGrant,
        info: &ChunkInfo,
        data: &[u8],
    ) -> StorageResult<ChunkOutcome> {
        self.ensure_configured()?;
        if grant.op != TransferOp::Upload {
            return Err(StorageError::Unauthorized(
                "token does not grant upload".to_string(),
            ));
        }
        info.check_against(&grant.path)?;
        let target = self.resolve(&grant.path)?;

        ctx.run(
            "local.put_chunk",
            self.assembler
                .store_chunk(&target, &grant.token_id, info, data),
        )
        .await
        .map_err(|e| match e {
            StorageError::IncompleteUpload { missing, .. } => StorageError::IncompleteUpload {
                path: grant.path.to_string(),
                missing,
            },
            other => other,
        })
    }

    /// Open an object for streaming, with its length
    pub async fn open_object(
        &self,
        ctx: &RequestContext,
        path: &AssetPath,
    ) -> StorageResult<(File, u64)> {
        self.ensure_configured()?;
        let target = self.resolve(path)?;

        ctx.run("local.open_object", async {
            let file = File::open(&target).await.map_err(|e| not_found_or(path, e, "open"))?;
            let metadata = file
                .metadata()
                .await
                .map_err(|e| StorageError::io("stat", e))?;
            if !metadata.is_file() {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Ok((file, metadata.len()))
        })
        .await
    }

    /// Length of an object
    pub async fn object_len(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<u64> {
        self.ensure_configured()?;
        let target = self.resolve(path)?;

        ctx.run("local.object_len", async {
            let metadata = fs::metadata(&target)
                .await
                .map_err(|e| not_found_or(path, e, "stat"))?;
            if !metadata.is_file() {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Ok(metadata.len())
        })
        .await
    }

    fn url(&self, route: &str, token: &str) -> String {
        format!("{}/asset/{}/{}", self.public_base_url, route, token)
    }
}

#[async_trait]
impl AssetStorage for LocalAssetStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, ctx), fields(root = %self.root.display()))]
    async fn configure(&self, ctx: &RequestContext) -> StorageResult<()> {
        if self.configured.load(Ordering::Acquire) {
            return Err(StorageError::Configuration(
                "local asset storage already configured".to_string(),
            ));
        }

        ctx.run("local.configure", async {
            fs::create_dir_all(&self.root)
                .await
                .map_err(|e| StorageError::io("create asset root", e))
        })
        .await?;

        self.configured.store(true, Ordering::Release);
        info!("Local asset storage ready");
        Ok(())
    }

    async fn upload_url(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<String> {
        ctx.check("local.upload_url")?;
        let token = self.signer.mint(TransferOp::Upload, path)?;
        Ok(self.url("upload", &token))
    }

    async fn download_url(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<String> {
        ctx.check("local.download_url")?;
        let token = self.signer.mint(TransferOp::Download, path)?;
        Ok(format!("{}/{}", self.url("download", &token), path.file_name()))
    }

    #[instrument(skip(self, ctx), fields(path = %path))]
    async fn remove(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<()> {
        self.ensure_configured()?;
        let target = self.resolve(path)?;

        ctx.run("local.remove", async {
            fs::remove_file(&target)
                .await
                .map_err(|e| not_found_or(path, e, "remove"))
        })
        .await?;

        debug!("Removed object");
        Ok(())
    }
}

#[async_trait]
impl ObjectProbe for LocalAssetStorage {
    async fn exists(&self, ctx: &RequestContext, path: &AssetPath) -> StorageResult<bool> {
        self.ensure_configured()?;
        let target = self.resolve(path)?;

        ctx.run("local.exists", async {
            fs::try_exists(&target)
                .await
                .map_err(|e| StorageError::io("stat", e))
        })
        .await
    }
}

fn not_found_or(path: &AssetPath, err: std::io::Error, operation: &str) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::io(format!("{} {}", operation, path), err)
    }
}
