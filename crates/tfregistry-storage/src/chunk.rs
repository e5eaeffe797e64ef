//! Chunked upload reassembly
//!
//! Each chunk is stored as `.{file}.{upload}.part-{n}` next to the
//! destination file, where `upload` is the ID of the transfer token that
//! carried it. Parts of different uploads never mix, even when they target
//! the same logical path.
//!
//! The chunk numbered `total` commits the upload: it is stored like any
//! other part, then the assembler checks that every part `1..=total` of the
//! same upload is present, claims the file with an exclusive
//! `.{file}.assembling` marker, concatenates the parts in index order into
//! a temporary file and renames it into place. A final chunk that finds
//! parts missing fails with `IncompleteUpload`; resending it once the gaps
//! are filled completes the upload. Leftovers of other uploads older than
//! the upload token lifetime are removed as they are encountered.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::path::AssetPath;
use crate::token::DEFAULT_UPLOAD_TTL_SECS;

/// Header carrying the 1-based chunk index
pub const CHUNK_NUMBER_HEADER: &str = "Chunk-Number";
/// Header carrying the declared chunk count
pub const TOTAL_CHUNKS_HEADER: &str = "Total-Chunks";
/// Header carrying the destination file name
pub const FILE_NAME_HEADER: &str = "File-Name";

/// Largest accepted `Total-Chunks`
pub const MAX_CHUNKS: u32 = 10_000;

/// Metadata of one chunk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub number: u32,
    pub total: u32,
    pub file_name: String,
}

impl ChunkInfo {
    pub fn new(number: u32, total: u32, file_name: impl Into<String>) -> StorageResult<Self> {
        if total == 0 {
            return Err(StorageError::InvalidInput(
                "Total-Chunks must be at least 1".to_string(),
            ));
        }
        if total > MAX_CHUNKS {
            return Err(StorageError::InvalidInput(format!(
                "Total-Chunks {} exceeds the limit of {}",
                total, MAX_CHUNKS
            )));
        }
        if number == 0 || number > total {
            return Err(StorageError::InvalidInput(format!(
                "Chunk-Number {} outside 1..={}",
                number, total
            )));
        }
        Ok(Self {
            number,
            total,
            file_name: file_name.into(),
        })
    }

    /// Parse the raw header values
    pub fn from_headers(number: &str, total: &str, file_name: &str) -> StorageResult<Self> {
        let number = number.trim().parse::<u32>().map_err(|_| {
            StorageError::InvalidInput(format!("Chunk-Number '{}' is not a number", number))
        })?;
        let total = total.trim().parse::<u32>().map_err(|_| {
            StorageError::InvalidInput(format!("Total-Chunks '{}' is not a number", total))
        })?;
        Self::new(number, total, file_name.trim())
    }

    /// The file name must name the file the token is bound to
    pub fn check_against(&self, path: &AssetPath) -> StorageResult<()> {
        if self.file_name != path.file_name() {
            return Err(StorageError::InvalidInput(format!(
                "File-Name '{}' does not match the upload target",
                self.file_name
            )));
        }
        Ok(())
    }

    pub fn is_final(&self) -> bool {
        self.number == self.total
    }
}

/// What happened after a chunk was stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Waiting for more parts or for the final chunk
    Pending { received: u32, total: u32 },
    /// The final chunk found every part and the file was assembled
    Assembled { bytes: u64 },
    /// This upload was already assembled; the chunk was discarded
    AlreadyAssembled,
}

/// Removes the assembly marker when dropped
struct AssemblyClaim {
    path: PathBuf,
}

impl Drop for AssemblyClaim {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to release assembly marker {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Reassembles chunked uploads on the local filesystem
#[derive(Debug, Clone, Copy)]
pub struct ChunkAssembler {
    /// Age after which markers and other uploads' parts are abandoned
    stale_after: Duration,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(DEFAULT_UPLOAD_TTL_SECS as u64),
        }
    }
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Where part `number` of upload `upload_id` to `destination` is kept
    pub fn part_path(destination: &Path, upload_id: &str, number: u32) -> PathBuf {
        sibling(
            destination,
            &format!(".{}.{}.part-{}", file_name(destination), upload_id, number),
        )
    }

    fn done_path(destination: &Path, upload_id: &str) -> PathBuf {
        sibling(
            destination,
            &format!(".{}.{}.assembled", file_name(destination), upload_id),
        )
    }

    fn claim_path(destination: &Path) -> PathBuf {
        sibling(destination, &format!(".{}.assembling", file_name(destination)))
    }

    /// Store one chunk of upload `upload_id`; the final chunk assembles the file
    #[instrument(skip(self, data), fields(destination = %destination.display(), chunk = info.number, total = info.total))]
    pub async fn store_chunk(
        &self,
        destination: &Path,
        upload_id: &str,
        info: &ChunkInfo,
        data: &[u8],
    ) -> StorageResult<ChunkOutcome> {
        check_upload_id(upload_id)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        if exists(&Self::done_path(destination, upload_id)).await? {
            info!("Chunk for an assembled upload, ignoring");
            return Ok(ChunkOutcome::AlreadyAssembled);
        }

        write_atomically(&Self::part_path(destination, upload_id, info.number), data).await?;
        debug!(bytes = data.len(), "Stored chunk");

        if !info.is_final() {
            let present = self.scan_parts(destination, upload_id, info.total).await?;
            return Ok(ChunkOutcome::Pending {
                received: present.len() as u32,
                total: info.total,
            });
        }

        let bytes = self.assemble(destination, upload_id, info.total).await?;
        Ok(ChunkOutcome::Assembled { bytes })
    }

    /// Concatenate parts `1..=total` of upload `upload_id` into `destination`.
    ///
    /// Fails with `IncompleteUpload` naming the missing parts instead of
    /// producing a truncated file, and with `Conflict` if another request
    /// is already assembling the same file.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn assemble(
        &self,
        destination: &Path,
        upload_id: &str,
        total: u32,
    ) -> StorageResult<u64> {
        check_upload_id(upload_id)?;
        let present = self.scan_parts(destination, upload_id, total).await?;
        let missing: Vec<u32> = (1..=total).filter(|n| !present.contains(n)).collect();
        if !missing.is_empty() {
            return Err(incomplete(destination, missing));
        }

        let _claim = self.claim(destination).await?;

        let staging = sibling(
            destination,
            &format!(".{}.tmp-{}", file_name(destination), Uuid::new_v4()),
        );
        let bytes = match concatenate(destination, upload_id, &staging, total).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        fs::rename(&staging, destination)
            .await
            .map_err(|e| StorageError::io("rename assembled file", e))?;

        if let Err(e) = File::create(Self::done_path(destination, upload_id)).await {
            warn!("Failed to record assembled upload: {}", e);
        }
        for number in 1..=total {
            if let Err(e) = fs::remove_file(Self::part_path(destination, upload_id, number)).await {
                warn!(chunk = number, "Failed to remove consumed chunk: {}", e);
            }
        }

        info!(bytes, parts = total, "Assembled chunked upload");
        Ok(bytes)
    }

    async fn claim(&self, destination: &Path) -> StorageResult<AssemblyClaim> {
        let path = Self::claim_path(destination);
        match create_marker(&path).await {
            Ok(()) => return Ok(AssemblyClaim { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(StorageError::io("claim assembly", e)),
        }

        if !self.is_stale(&path).await? {
            return Err(StorageError::Conflict(format!(
                "{} is already being assembled",
                file_name(destination)
            )));
        }

        warn!(marker = %path.display(), "Breaking stale assembly marker");
        remove_if_present(&path).await?;
        match create_marker(&path).await {
            Ok(()) => Ok(AssemblyClaim { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::Conflict(format!(
                    "{} is already being assembled",
                    file_name(destination)
                )))
            }
            Err(e) => Err(StorageError::io("claim assembly", e)),
        }
    }

    /// Part numbers of one upload found on disk, from a single listing of
    /// the destination directory. Stale leftovers of other uploads to the
    /// same file are removed along the way.
    async fn scan_parts(
        &self,
        destination: &Path,
        upload_id: &str,
        total: u32,
    ) -> StorageResult<BTreeSet<u32>> {
        let mut present = BTreeSet::new();
        let Some(dir) = destination.parent() else {
            return Ok(present);
        };
        let prefix = format!(".{}.", file_name(destination));

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(present),
            Err(e) => return Err(StorageError::io("list chunks", e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io("list chunks", e))?
        {
            let name = entry.file_name();
            let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
                continue;
            };
            let Some((owner, kind)) = rest.split_once('.') else {
                continue;
            };
            if Uuid::parse_str(owner).is_err() {
                continue;
            }

            if owner == upload_id {
                if let Some(number) = kind.strip_prefix("part-").and_then(|n| n.parse().ok()) {
                    if (1..=total).contains(&number) {
                        present.insert(number);
                    }
                }
            } else if self.is_stale(&entry.path()).await? {
                debug!(entry = rest, "Removing stale upload leftover");
                if let Err(e) = remove_if_present(&entry.path()).await {
                    warn!("Failed to remove stale upload leftover: {}", e);
                }
            }
        }

        Ok(present)
    }

    async fn is_stale(&self, path: &Path) -> StorageResult<bool> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(StorageError::io("stat", e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::io("stat", e))?;
        Ok(modified
            .elapsed()
            .map(|age| age >= self.stale_after)
            .unwrap_or(false))
    }
}

/// Upload IDs become part of file names, so only token IDs are accepted
fn check_upload_id(upload_id: &str) -> StorageResult<()> {
    Uuid::parse_str(upload_id)
        .map(|_| ())
        .map_err(|_| StorageError::InvalidInput(format!("invalid upload id '{}'", upload_id)))
}

async fn create_marker(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map(|_| ())
}

async fn remove_if_present(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io("remove", e)),
    }
}

async fn concatenate(
    destination: &Path,
    upload_id: &str,
    staging: &Path,
    total: u32,
) -> StorageResult<u64> {
    let mut output = File::create(staging)
        .await
        .map_err(|e| StorageError::io("create assembly file", e))?;
    let mut bytes = 0u64;

    for number in 1..=total {
        let part = ChunkAssembler::part_path(destination, upload_id, number);
        let mut input = match File::open(&part).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(incomplete(destination, vec![number]));
            }
            Err(e) => return Err(StorageError::io("open chunk", e)),
        };
        bytes += tokio::io::copy(&mut input, &mut output)
            .await
            .map_err(|e| StorageError::io("copy chunk", e))?;
    }

    output
        .flush()
        .await
        .map_err(|e| StorageError::io("flush assembly file", e))?;
    output
        .sync_all()
        .await
        .map_err(|e| StorageError::io("sync assembly file", e))?;
    Ok(bytes)
}

/// Write `data` to a temporary sibling and rename it over `target`
pub(crate) async fn write_atomically(target: &Path, data: &[u8]) -> StorageResult<()> {
    let staging = sibling(target, &format!(".{}.tmp-{}", file_name(target), Uuid::new_v4()));

    let result = async {
        let mut file = File::create(&staging).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&staging, target).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&staging).await;
        return Err(StorageError::io(format!("write {}", file_name(target)), e));
    }
    Ok(())
}

async fn exists(path: &Path) -> StorageResult<bool> {
    fs::try_exists(path)
        .await
        .map_err(|e| StorageError::io("stat", e))
}

fn incomplete(destination: &Path, missing: Vec<u32>) -> StorageError {
    StorageError::IncompleteUpload {
        path: file_name(destination).to_string(),
        missing,
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn upload_id() -> String {
        Uuid::new_v4().to_string()
    }

    async fn backdate(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        let modified = std::time::SystemTime::now() - age;
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_chunk_info_validation() {
        assert!(ChunkInfo::new(1, 1, "a.zip").is_ok());
        assert!(ChunkInfo::new(0, 3, "a.zip").is_err());
        assert!(ChunkInfo::new(4, 3, "a.zip").is_err());
        assert!(ChunkInfo::new(1, 0, "a.zip").is_err());
        assert!(ChunkInfo::from_headers("two", "3", "a.zip").is_err());

        let info = ChunkInfo::from_headers(" 3 ", "3", "a.zip").unwrap();
        assert!(info.is_final());

        let path = AssetPath::parse("providers/org1/private/acme/widget/1.0.0/a.zip").unwrap();
        assert!(info.check_against(&path).is_ok());
        assert!(ChunkInfo::new(1, 3, "b.zip")
            .unwrap()
            .check_against(&path)
            .is_err());
    }

    #[test]
    fn test_total_chunks_is_capped() {
        assert!(ChunkInfo::new(1, MAX_CHUNKS, "a.zip").is_ok());
        assert!(matches!(
            ChunkInfo::new(1, MAX_CHUNKS + 1, "a.zip"),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(matches!(
            ChunkInfo::from_headers("1", "4294967295", "a.zip"),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_in_order_reassembly() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("nested").join("widget.zip");
        let data = payload(10_000);
        let chunks: Vec<&[u8]> = data.chunks(1024).collect();
        let total = chunks.len() as u32;
        let assembler = ChunkAssembler::new();
        let id = upload_id();

        for (index, chunk) in chunks.iter().enumerate() {
            let info = ChunkInfo::new(index as u32 + 1, total, "widget.zip").unwrap();
            let outcome = assembler
                .store_chunk(&destination, &id, &info, chunk)
                .await
                .unwrap();
            if info.is_final() {
                assert_eq!(outcome, ChunkOutcome::Assembled { bytes: 10_000 });
            } else {
                assert_eq!(
                    outcome,
                    ChunkOutcome::Pending {
                        received: index as u32 + 1,
                        total
                    }
                );
            }
        }

        assert_eq!(fs::read(&destination).await.unwrap(), data);
        for number in 1..=total {
            assert!(!ChunkAssembler::part_path(&destination, &id, number).exists());
        }
    }

    #[tokio::test]
    async fn test_reverse_order_reassembly() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let data = payload(5_000);
        let chunks: Vec<&[u8]> = data.chunks(1024).collect();
        let total = chunks.len() as u32;
        let assembler = ChunkAssembler::new();
        let id = upload_id();

        let last = ChunkInfo::new(total, total, "widget.zip").unwrap();
        match assembler
            .store_chunk(&destination, &id, &last, chunks[total as usize - 1])
            .await
        {
            Err(StorageError::IncompleteUpload { missing, .. }) => {
                assert_eq!(missing, (1..total).collect::<Vec<_>>())
            }
            other => panic!("expected incomplete upload, got {:?}", other),
        }

        for (index, chunk) in chunks.iter().enumerate().rev().skip(1) {
            let info = ChunkInfo::new(index as u32 + 1, total, "widget.zip").unwrap();
            let outcome = assembler
                .store_chunk(&destination, &id, &info, chunk)
                .await
                .unwrap();
            assert!(matches!(outcome, ChunkOutcome::Pending { .. }));
        }
        assert!(!destination.exists());

        let outcome = assembler
            .store_chunk(&destination, &id, &last, chunks[total as usize - 1])
            .await
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::Assembled { bytes: 5_000 });
        assert_eq!(fs::read(&destination).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_non_final_chunk_completing_set_stays_pending() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let assembler = ChunkAssembler::new();
        let id = upload_id();

        for number in [1, 3, 2] {
            let info = ChunkInfo::new(number, 3, "widget.zip").unwrap();
            match assembler.store_chunk(&destination, &id, &info, b"ab").await {
                Ok(outcome) => assert!(matches!(outcome, ChunkOutcome::Pending { .. })),
                Err(StorageError::IncompleteUpload { .. }) => assert_eq!(number, 3),
                Err(e) => panic!("unexpected error {:?}", e),
            }
        }

        assert!(!destination.exists());
        let last = ChunkInfo::new(2, 3, "widget.zip").unwrap();
        assert_eq!(
            assembler
                .store_chunk(&destination, &id, &last, b"ab")
                .await
                .unwrap(),
            ChunkOutcome::Pending {
                received: 3,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn test_missing_chunk_is_incomplete() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let assembler = ChunkAssembler::new();
        let id = upload_id();

        let first = ChunkInfo::new(1, 3, "widget.zip").unwrap();
        assert_eq!(
            assembler
                .store_chunk(&destination, &id, &first, b"chunk")
                .await
                .unwrap(),
            ChunkOutcome::Pending {
                received: 1,
                total: 3
            }
        );

        let last = ChunkInfo::new(3, 3, "widget.zip").unwrap();
        match assembler.store_chunk(&destination, &id, &last, b"chunk").await {
            Err(StorageError::IncompleteUpload { missing, .. }) => assert_eq!(missing, vec![2]),
            other => panic!("expected incomplete upload, got {:?}", other),
        }
        assert!(!destination.exists());
        assert!(ChunkAssembler::part_path(&destination, &id, 1).exists());
        assert!(ChunkAssembler::part_path(&destination, &id, 3).exists());
    }

    #[tokio::test]
    async fn test_parts_of_another_upload_are_never_used() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let assembler = ChunkAssembler::new();

        // An abandoned upload left a full set of parts behind
        let abandoned = upload_id();
        for number in 1..=3 {
            write_atomically(
                &ChunkAssembler::part_path(&destination, &abandoned, number),
                format!("old{}", number).as_bytes(),
            )
            .await
            .unwrap();
        }

        let id = upload_id();
        for number in 1..=2 {
            let info = ChunkInfo::new(number, 3, "widget.zip").unwrap();
            let outcome = assembler
                .store_chunk(&destination, &id, &info, format!("new{}", number).as_bytes())
                .await
                .unwrap();
            assert_eq!(
                outcome,
                ChunkOutcome::Pending {
                    received: number,
                    total: 3
                }
            );
        }
        assert!(!destination.exists());

        let last = ChunkInfo::new(3, 3, "widget.zip").unwrap();
        assembler
            .store_chunk(&destination, &id, &last, b"new3")
            .await
            .unwrap();
        assert_eq!(fs::read(&destination).await.unwrap(), b"new1new2new3");
    }

    #[tokio::test]
    async fn test_stale_leftovers_are_removed() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let assembler = ChunkAssembler::new().with_stale_after(Duration::from_secs(60));

        let stale = upload_id();
        let stale_part = ChunkAssembler::part_path(&destination, &stale, 1);
        write_atomically(&stale_part, b"old").await.unwrap();
        backdate(&stale_part, Duration::from_secs(120)).await;

        let active = upload_id();
        let active_part = ChunkAssembler::part_path(&destination, &active, 1);
        write_atomically(&active_part, b"live").await.unwrap();

        let info = ChunkInfo::new(1, 2, "widget.zip").unwrap();
        assembler
            .store_chunk(&destination, &upload_id(), &info, b"new")
            .await
            .unwrap();

        assert!(!stale_part.exists());
        assert!(active_part.exists());
    }

    #[tokio::test]
    async fn test_repeated_final_chunk_is_noop() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let assembler = ChunkAssembler::new();
        let id = upload_id();

        for number in 1..=2 {
            let info = ChunkInfo::new(number, 2, "widget.zip").unwrap();
            assembler
                .store_chunk(&destination, &id, &info, &[number as u8; 4])
                .await
                .unwrap();
        }

        let info = ChunkInfo::new(2, 2, "widget.zip").unwrap();
        let outcome = assembler
            .store_chunk(&destination, &id, &info, b"late")
            .await
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::AlreadyAssembled);
        assert_eq!(fs::read(&destination).await.unwrap(), vec![1, 1, 1, 1, 2, 2, 2, 2]);
        assert!(!ChunkAssembler::part_path(&destination, &id, 2).exists());
    }

    #[tokio::test]
    async fn test_concurrent_claim_conflicts() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let assembler = ChunkAssembler::new();
        let id = upload_id();
        write_atomically(&ChunkAssembler::part_path(&destination, &id, 1), b"x")
            .await
            .unwrap();

        let held = assembler.claim(&destination).await.unwrap();
        assert!(matches!(
            assembler.assemble(&destination, &id, 1).await,
            Err(StorageError::Conflict(_))
        ));

        drop(held);
        assert_eq!(assembler.assemble(&destination, &id, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_assembly_marker_is_broken() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let id = upload_id();
        write_atomically(&ChunkAssembler::part_path(&destination, &id, 1), b"x")
            .await
            .unwrap();

        // A crashed assembler never released its marker
        let marker = ChunkAssembler::claim_path(&destination);
        std::fs::File::create(&marker).unwrap();

        let fresh = ChunkAssembler::new().with_stale_after(Duration::from_secs(60));
        assert!(matches!(
            fresh.assemble(&destination, &id, 1).await,
            Err(StorageError::Conflict(_))
        ));

        backdate(&marker, Duration::from_secs(120)).await;
        assert_eq!(fresh.assemble(&destination, &id, 1).await.unwrap(), 1);
        assert!(!marker.exists());
        assert_eq!(fs::read(&destination).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_upload_id_must_be_token_id() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("widget.zip");
        let info = ChunkInfo::new(1, 1, "widget.zip").unwrap();
        assert!(matches!(
            ChunkAssembler::new()
                .store_chunk(&destination, "../escape", &info, b"x")
                .await,
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_parts_are_scoped_by_directory() {
        let dir = TempDir::new().unwrap();
        let id = upload_id();
        let a = dir.path().join("1.0.0").join("widget.zip");
        let b = dir.path().join("2.0.0").join("widget.zip");
        assert_ne!(
            ChunkAssembler::part_path(&a, &id, 1),
            ChunkAssembler::part_path(&b, &id, 1)
        );
    }
}
