//! Raw key/value store abstraction for the key/value engine

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::DbResult;

/// Byte-valued store with conditional writes and prefix scans
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>>;

    /// Write `value` only if `key` is absent; `false` if it was present
    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> DbResult<bool>;

    /// Replace the value at `key` only if it still equals `expected`
    async fn compare_and_swap(&self, key: &str, expected: &[u8], value: Vec<u8>)
        -> DbResult<bool>;

    /// Every entry whose key starts with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<(String, Vec<u8>)>>;

    async fn ping(&self) -> DbResult<()>;

    async fn close(&self) -> DbResult<()>;
}

/// Opens a [`KvStore`] when the engine is configured
#[async_trait]
pub trait KvConnector: Send + Sync {
    async fn connect(&self) -> DbResult<Arc<dyn KvStore>>;
}

/// In-process store backed by an ordered map
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> DbResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> DbResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(current) if current.as_slice() == expected => {
                *current = value;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Connector that opens a fresh in-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector;

#[async_trait]
impl KvConnector for MemoryConnector {
    async fn connect(&self) -> DbResult<Arc<dyn KvStore>> {
        Ok(Arc::new(MemoryKvStore::new()))
    }
}
