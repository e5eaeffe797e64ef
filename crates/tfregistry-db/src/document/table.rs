//! Attribute-store table abstraction for the document engine

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tfregistry_core::StorageKey;
use tokio::sync::RwLock;

use crate::error::DbResult;

/// One item in the table
///
/// `data` holds the record as JSON. Records that own a growing child list
/// keep the children in `items` (JSON each) with a parallel list of unique
/// `item_keys` that conditional appends check against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub partition: String,
    pub sort: String,
    pub data: String,
    pub items: Vec<String>,
    pub item_keys: Vec<String>,
}

impl Document {
    pub fn new(key: &StorageKey, data: String) -> Self {
        Self {
            partition: key.partition.clone(),
            sort: key.sort.clone(),
            data,
            items: Vec::new(),
            item_keys: Vec::new(),
        }
    }
}

/// Result of a conditional list append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The item key is already in the list
    Duplicate,
    /// No document under the key
    Missing,
}

/// Table with composite (partition, sort) keys and conditional writes
#[async_trait]
pub trait DocumentTable: Send + Sync {
    async fn get(&self, key: &StorageKey) -> DbResult<Option<Document>>;

    /// Write only if no document exists under the same key
    async fn put_if_absent(&self, document: Document) -> DbResult<bool>;

    /// Every document in a partition, ordered by sort key
    async fn query(&self, partition: &str) -> DbResult<Vec<Document>>;

    /// Atomically append `item` unless `item_key` is already present
    async fn append_unique(
        &self,
        key: &StorageKey,
        item_key: &str,
        item: String,
    ) -> DbResult<AppendOutcome>;

    async fn ping(&self) -> DbResult<()>;
}

/// Opens a [`DocumentTable`] when the engine is configured
#[async_trait]
pub trait DocumentConnector: Send + Sync {
    async fn connect(&self) -> DbResult<Arc<dyn DocumentTable>>;
}

/// In-process table
#[derive(Default)]
pub struct MemoryDocumentTable {
    documents: RwLock<BTreeMap<(String, String), Document>>,
}

impl MemoryDocumentTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentTable for MemoryDocumentTable {
    async fn get(&self, key: &StorageKey) -> DbResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&(key.partition.clone(), key.sort.clone()))
            .cloned())
    }

    async fn put_if_absent(&self, document: Document) -> DbResult<bool> {
        let mut documents = self.documents.write().await;
        let key = (document.partition.clone(), document.sort.clone());
        if documents.contains_key(&key) {
            return Ok(false);
        }
        documents.insert(key, document);
        Ok(true)
    }

    async fn query(&self, partition: &str) -> DbResult<Vec<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .range((partition.to_string(), String::new())..)
            .take_while(|((p, _), _)| p == partition)
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn append_unique(
        &self,
        key: &StorageKey,
        item_key: &str,
        item: String,
    ) -> DbResult<AppendOutcome> {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(&(key.partition.clone(), key.sort.clone())) else {
            return Ok(AppendOutcome::Missing);
        };
        if document.item_keys.iter().any(|k| k == item_key) {
            return Ok(AppendOutcome::Duplicate);
        }
        document.items.push(item);
        document.item_keys.push(item_key.to_string());
        Ok(AppendOutcome::Appended)
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Connector that opens a fresh in-memory table
#[derive(Debug, Default, Clone)]
pub struct MemoryDocumentConnector;

#[async_trait]
impl DocumentConnector for MemoryDocumentConnector {
    async fn connect(&self) -> DbResult<Arc<dyn DocumentTable>> {
        Ok(Arc::new(MemoryDocumentTable::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfregistry_core::keys;
    use tfregistry_core::RecordId;

    #[tokio::test]
    async fn test_query_stays_in_partition() {
        let table = MemoryDocumentTable::new();
        let a = RecordId::new();
        let b = RecordId::new();
        for (id, version) in [(a, "1.0.0"), (a, "2.0.0"), (b, "1.0.0")] {
            let key = keys::provider_version(id, version);
            assert!(table
                .put_if_absent(Document::new(&key, "{}".to_string()))
                .await
                .unwrap());
        }

        let partition = keys::provider_version(a, "1.0.0").partition;
        let docs = table.query(&partition).await.unwrap();
        let sorts: Vec<_> = docs.iter().map(|d| d.sort.as_str()).collect();
        assert_eq!(sorts, vec!["1.0.0", "2.0.0"]);
    }

    #[tokio::test]
    async fn test_append_unique() {
        let table = MemoryDocumentTable::new();
        let key = keys::provider_version(RecordId::new(), "1.0.0");

        let outcome = table
            .append_unique(&key, "linux/amd64", "{}".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Missing);

        table
            .put_if_absent(Document::new(&key, "{}".to_string()))
            .await
            .unwrap();
        assert_eq!(
            table
                .append_unique(&key, "linux/amd64", "{}".to_string())
                .await
                .unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(
            table
                .append_unique(&key, "linux/amd64", "{}".to_string())
                .await
                .unwrap(),
            AppendOutcome::Duplicate
        );
    }
}
