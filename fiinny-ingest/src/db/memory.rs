//! In-memory document store
//!
//! Backs the `--ephemeral` server mode and the test suites. Counts writes so
//! callers can assert that a run performed none.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{merge_fields, DocPath, Document, DocumentStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<DocPath, Document>>,
    writes: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes (partial updates and puts) since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn apply_partial_update(
        &self,
        path: &DocPath,
        fields: Document,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let document = documents.entry(path.clone()).or_default();
        merge_fields(document, fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put(&self, path: &DocPath, document: Document) -> Result<(), StoreError> {
        self.documents.write().await.insert(path.clone(), document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
