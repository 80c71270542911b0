//! Document store capability
//!
//! The pipeline reads job and transaction documents and writes field-level
//! partial updates. It depends only on [`DocumentStore`]; the SQLite and
//! in-memory backends live in submodules.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Collection holding ingest jobs under each user
pub const JOBS_COLLECTION: &str = "ingest_jobs";

/// A document body: a JSON object
pub type Document = serde_json::Map<String, Value>;

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed document address
    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    /// Stored data is not a JSON object
    #[error("Document at {0} is not a JSON object")]
    NotAnObject(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Validated document address
///
/// Slash-separated, an even number of non-empty segments alternating
/// collection and document id: `users/{uid}/expenses/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim().trim_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        if trimmed.is_empty()
            || segments.len() % 2 != 0
            || segments.iter().any(|s| s.trim().is_empty())
        {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self(segments.join("/")))
    }

    /// Build a path from alternating collection/id segments
    pub fn from_segments(segments: &[&str]) -> Result<Self, StoreError> {
        if segments.iter().any(|s| s.contains('/')) {
            return Err(StoreError::InvalidPath(segments.join("/")));
        }
        Self::parse(&segments.join("/"))
    }

    /// `users/{owner}/ingest_jobs/{job_id}`
    pub fn ingest_job(owner: &str, job_id: &str) -> Result<Self, StoreError> {
        Self::from_segments(&["users", owner, JOBS_COLLECTION, job_id])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `users/{owner}/{collection}/{id}` outside the job queue
    pub fn is_record(&self) -> bool {
        let segments: Vec<&str> = self.0.split('/').collect();
        matches!(
            segments.as_slice(),
            ["users", _, collection, _] if *collection != JOBS_COLLECTION
        )
    }

    /// Owner segment of a `users/{owner}/...` path
    pub fn owner(&self) -> Option<&str> {
        let mut segments = self.0.split('/');
        match (segments.next(), segments.next()) {
            (Some("users"), Some(owner)) => Some(owner),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage capability consumed by the pipeline
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` if absent
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    async fn exists(&self, path: &DocPath) -> Result<bool, StoreError> {
        Ok(self.get(path).await?.is_some())
    }

    /// Field-level upsert
    ///
    /// Every named field is set (a JSON `null` stores null rather than
    /// deleting). Fields not named are left untouched. A missing document is
    /// created holding only the given fields.
    async fn apply_partial_update(&self, path: &DocPath, fields: Document)
        -> Result<(), StoreError>;

    /// Replace a whole document (producers and fixtures only)
    async fn put(&self, path: &DocPath, document: Document) -> Result<(), StoreError>;
}

/// Top-level field merge shared by the backends
pub(crate) fn merge_fields(target: &mut Document, fields: Document) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}
