//! Search index abstraction.

mod elastic;
mod memory;

pub use elastic::ElasticsearchWriter;
pub use memory::MemoryIndex;

use crate::document::IndexDocument;
use crate::error::SyncResult;
use async_trait::async_trait;
use serde_json::Value;

/// A document the index refused to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    /// Document id.
    pub id: String,
    /// HTTP status reported for the document.
    pub status: u16,
    /// Reason reported by the index.
    pub reason: String,
}

/// Outcome of one bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Number of documents written.
    pub succeeded: usize,
    /// Documents the index rejected.
    pub failures: Vec<DocumentFailure>,
}

impl UpsertReport {
    /// Returns true if every document was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of documents in the request.
    pub fn total(&self) -> usize {
        self.succeeded + self.failures.len()
    }
}

/// Writes documents to the search index.
///
/// # Invariants
///
/// - `upsert` merges each body into the stored document with the same id,
///   creating it if missing; repeating a write is a no-op
/// - A request-level failure is returned as `Err`; per-document failures are
///   reported in [`UpsertReport::failures`] and the rest may be written
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Upserts `docs` into `index`.
    async fn upsert(&self, index: &str, docs: &[IndexDocument]) -> SyncResult<UpsertReport>;

    /// Fetches the stored source of one document.
    async fn get(&self, index: &str, id: &str) -> SyncResult<Option<Value>>;
}
