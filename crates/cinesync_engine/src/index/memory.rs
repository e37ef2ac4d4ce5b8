//! In-memory index for tests.

use super::{DocumentFailure, IndexWriter, UpsertReport};
use crate::document::IndexDocument;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// An index that merges documents into a map, with failure injection.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: RwLock<HashMap<(String, String), Map<String, Value>>>,
    rejected: RwLock<HashSet<String>>,
    fail_requests: Mutex<u32>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every future write of the document `id`.
    pub fn reject(&self, id: impl Into<String>) {
        self.rejected.write().insert(id.into());
    }

    /// Accepts writes of `id` again.
    pub fn accept(&self, id: &str) {
        self.rejected.write().remove(id);
    }

    /// Makes the next `count` requests fail with a retryable error.
    pub fn fail_next_requests(&self, count: u32) {
        *self.fail_requests.lock() = count;
    }

    /// Returns the stored document.
    pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.documents
            .read()
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of stored documents across all indices.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Document ids of every accepted `upsert` request, oldest first.
    pub fn upsert_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    fn injected_failure(&self) -> SyncResult<()> {
        let mut remaining = self.fail_requests.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SyncError::index_retryable("injected 503 service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexWriter for MemoryIndex {
    async fn upsert(&self, index: &str, docs: &[IndexDocument]) -> SyncResult<UpsertReport> {
        self.injected_failure()?;
        self.calls
            .lock()
            .push(docs.iter().map(|d| d.id.clone()).collect());

        let rejected = self.rejected.read();
        let mut documents = self.documents.write();
        let mut report = UpsertReport::default();
        for doc in docs {
            if rejected.contains(&doc.id) {
                report.failures.push(DocumentFailure {
                    id: doc.id.clone(),
                    status: 400,
                    reason: "rejected".to_string(),
                });
                continue;
            }
            let stored = documents
                .entry((index.to_string(), doc.id.clone()))
                .or_default();
            for (key, value) in &doc.body {
                stored.insert(key.clone(), value.clone());
            }
            report.succeeded += 1;
        }
        Ok(report)
    }

    async fn get(&self, index: &str, id: &str) -> SyncResult<Option<Value>> {
        self.injected_failure()?;
        Ok(self.document(index, id).map(Value::Object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, field: &str, value: &str) -> IndexDocument {
        let mut body = Map::new();
        body.insert(field.into(), Value::from(value));
        IndexDocument::new(id, body)
    }

    #[tokio::test]
    async fn upsert_merges_top_level_fields() {
        let index = MemoryIndex::new();
        index.upsert("movies", &[doc("1", "title", "Alien")]).await.unwrap();
        index.upsert("movies", &[doc("1", "director", "Scott")]).await.unwrap();

        let stored = index.get("movies", "1").await.unwrap().unwrap();
        assert_eq!(stored["title"], "Alien");
        assert_eq!(stored["director"], "Scott");
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn rejected_documents_are_reported() {
        let index = MemoryIndex::new();
        index.reject("2");
        let report = index
            .upsert("movies", &[doc("1", "t", "a"), doc("2", "t", "b")])
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures[0].id, "2");
        assert!(index.document("movies", "2").is_none());
    }
}
