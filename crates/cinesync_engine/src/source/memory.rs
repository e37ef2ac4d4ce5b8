//! In-memory source for tests.

use super::SourceReader;
use crate::error::{SyncError, SyncResult};
use crate::row::RawRow;
use crate::stream::{EntityStream, Relation};
use crate::window::SyncWindow;
use async_trait::async_trait;
use cinesync_state::SyncCursor;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use uuid::Uuid;

/// A source backed by in-memory rows, with failure injection.
///
/// Reads apply the same cursor predicate, window bound, ordering and limit
/// as the SQL reader.
#[derive(Debug, Default)]
pub struct MemorySource {
    rows: RwLock<HashMap<String, Vec<RawRow>>>,
    relations: RwLock<HashMap<(Relation, Uuid), RawRow>>,
    unstamped: RwLock<HashMap<String, u64>>,
    fail_reads: Mutex<u32>,
    reads: Mutex<Vec<(String, Option<SyncCursor>)>>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows to a stream.
    pub fn insert(&self, stream: &str, rows: impl IntoIterator<Item = RawRow>) {
        self.rows
            .write()
            .entry(stream.to_string())
            .or_default()
            .extend(rows);
    }

    /// Replaces the row with the same id, or appends it.
    pub fn upsert(&self, stream: &str, row: RawRow) {
        let mut rows = self.rows.write();
        let rows = rows.entry(stream.to_string()).or_default();
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    /// Sets the re-derived relation row returned for `root_id`.
    pub fn set_relation(&self, relation: Relation, root_id: Uuid, row: RawRow) {
        self.relations.write().insert((relation, root_id), row);
    }

    /// Sets the number of NULL-stamped rows reported for a stream.
    pub fn set_unstamped(&self, stream: &str, count: u64) {
        self.unstamped.write().insert(stream.to_string(), count);
    }

    /// Makes the next `count` calls fail with a retryable error.
    pub fn fail_next_reads(&self, count: u32) {
        *self.fail_reads.lock() = count;
    }

    /// Returns every `read` call as `(stream, cursor)`, oldest first.
    pub fn reads(&self) -> Vec<(String, Option<SyncCursor>)> {
        self.reads.lock().clone()
    }

    fn injected_failure(&self) -> SyncResult<()> {
        let mut remaining = self.fail_reads.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SyncError::source_retryable("injected connection failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn read(
        &self,
        stream: &EntityStream,
        cursor: Option<&SyncCursor>,
        window: &SyncWindow,
        limit: u32,
    ) -> SyncResult<Vec<RawRow>> {
        self.reads.lock().push((stream.name.clone(), cursor.copied()));
        self.injected_failure()?;

        let rows = self.rows.read();
        let mut page: Vec<RawRow> = rows
            .get(&stream.name)
            .into_iter()
            .flatten()
            .filter(|row| cursor.map_or(true, |c| c.admits(row.timestamp, row.id)))
            .filter(|row| window.contains(row.timestamp))
            .cloned()
            .collect();
        page.sort_by_key(|row| (row.timestamp, row.id));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn read_relations(
        &self,
        _root: &EntityStream,
        relation: Relation,
        root_ids: &[Uuid],
    ) -> SyncResult<Vec<RawRow>> {
        self.injected_failure()?;
        let relations = self.relations.read();
        Ok(root_ids
            .iter()
            .filter_map(|id| relations.get(&(relation, *id)).cloned())
            .collect())
    }
    async fn count_unstamped(&self, stream: &EntityStream) -> SyncResult<u64> {
        Ok(self.unstamped.read().get(&stream.name).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn read_honours_cursor_window_and_limit() {
        let source = MemorySource::new();
        let ts = |s| Utc.timestamp_opt(s, 0).unwrap();
        source.insert(
            "persons",
            [
                RawRow::new(Uuid::from_u128(3), ts(20)),
                RawRow::new(Uuid::from_u128(1), ts(10)),
                RawRow::new(Uuid::from_u128(2), ts(10)),
                RawRow::new(Uuid::from_u128(4), ts(99)),
            ],
        );
        let stream = catalog::persons();
        let window = SyncWindow::new(ts(0), ts(50));

        let cursor = SyncCursor::new(ts(10), Uuid::from_u128(1));
        let page = source.read(&stream, Some(&cursor), &window, 10).await.unwrap();
        let ids: Vec<Uuid> = page.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2), Uuid::from_u128(3)]);

        let page = source.read(&stream, None, &window, 1).await.unwrap();
        assert_eq!(page[0].id, Uuid::from_u128(1));
        assert_eq!(source.reads().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_retryable() {
        let source = MemorySource::new();
        source.fail_next_reads(1);
        let window = SyncWindow::initial(Utc::now());

        let err = source
            .read(&catalog::genres(), None, &window, 10)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(source.read(&catalog::genres(), None, &window, 10).await.is_ok());
    }
}
