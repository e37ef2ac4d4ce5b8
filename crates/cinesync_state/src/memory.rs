//! In-memory state store.

use crate::cursor::SyncCursor;
use crate::error::StateResult;
use crate::store::StateStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A state store that keeps cursors in memory.
///
/// Cursors are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    cursors: RwLock<BTreeMap<String, SyncCursor>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of streams with a cursor.
    pub fn len(&self) -> usize {
        self.cursors.read().len()
    }

    /// Returns true if no stream has a cursor.
    pub fn is_empty(&self) -> bool {
        self.cursors.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, stream: &str) -> StateResult<Option<SyncCursor>> {
        Ok(self.cursors.read().get(stream).copied())
    }

    fn set(&self, stream: &str, cursor: SyncCursor) -> StateResult<()> {
        self.cursors.write().insert(stream.to_string(), cursor);
        Ok(())
    }

    fn remove(&self, stream: &str) -> StateResult<bool> {
        Ok(self.cursors.write().remove(stream).is_some())
    }

    fn entries(&self) -> StateResult<Vec<(String, SyncCursor)>> {
        Ok(self
            .cursors
            .read()
            .iter()
            .map(|(name, cursor)| (name.clone(), *cursor))
            .collect())
    }
}
