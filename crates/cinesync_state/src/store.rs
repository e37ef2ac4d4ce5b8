//! State store trait definition.

use crate::cursor::SyncCursor;
use crate::error::StateResult;
use std::sync::Arc;

/// Durable key/value persistence of stream cursors.
///
/// # Invariants
///
/// - `get` returns `None` for a stream that has never been `set`
/// - `set` is all-or-nothing: a crash mid-write leaves the previous or the
///   new cursor readable, never a partial value
/// - Stores must be `Send + Sync`; the scheduler guarantees that a given
///   stream key is only mutated by one coordinator at a time
///
/// # Implementors
///
/// - [`super::MemoryStateStore`] - For testing
/// - [`super::FileStateStore`] - For persistent state
pub trait StateStore: Send + Sync {
    /// Returns the cursor of `stream`, or `None` if the stream never ran.
    fn get(&self, stream: &str) -> StateResult<Option<SyncCursor>>;

    /// Durably replaces the cursor of `stream`.
    fn set(&self, stream: &str, cursor: SyncCursor) -> StateResult<()>;

    /// Forgets the cursor of `stream`. Returns true if one existed.
    fn remove(&self, stream: &str) -> StateResult<bool>;

    /// Returns every stored cursor, ordered by stream name.
    fn entries(&self) -> StateResult<Vec<(String, SyncCursor)>>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn get(&self, stream: &str) -> StateResult<Option<SyncCursor>> {
        (**self).get(stream)
    }

    fn set(&self, stream: &str, cursor: SyncCursor) -> StateResult<()> {
        (**self).set(stream, cursor)
    }

    fn remove(&self, stream: &str) -> StateResult<bool> {
        (**self).remove(stream)
    }

    fn entries(&self) -> StateResult<Vec<(String, SyncCursor)>> {
        (**self).entries()
    }
}
