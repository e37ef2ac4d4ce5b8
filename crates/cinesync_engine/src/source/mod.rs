//! Relational source abstraction.

mod memory;
mod postgres;
pub mod query;

pub use memory::MemorySource;
pub use postgres::PostgresSource;

use crate::error::SyncResult;
use crate::row::RawRow;
use crate::stream::{EntityStream, Relation};
use crate::window::SyncWindow;
use async_trait::async_trait;
use cinesync_state::SyncCursor;
use uuid::Uuid;

/// Reads stream pages from the relational source.
///
/// This trait abstracts the database, allowing for different implementations
/// (PostgreSQL, in-memory for testing).
///
/// # Invariants
///
/// - `read` returns rows strictly after `cursor` in `(timestamp, id)` order,
///   never later than `window.end`, sorted ascending, at most `limit` rows
/// - With no cursor the page starts at the beginning of the stream
/// - An empty page means the stream is exhausted for this window
/// - Rows whose timestamp column is NULL have no position in the order and
///   are never returned; [`SourceReader::count_unstamped`] reports them
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Reads the next page of `stream`.
    async fn read(
        &self,
        stream: &EntityStream,
        cursor: Option<&SyncCursor>,
        window: &SyncWindow,
        limit: u32,
    ) -> SyncResult<Vec<RawRow>>;

    /// Re-derives `relation` for the given roots of the `root` stream.
    ///
    /// Returns one row per existing root, with the aggregated relation under
    /// [`Relation::as_str`]. Unknown ids are skipped.
    async fn read_relations(
        &self,
        root: &EntityStream,
        relation: Relation,
        root_ids: &[Uuid],
    ) -> SyncResult<Vec<RawRow>>;

    /// Counts rows of `stream` whose timestamp column is NULL.
    async fn count_unstamped(&self, stream: &EntityStream) -> SyncResult<u64>;
}
