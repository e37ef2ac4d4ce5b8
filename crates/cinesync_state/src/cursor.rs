//! The per-stream sync cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Position of one entity stream: the last row that reached the index.
///
/// `(last_seen_timestamp, last_seen_id)` is a total order over the rows of a
/// stream. The id breaks ties between rows that share a timestamp, so a
/// reader resuming from a cursor neither skips nor repeats rows.
///
/// On disk the cursor is stored as
/// `{"last_seen_timestamp": "<RFC 3339>", "last_seen_id": "<uuid>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Timestamp column value of the last synchronized row.
    pub last_seen_timestamp: DateTime<Utc>,
    /// Primary key of the last synchronized row.
    pub last_seen_id: Uuid,
}

impl SyncCursor {
    /// Creates a cursor positioned at the given row.
    pub fn new(last_seen_timestamp: DateTime<Utc>, last_seen_id: Uuid) -> Self {
        Self {
            last_seen_timestamp,
            last_seen_id,
        }
    }

    /// Returns true if a row at `(timestamp, id)` comes after this cursor.
    ///
    /// This is `(ts = cursor.ts AND id > cursor.id) OR ts > cursor.ts`, the
    /// same predicate the SQL reader sends to the source.
    pub fn admits(&self, timestamp: DateTime<Utc>, id: Uuid) -> bool {
        (timestamp == self.last_seen_timestamp && id > self.last_seen_id)
            || timestamp > self.last_seen_timestamp
    }

    /// Returns the cursor as an ordered `(timestamp, id)` pair.
    pub fn position(&self) -> (DateTime<Utc>, Uuid) {
        (self.last_seen_timestamp, self.last_seen_id)
    }
}

impl PartialOrd for SyncCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SyncCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position().cmp(&other.position())
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.last_seen_timestamp.to_rfc3339(),
            self.last_seen_id
        )
    }
}
