//! Rows returned by the source.

use chrono::{DateTime, Utc};
use cinesync_state::SyncCursor;
use serde_json::{Map, Value};
use uuid::Uuid;

/// One relational record of a stream batch.
///
/// `id` and `timestamp` are the stream's ordering columns; `fields` holds the
/// remaining columns (and aggregated relations) by name. For association and
/// related streams, `root_ids` lists the root entities the row affects.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Primary key.
    pub id: Uuid,
    /// Value of the stream's timestamp column.
    pub timestamp: DateTime<Utc>,
    /// Column name to value.
    pub fields: Map<String, Value>,
    /// Root entities affected by this row.
    pub root_ids: Vec<Uuid>,
}

impl RawRow {
    /// Creates a row without fields.
    pub fn new(id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            fields: Map::new(),
            root_ids: Vec::new(),
        }
    }

    /// Adds a column value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the affected root entities.
    pub fn with_root_ids(mut self, root_ids: Vec<Uuid>) -> Self {
        self.root_ids = root_ids;
        self
    }

    /// Returns a column value, treating JSON `null` as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// The cursor pointing at this row.
    pub fn cursor(&self) -> SyncCursor {
        SyncCursor::new(self.timestamp, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn null_is_absent() {
        let row = RawRow::new(Uuid::from_u128(1), Utc.timestamp_opt(5, 0).unwrap())
            .with_field("title", "Alien")
            .with_field("description", Value::Null);

        assert_eq!(row.get("title"), Some(&Value::from("Alien")));
        assert!(row.get("description").is_none());
        assert!(row.get("rating").is_none());
        assert_eq!(row.cursor().last_seen_id, Uuid::from_u128(1));
    }
}
