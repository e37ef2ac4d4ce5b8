//! The time window of a sweep.

use chrono::{DateTime, Utc};
use std::fmt;

/// Bounds the source rows a sweep considers in scope.
///
/// Rows stamped after `end` wait for the next sweep, so a fast stream
/// cannot race ahead of a slow one. The window only moves once every stream
/// of a sweep is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Reference point where the sweep starts.
    pub start: DateTime<Utc>,
    /// Upper bound (inclusive) of row timestamps read in this sweep.
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Creates a window.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The first window: from the beginning of time until `now`.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH, now)
    }

    /// Returns the next window, starting where this one ended.
    pub fn next(&self, now: DateTime<Utc>) -> Self {
        Self::new(self.end, now.max(self.end))
    }

    /// Returns true if a row stamped `timestamp` is in scope.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp <= self.end
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn next_starts_at_previous_end() {
        let window = SyncWindow::initial(ts(100));
        assert_eq!(window.start, ts(0));

        let next = window.next(ts(250));
        assert_eq!(next.start, ts(100));
        assert_eq!(next.end, ts(250));
    }

    #[test]
    fn next_never_moves_backwards() {
        let window = SyncWindow::new(ts(0), ts(100));
        let next = window.next(ts(50));
        assert_eq!(next.end, ts(100));
    }

    #[test]
    fn end_is_inclusive() {
        let window = SyncWindow::new(ts(0), ts(100));
        assert!(window.contains(ts(100)));
        assert!(!window.contains(ts(101)));
    }
}
