//! Error types for the sync engine.

use cinesync_state::StateError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Relational source error.
    #[error("source error: {message}")]
    Source {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Search index error affecting a whole request.
    #[error("index error: {message}")]
    Index {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Cursor persistence error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Invalid or incomplete configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A batch kept failing in the index and its cursor cannot advance.
    #[error("stream {stream} is stuck: {failed} of {total} documents rejected by the index")]
    BatchRejected {
        /// Stream name.
        stream: String,
        /// Number of rejected documents in the last attempt.
        failed: usize,
        /// Number of documents in the batch.
        total: usize,
    },

    /// No stream with this name is configured.
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A single I/O call exceeded its timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl SyncError {
    /// Creates a retryable source error.
    pub fn source_retryable(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable source error.
    pub fn source_fatal(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable index error.
    pub fn index_retryable(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable index error.
    pub fn index_fatal(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Source { retryable, .. } | SyncError::Index { retryable, .. } => *retryable,
            SyncError::State(StateError::Io(_)) => true,
            SyncError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::source_retryable("connection refused").is_retryable());
        assert!(!SyncError::source_fatal("column does not exist").is_retryable());
        assert!(SyncError::index_retryable("503 service unavailable").is_retryable());
        assert!(!SyncError::index_fatal("400 bad request").is_retryable());
        assert!(SyncError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(SyncError::State(StateError::Io(std::io::Error::other("disk"))).is_retryable());
        assert!(!SyncError::Config("no streams".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::BatchRejected {
            stream: "film_works".into(),
            failed: 1,
            total: 5,
        };
        assert_eq!(
            err.to_string(),
            "stream film_works is stuck: 1 of 5 documents rejected by the index"
        );

        let err = SyncError::UnknownStream("songs".into());
        assert_eq!(err.to_string(), "unknown stream: songs");
    }
}
