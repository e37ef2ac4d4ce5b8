//! Error types for state operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing cursors.
#[derive(Debug, Error)]
pub enum StateError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The state file exists but cannot be parsed.
    #[error("state file {path} is corrupted: {message}")]
    Corrupted {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Another process holds the state file lock.
    #[error("state file {0} is locked by another process")]
    Locked(PathBuf),

    /// Cursor serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
