//! # cinesync state
//!
//! Durable cursor tracking for cinesync entity streams.
//!
//! Each entity stream owns exactly one [`SyncCursor`], keyed by the stream
//! name. The cursor is the `(timestamp, id)` watermark of the last row that
//! was successfully written to the search index.
//!
//! ## Backends
//!
//! - [`MemoryStateStore`] - For tests and one-shot runs
//! - [`FileStateStore`] - JSON file with write-then-rename crash safety
//!
//! ## Invariants
//!
//! - An absent key means the stream has never run
//! - An interrupted `set` leaves either the old or the new cursor readable
//! - Keys are stream-scoped, so streams never contend on each other's cursor

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod error;
mod file;
mod memory;
mod store;

pub use cursor::SyncCursor;
pub use error::{StateError, StateResult};
pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use store::StateStore;
