//! # cinesync engine
//!
//! Incremental synchronization of a relational film catalog into a search
//! index.
//!
//! This crate provides:
//! - Entity stream descriptors and the film catalog
//! - Source readers (PostgreSQL, in-memory)
//! - Pure document mapping
//! - Index writers (Elasticsearch `_bulk`, in-memory), one target index per
//!   root stream
//! - Retry with capped exponential backoff and per-call timeouts
//! - The per-stream coordinator state machine and the sweep scheduler
//!
//! ## Architecture
//!
//! Every stream is driven by a [`StreamCoordinator`]:
//! 1. Read the stream cursor from the [`cinesync_state::StateStore`]
//! 2. Read the next page after the cursor, bounded by the sweep window
//! 3. Map rows to documents, or to relation refreshes of root documents
//! 4. Upsert documents into the index
//! 5. Persist the cursor of the last row, only if every document was written
//!
//! The [`SyncScheduler`] runs the coordinators in order, root stream first,
//! and advances the [`SyncWindow`] once every stream is exhausted.
//!
//! ## Key Invariants
//!
//! - Within a stream, rows are delivered in strict `(timestamp, id)` order
//! - A cursor never moves past a row the index did not accept
//! - Delivery is at least once; upserts make redelivery harmless
//! - Cancellation happens between batches, never inside one

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
mod config;
mod coordinator;
mod document;
mod error;
pub mod index;
pub mod mapper;
mod retry;
mod row;
mod scheduler;
mod signal;
pub mod source;
mod stream;
mod window;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{BatchOutcome, StreamCoordinator, StreamState, StreamStats};
pub use document::{
    FilmDocument, GenreDocument, GenresPatch, IndexDocument, NamedRef, PersonDocument,
    PersonsPatch,
};
pub use error::{SyncError, SyncResult};
pub use index::{DocumentFailure, ElasticsearchWriter, IndexWriter, MemoryIndex, UpsertReport};
pub use mapper::{
    film_document, genre_document, map_batch, map_relation_rows, person_document, DocumentAction,
};
pub use retry::{with_backoff, Retry};
pub use row::RawRow;
pub use scheduler::{SweepReport, SyncScheduler};
pub use signal::StopSignal;
pub use source::{MemorySource, PostgresSource, SourceReader};
pub use stream::{DocumentKind, EntityStream, Relation, RelationJoin, StreamKind};
pub use window::SyncWindow;
