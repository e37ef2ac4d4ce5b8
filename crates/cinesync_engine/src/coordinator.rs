//! Stream coordinator state machine.

use crate::config::{RetryConfig, SyncConfig};
use crate::document::IndexDocument;
use crate::error::{SyncError, SyncResult};
use crate::index::{DocumentFailure, IndexWriter, UpsertReport};
use crate::mapper::{self, DocumentAction};
use crate::retry::Retry;
use crate::row::RawRow;
use crate::signal::StopSignal;
use crate::source::SourceReader;
use crate::stream::{EntityStream, Relation};
use crate::window::SyncWindow;
use cinesync_state::{StateStore, SyncCursor};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Root ids resolved per relation query.
const RELATION_CHUNK: usize = 500;

/// The current state of a stream coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Between batches.
    Idle,
    /// Reading the cursor and the next page.
    Fetching,
    /// Mapping rows and resolving relation refreshes.
    Mapping,
    /// Writing documents to the index.
    Loading,
    /// Persisting the new cursor.
    Advancing,
    /// Waiting before re-fetching a rejected batch.
    RetryWait,
    /// No rows left in the current window.
    Exhausted,
    /// The last batch failed.
    Failed,
}

impl StreamState {
    /// Returns true while a batch is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StreamState::Fetching
                | StreamState::Mapping
                | StreamState::Loading
                | StreamState::Advancing
                | StreamState::RetryWait
        )
    }

    /// Returns true if a new batch can start.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            StreamState::Idle | StreamState::Exhausted | StreamState::Failed
        )
    }
}

/// Statistics of one stream.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Batches loaded and advanced.
    pub batches: u64,
    /// Rows read from the source, including re-fetched batches.
    pub rows_read: u64,
    /// Documents accepted by the index.
    pub documents_written: u64,
    /// Batches the index partially rejected.
    pub rejected_batches: u64,
    /// Transient I/O failures that were retried.
    pub retries: u64,
    /// Last persisted cursor.
    pub last_cursor: Option<SyncCursor>,
    /// Time of the last advanced batch.
    pub last_batch_time: Option<Instant>,
    /// Rows with a NULL timestamp, which no read can reach, as of the
    /// last exhaustion.
    pub unstamped_rows: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The batch was loaded and the cursor persisted.
    Advanced {
        /// Rows read.
        rows: usize,
        /// Documents written.
        documents: usize,
        /// The new cursor.
        cursor: SyncCursor,
    },
    /// The index rejected some documents; the cursor did not move.
    Rejected {
        /// Rejected documents.
        failures: Vec<DocumentFailure>,
        /// Documents in the batch.
        total: usize,
    },
    /// The source returned no rows.
    Exhausted,
}

/// Drives one entity stream through fetch, map, load and advance.
///
/// The cursor only moves after the index accepted every document of a
/// batch. A rejected batch is re-fetched with the unchanged cursor, and
/// because mapping is deterministic and writes are upserts, the retried
/// batch converges to the same index state.
pub struct StreamCoordinator<R: SourceReader, W: IndexWriter, S: StateStore> {
    stream: EntityStream,
    root: Option<EntityStream>,
    index: String,
    io_timeout: Duration,
    io_retry: RetryConfig,
    batch_attempts: u32,
    source: Arc<R>,
    writer: Arc<W>,
    store: Arc<S>,
    state: RwLock<StreamState>,
    stats: RwLock<StreamStats>,
    io_retries: AtomicU64,
    stop: StopSignal,
}

impl<R: SourceReader, W: IndexWriter, S: StateStore> StreamCoordinator<R, W, S> {
    /// Creates a coordinator for the configured stream `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownStream`] if `name` is not configured and
    /// [`SyncError::Config`] if its root stream is missing.
    pub fn new(
        config: &SyncConfig,
        name: &str,
        source: Arc<R>,
        writer: Arc<W>,
        store: Arc<S>,
    ) -> SyncResult<Self> {
        let stream = config
            .stream(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownStream(name.to_string()))?;
        let root = match stream.kind.root_relation() {
            Some((root_name, _)) => Some(config.stream(root_name).cloned().ok_or_else(|| {
                SyncError::Config(format!(
                    "stream {} depends on unknown root stream {}",
                    name, root_name
                ))
            })?),
            None => None,
        };
        let index = root
            .as_ref()
            .unwrap_or(&stream)
            .index()
            .map(str::to_string)
            .ok_or_else(|| SyncError::Config(format!("stream {} has no target index", name)))?;

        Ok(Self {
            stream,
            root,
            index,
            io_timeout: config.io_timeout,
            io_retry: config.io_retry.clone(),
            batch_attempts: config.batch_attempts,
            source,
            writer,
            store,
            state: RwLock::new(StreamState::Idle),
            stats: RwLock::new(StreamStats::default()),
            io_retries: AtomicU64::new(0),
            stop: StopSignal::new(),
        })
    }

    /// Shares `stop` with this coordinator.
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// The stream this coordinator drives.
    pub fn stream(&self) -> &EntityStream {
        &self.stream
    }

    /// The index this stream writes into.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Gets the current state.
    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> StreamStats {
        let mut stats = self.stats.read().clone();
        stats.retries = self.io_retries.load(Ordering::Relaxed);
        stats
    }

    fn set_state(&self, state: StreamState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!(stream = %self.stream.name, from = ?previous, to = ?state, "state transition");
        }
    }

    fn begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{:?}", StreamState::Fetching),
            });
        }
        *state = StreamState::Fetching;
        Ok(())
    }

    fn retry(&self) -> Retry<'_> {
        Retry::new(&self.io_retry)
            .with_timeout(self.io_timeout)
            .with_stop(&self.stop)
            .with_counter(&self.io_retries)
    }

    /// Runs one batch within `window`.
    ///
    /// Transient I/O errors are retried in place. A batch the index only
    /// partially accepted returns [`BatchOutcome::Rejected`] without touching
    /// the cursor.
    pub async fn run_batch(&self, window: &SyncWindow) -> SyncResult<BatchOutcome> {
        self.begin()?;
        match self.batch(window).await {
            Ok(outcome) => Ok(outcome),
            Err(SyncError::Cancelled) => {
                self.set_state(StreamState::Idle);
                Err(SyncError::Cancelled)
            }
            Err(error) => {
                self.set_state(StreamState::Failed);
                self.stats.write().last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    async fn batch(&self, window: &SyncWindow) -> SyncResult<BatchOutcome> {
        let name = self.stream.name.as_str();

        let cursor = self
            .retry()
            .run("state.get", || async { self.store.get(name).map_err(SyncError::from) })
            .await?;
        let rows = self
            .retry()
            .run("source.read", || {
                self.source
                    .read(&self.stream, cursor.as_ref(), window, self.stream.batch_size)
            })
            .await?;
        self.stats.write().rows_read += rows.len() as u64;

        let Some(last) = rows.last() else {
            self.set_state(StreamState::Exhausted);
            tracing::debug!(stream = name, "stream exhausted");
            return Ok(BatchOutcome::Exhausted);
        };
        let next = last.cursor();

        self.set_state(StreamState::Mapping);
        let docs = self.documents(&rows).await?;

        self.set_state(StreamState::Loading);
        let report = if docs.is_empty() {
            UpsertReport::default()
        } else {
            self.retry()
                .run("index.upsert", || self.writer.upsert(&self.index, &docs))
                .await?
        };
        self.stats.write().documents_written += report.succeeded as u64;

        if !report.is_complete() {
            let total = report.total();
            tracing::warn!(
                stream = name,
                failed = report.failures.len(),
                total,
                first_id = %report.failures[0].id,
                reason = %report.failures[0].reason,
                "index rejected documents; cursor not advanced"
            );
            self.stats.write().rejected_batches += 1;
            self.set_state(StreamState::Idle);
            return Ok(BatchOutcome::Rejected {
                failures: report.failures,
                total,
            });
        }

        self.set_state(StreamState::Advancing);
        self.retry()
            .run("state.set", || async { self.store.set(name, next).map_err(SyncError::from) })
            .await?;

        {
            let mut stats = self.stats.write();
            stats.batches += 1;
            stats.last_cursor = Some(next);
            stats.last_batch_time = Some(Instant::now());
            stats.last_error = None;
        }
        tracing::info!(
            stream = name,
            rows = rows.len(),
            documents = docs.len(),
            cursor = %next,
            "batch synced"
        );
        self.set_state(StreamState::Idle);

        Ok(BatchOutcome::Advanced {
            rows: rows.len(),
            documents: docs.len(),
            cursor: next,
        })
    }

    /// Maps rows and resolves relation refreshes into documents.
    async fn documents(&self, rows: &[RawRow]) -> SyncResult<Vec<IndexDocument>> {
        let mut docs = Vec::new();
        let mut refresh: Vec<(Relation, Vec<Uuid>)> = Vec::new();

        for action in mapper::map_batch(&self.stream, rows) {
            match action {
                DocumentAction::Upsert(doc) => docs.push(doc),
                DocumentAction::Refresh { root_id, relation } => {
                    match refresh.iter_mut().find(|(r, _)| *r == relation) {
                        Some((_, ids)) => ids.push(root_id),
                        None => refresh.push((relation, vec![root_id])),
                    }
                }
            }
        }

        if refresh.is_empty() {
            return Ok(docs);
        }
        let root = self.root.as_ref().ok_or_else(|| {
            SyncError::Config(format!("stream {} has no root stream", self.stream.name))
        })?;

        for (relation, ids) in refresh {
            for chunk in ids.chunks(RELATION_CHUNK) {
                let related = self
                    .retry()
                    .run("source.read_relations", || {
                        self.source.read_relations(root, relation, chunk)
                    })
                    .await?;
                docs.extend(mapper::map_relation_rows(relation, &related));
            }
        }
        Ok(docs)
    }

    /// Counts rows the stream can never read because their timestamp is NULL.
    ///
    /// Best effort with a single attempt; a failure only skips the count.
    async fn check_unstamped(&self) {
        let name = self.stream.name.as_str();
        let count = tokio::time::timeout(
            self.io_timeout,
            self.source.count_unstamped(&self.stream),
        )
        .await;
        match count {
            Ok(Ok(0)) => self.stats.write().unstamped_rows = 0,
            Ok(Ok(count)) => {
                tracing::warn!(
                    stream = name,
                    count,
                    column = %self.stream.timestamp_column,
                    "rows with a NULL timestamp are not synchronized"
                );
                self.stats.write().unstamped_rows = count;
            }
            Ok(Err(error)) => {
                tracing::debug!(stream = name, error = %error, "cannot count unstamped rows")
            }
            Err(_) => tracing::debug!(stream = name, "counting unstamped rows timed out"),
        }
    }

    /// Runs batches until the stream is exhausted within `window`.
    ///
    /// Returns `Ok(true)` once exhausted and `Ok(false)` if the stop signal
    /// was raised first. The signal is only checked between batches.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BatchRejected`] after `batch_attempts` rejected
    /// attempts of the same batch, or any non-retryable error.
    pub async fn run_once(&self, window: &SyncWindow) -> SyncResult<bool> {
        let mut rejections: u32 = 0;

        loop {
            if self.stop.is_stopped() {
                tracing::info!(stream = %self.stream.name, "stop requested");
                return Ok(false);
            }

            match self.run_batch(window).await {
                Ok(BatchOutcome::Exhausted) => {
                    self.check_unstamped().await;
                    return Ok(true);
                }
                Ok(BatchOutcome::Advanced { .. }) => rejections = 0,
                Ok(BatchOutcome::Rejected { failures, total }) => {
                    rejections += 1;
                    if rejections >= self.batch_attempts {
                        let error = SyncError::BatchRejected {
                            stream: self.stream.name.clone(),
                            failed: failures.len(),
                            total,
                        };
                        self.set_state(StreamState::Failed);
                        self.stats.write().last_error = Some(error.to_string());
                        return Err(error);
                    }

                    self.set_state(StreamState::RetryWait);
                    let delay = self.io_retry.delay_for_attempt(rejections - 1);
                    tracing::warn!(
                        stream = %self.stream.name,
                        attempt = rejections,
                        delay_ms = delay.as_millis() as u64,
                        "re-fetching rejected batch"
                    );
                    let completed = self.stop.sleep(delay).await;
                    self.set_state(StreamState::Idle);
                    if !completed {
                        return Ok(false);
                    }
                }
                Err(SyncError::Cancelled) => return Ok(false),
                Err(error) => return Err(error),
            }
        }
    }
}
