//! Sweep scheduler.

use crate::config::SyncConfig;
use crate::coordinator::{StreamCoordinator, StreamStats};
use crate::error::{SyncError, SyncResult};
use crate::index::IndexWriter;
use crate::signal::StopSignal;
use crate::source::SourceReader;
use crate::window::SyncWindow;
use chrono::Utc;
use cinesync_state::StateStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Window the sweep ran in.
    pub window: SyncWindow,
    /// Streams that reached exhaustion.
    pub exhausted: Vec<String>,
    /// Streams interrupted by the stop signal.
    pub pending: Vec<String>,
    /// Streams that failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Whether the window moved on after this sweep.
    pub window_advanced: bool,
    /// Wall-clock duration of the sweep.
    pub duration: Duration,
}

impl SweepReport {
    /// Returns true if every stream was exhausted.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.failed.is_empty()
    }
}

/// Runs every configured stream, in order, to exhaustion within a window.
///
/// Root streams come first so a document exists before association or
/// related streams patch it. The window only advances when a sweep
/// exhausted every stream; a failing stream keeps the window where it is
/// and is retried on the next sweep while the other streams keep running.
pub struct SyncScheduler<R: SourceReader, W: IndexWriter, S: StateStore> {
    config: SyncConfig,
    coordinators: Vec<StreamCoordinator<R, W, S>>,
    window: RwLock<SyncWindow>,
    stop: StopSignal,
    sweeps: AtomicU64,
}

impl<R: SourceReader, W: IndexWriter, S: StateStore> SyncScheduler<R, W, S> {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the configuration is invalid. No I/O
    /// happens before validation passes.
    pub fn new(config: SyncConfig, source: Arc<R>, writer: Arc<W>, store: Arc<S>) -> SyncResult<Self> {
        config.validate()?;

        let stop = StopSignal::new();
        let coordinators = config
            .streams
            .iter()
            .map(|stream| {
                StreamCoordinator::new(
                    &config,
                    &stream.name,
                    source.clone(),
                    writer.clone(),
                    store.clone(),
                )
                .map(|c| c.with_stop(stop.clone()))
            })
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self {
            config,
            coordinators,
            window: RwLock::new(SyncWindow::initial(Utc::now())),
            stop,
            sweeps: AtomicU64::new(0),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns a handle that stops the scheduler when raised.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Gets the current window.
    pub fn window(&self) -> SyncWindow {
        *self.window.read()
    }

    /// Number of completed sweeps.
    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Returns the coordinator of stream `name`.
    pub fn coordinator(&self, name: &str) -> Option<&StreamCoordinator<R, W, S>> {
        self.coordinators.iter().find(|c| c.stream().name == name)
    }

    /// Gets the stats of every stream, in sweep order.
    pub fn stats(&self) -> Vec<(String, StreamStats)> {
        self.coordinators
            .iter()
            .map(|c| (c.stream().name.clone(), c.stats()))
            .collect()
    }

    /// Runs one stream to exhaustion in the current window.
    ///
    /// Returns `Ok(true)` when exhausted and `Ok(false)` when stopped.
    pub async fn run_once(&self, stream: &str) -> SyncResult<bool> {
        let coordinator = self
            .coordinator(stream)
            .ok_or_else(|| SyncError::UnknownStream(stream.to_string()))?;
        coordinator.run_once(&self.window()).await
    }

    /// Runs every stream once and advances the window if all were exhausted.
    pub async fn run_sweep(&self) -> SweepReport {
        let start = Instant::now();
        let window = self.window();
        let mut report = SweepReport {
            window,
            exhausted: Vec::new(),
            pending: Vec::new(),
            failed: Vec::new(),
            window_advanced: false,
            duration: Duration::ZERO,
        };

        for coordinator in &self.coordinators {
            let name = coordinator.stream().name.clone();
            if self.stop.is_stopped() {
                report.pending.push(name);
                continue;
            }
            match coordinator.run_once(&window).await {
                Ok(true) => report.exhausted.push(name),
                Ok(false) => report.pending.push(name),
                Err(error) => {
                    tracing::error!(stream = %name, error = %error, "stream failed in this sweep");
                    report.failed.push((name, error.to_string()));
                }
            }
        }

        if report.is_complete() {
            *self.window.write() = window.next(Utc::now());
            report.window_advanced = true;
            self.sweeps.fetch_add(1, Ordering::Relaxed);
        }
        report.duration = start.elapsed();

        tracing::info!(
            window = %window,
            exhausted = report.exhausted.len(),
            pending = report.pending.len(),
            failed = report.failed.len(),
            advanced = report.window_advanced,
            duration_ms = report.duration.as_millis() as u64,
            "sweep finished"
        );
        report
    }

    /// Sweeps until the stop signal is raised, idling between sweeps.
    pub async fn run_forever(&self) -> SyncResult<()> {
        tracing::info!(
            streams = self.coordinators.len(),
            indexes = ?self.config.indexes(),
            "scheduler started"
        );
        while !self.stop.is_stopped() {
            self.run_sweep().await;
            if !self.stop.sleep(self.config.idle_delay).await {
                break;
            }
        }
        tracing::info!(sweeps = self.sweeps_completed(), "scheduler stopped");
        Ok(())
    }
}
