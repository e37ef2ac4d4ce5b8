//! Configuration for the sync engine.

use crate::catalog;
use crate::error::{SyncError, SyncResult};
use crate::stream::{EntityStream, StreamKind};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Streams in the order the scheduler sweeps them.
    pub streams: Vec<EntityStream>,
    /// Pause between two sweeps.
    pub idle_delay: Duration,
    /// Timeout applied to every single source, index or state call.
    pub io_timeout: Duration,
    /// Backoff policy for transient I/O errors.
    pub io_retry: RetryConfig,
    /// How many times a batch rejected by the index is re-fetched before the
    /// stream is reported stuck for the current sweep.
    pub batch_attempts: u32,
}

impl SyncConfig {
    /// Creates a configuration for the given streams.
    pub fn new(streams: Vec<EntityStream>) -> Self {
        Self {
            streams,
            idle_delay: Duration::from_secs(3),
            io_timeout: Duration::from_secs(30),
            io_retry: RetryConfig::default(),
            batch_attempts: 5,
        }
    }

    /// Sets the target index of root stream `stream`.
    pub fn with_index(mut self, stream: &str, index: impl Into<String>) -> Self {
        let index = index.into();
        for s in self.streams.iter_mut().filter(|s| s.name == stream) {
            *s = s.clone().with_index(index.clone());
        }
        self
    }

    /// Target indexes of the root streams, in sweep order.
    pub fn indexes(&self) -> Vec<&str> {
        self.streams.iter().filter_map(EntityStream::index).collect()
    }

    /// Sets the pause between sweeps.
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Sets the per-call I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the I/O retry policy.
    pub fn with_io_retry(mut self, retry: RetryConfig) -> Self {
        self.io_retry = retry;
        self
    }

    /// Sets the number of attempts for a rejected batch.
    pub fn with_batch_attempts(mut self, attempts: u32) -> Self {
        self.batch_attempts = attempts;
        self
    }

    /// Overrides the page size of every stream.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        for stream in &mut self.streams {
            stream.batch_size = size;
        }
        self
    }

    /// Looks up a stream by name.
    pub fn stream(&self, name: &str) -> Option<&EntityStream> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Checks the configuration before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if:
    /// - No stream is configured, or a stream name repeats
    /// - A stream descriptor is invalid
    /// - A dependent stream references a root that is missing, is not a root,
    ///   comes later in the sweep order, or does not declare the relation
    /// - Batch attempts or the timeout are zero
    pub fn validate(&self) -> SyncResult<()> {
        if self.streams.is_empty() {
            return Err(SyncError::Config("no entity streams configured".into()));
        }
        if self.batch_attempts == 0 {
            return Err(SyncError::Config("batch_attempts must be at least 1".into()));
        }
        if self.io_timeout.is_zero() {
            return Err(SyncError::Config("io_timeout must be positive".into()));
        }

        let mut seen = HashSet::new();
        for (position, stream) in self.streams.iter().enumerate() {
            stream.validate()?;
            if !seen.insert(stream.name.as_str()) {
                return Err(SyncError::Config(format!(
                    "stream {} is configured twice",
                    stream.name
                )));
            }

            let Some((root_name, relation)) = stream.kind.root_relation() else {
                continue;
            };
            let root = self.streams[..position]
                .iter()
                .find(|s| s.name == root_name)
                .ok_or_else(|| {
                    SyncError::Config(format!(
                        "stream {} depends on root stream {} which is not scheduled before it",
                        stream.name, root_name
                    ))
                })?;
            let StreamKind::Root { joins, .. } = &root.kind else {
                return Err(SyncError::Config(format!(
                    "stream {} depends on {} which is not a root stream",
                    stream.name, root_name
                )));
            };
            if !joins.iter().any(|j| j.relation == relation) {
                return Err(SyncError::Config(format!(
                    "root stream {} does not declare relation {}",
                    root_name, relation
                )));
            }
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(catalog::default_streams())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, `None` to retry indefinitely.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays, never past
    /// `max_delay`.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration that retries indefinitely.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration limited to `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::unbounded()
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Returns true if another attempt is allowed after `failures` failures.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }

    /// Calculates the delay after the `attempt`-th failure (0-indexed):
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    /// Jitter is added before the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let capped = if capped.is_finite() { capped.max(0.0) } else { self.max_delay.as_secs_f64() };

        if self.add_jitter && capped > 0.0 {
            let jitter = capped * 0.25 * rand::thread_rng().gen::<f64>();
            let ceiling = self.max_delay.as_secs_f64();
            Duration::from_secs_f64((capped + jitter).min(ceiling))
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Relation;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::default()
            .with_index(catalog::FILM_WORKS, "films")
            .with_idle_delay(Duration::from_secs(1))
            .with_io_timeout(Duration::from_secs(5))
            .with_batch_attempts(2)
            .with_batch_size(50);

        assert_eq!(config.indexes(), vec!["films", "genres", "persons"]);
        assert_eq!(config.idle_delay, Duration::from_secs(1));
        assert_eq!(config.io_timeout, Duration::from_secs(5));
        assert_eq!(config.batch_attempts, 2);
        assert!(config.streams.iter().all(|s| s.batch_size == 50));
        config.validate().unwrap();
    }

    #[test]
    fn default_catalog_is_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.streams[0].name, "film_works");
    }

    #[test]
    fn empty_streams_rejected() {
        let config = SyncConfig::new(Vec::new());
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn duplicate_stream_rejected() {
        let config = SyncConfig::new(vec![catalog::film_works(), catalog::film_works()]);
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn dependent_before_root_rejected() {
        let config = SyncConfig::new(vec![catalog::person_film_works(), catalog::film_works()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not scheduled before it"));
    }

    #[test]
    fn missing_relation_rejected() {
        let mut root = catalog::film_works();
        if let StreamKind::Root { joins, .. } = &mut root.kind {
            joins.retain(|j| j.relation != Relation::Genres);
        }
        let config = SyncConfig::new(vec![root, catalog::genres()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("does not declare relation genres"));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert!(!config.allows_retry(1));
        assert!(RetryConfig::unbounded().allows_retry(u32::MAX));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::unbounded()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::unbounded()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn retry_delay_jitter_bounds() {
        let config = RetryConfig::unbounded()
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(true);

        let delay = config.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(200));
        assert!(delay <= Duration::from_millis(250));
    }

    #[test]
    fn jittered_delay_never_exceeds_ceiling() {
        let config = RetryConfig::unbounded().with_jitter(true);
        for attempt in [7, 20, 64] {
            for _ in 0..200 {
                let delay = config.delay_for_attempt(attempt);
                assert!(
                    delay <= config.max_delay,
                    "delay {:?} at attempt {} exceeds {:?}",
                    delay,
                    attempt,
                    config.max_delay
                );
            }
        }

        // Just under the ceiling, jitter can only close the gap.
        let config = RetryConfig::unbounded()
            .with_initial_delay(Duration::from_secs(9))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(true);
        for _ in 0..200 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_secs(9));
            assert!(delay <= Duration::from_secs(10));
        }
    }

    #[test]
    fn invalid_index_name_rejected() {
        let config = SyncConfig::default().with_index(catalog::GENRE_INDEX, "");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
