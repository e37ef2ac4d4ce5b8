//! Retry with capped exponential backoff.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::signal::StopSignal;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Calls an operation until it succeeds, fails permanently, or the
/// configured attempts run out.
///
/// Each attempt is bounded by an optional timeout, which turns a hung call
/// into a retryable [`SyncError::Timeout`]. Backoff sleeps are interrupted by
/// the stop signal, in which case [`SyncError::Cancelled`] is returned.
#[derive(Debug, Clone)]
pub struct Retry<'a> {
    config: &'a RetryConfig,
    timeout: Option<Duration>,
    stop: Option<&'a StopSignal>,
    counter: Option<&'a AtomicU64>,
}

impl<'a> Retry<'a> {
    /// Creates a retry driver for `config`.
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            timeout: None,
            stop: None,
            counter: None,
        }
    }

    /// Bounds every attempt by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Interrupts backoff sleeps when `stop` is raised.
    pub fn with_stop(mut self, stop: &'a StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Counts every retry in `counter`.
    pub fn with_counter(mut self, counter: &'a AtomicU64) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Runs `operation`, retrying retryable failures.
    ///
    /// Non-retryable errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut failures: u32 = 0;

        loop {
            let result = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, operation())
                    .await
                    .unwrap_or(Err(SyncError::Timeout(limit))),
                None => operation().await,
            };

            let error = match result {
                Ok(value) => {
                    if failures > 0 {
                        tracing::info!(operation = label, attempts = failures + 1, "recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            failures = failures.saturating_add(1);
            if !error.is_retryable() || !self.config.allows_retry(failures) {
                return Err(error);
            }

            if let Some(counter) = self.counter {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            let delay = self.config.delay_for_attempt(failures - 1);
            tracing::warn!(
                operation = label,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );

            let completed = match self.stop {
                Some(stop) => stop.sleep(delay).await,
                None => {
                    tokio::time::sleep(delay).await;
                    true
                }
            };
            if !completed {
                return Err(SyncError::Cancelled);
            }
        }
    }
}

/// Runs `operation` under `config` with no timeout and no stop signal.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, operation: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    Retry::new(config).run("operation", operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast() -> RetryConfig {
        RetryConfig::unbounded()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(SyncError::source_retryable("connection refused"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = with_backoff(&fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Config("bad credentials".into()))
        })
        .await;

        assert!(matches!(result, Err(SyncError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempt_limit_is_honoured() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(1));
        let result: SyncResult<()> = Retry::new(&config)
            .run("index", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::index_retryable("503"))
            })
            .await;

        assert!(matches!(result, Err(SyncError::Index { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hung_call_times_out_and_is_retried() {
        let calls = AtomicU32::new(0);
        let config = fast();
        let result = Retry::new(&config)
            .with_timeout(Duration::from_millis(20))
            .run("read", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok("rows")
            })
            .await;

        assert_eq!(result.unwrap(), "rows");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_are_counted() {
        let calls = AtomicU32::new(0);
        let retries = AtomicU64::new(0);
        let config = fast();
        Retry::new(&config)
            .with_counter(&retries)
            .run("write", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SyncError::index_retryable("429"))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_interrupts_backoff() {
        let config = RetryConfig::unbounded().with_initial_delay(Duration::from_secs(60));
        let stop = StopSignal::new();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.stop();
        });

        let result: SyncResult<()> = Retry::new(&config)
            .with_stop(&stop)
            .run("read", || async { Err(SyncError::source_retryable("down")) })
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
