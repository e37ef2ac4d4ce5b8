//! Cooperative stop signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

/// A clonable flag asking coordinators and the scheduler to stop.
///
/// The flag is checked between batches, never inside one. Backoff and idle
/// sleeps wake up as soon as it is raised.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    /// Creates a signal that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal and wakes every sleeper.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Lowers the signal.
    pub fn reset(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
    }

    /// Returns true once the signal is raised.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless the signal is raised first.
    ///
    /// Returns true if the full duration elapsed without a stop.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.inner.notify.notified();
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
            _ = notified => false,
        }
    }

    /// Waits until the signal is raised.
    pub async fn stopped(&self) {
        let notified = self.inner.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_when_not_stopped() {
        let signal = StopSignal::new();
        assert!(signal.sleep(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn sleep_returns_early_on_stop() {
        let signal = StopSignal::new();
        let stopper = signal.clone();

        let handle = tokio::spawn(async move { signal.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stopper.stop();

        let completed = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sleep did not wake up")
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn stopped_signal_skips_sleep() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.is_stopped());
        assert!(!signal.sleep(Duration::from_secs(60)).await);
        signal.stopped().await;

        signal.reset();
        assert!(!signal.is_stopped());
    }
}
