//! Polling scheduler: periodic background refresh while online.

use crate::ResourceKind;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default refresh cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest accepted refresh cadence.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A collection the runtime can refresh in the background.
#[async_trait]
pub trait Refresh: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// A fetch is already in flight.
    fn is_loading(&self) -> bool;

    /// Periodic refresh. Failures are logged, not returned.
    async fn refresh(&self);

    /// Drain pending operations, then reconcile with a full fetch.
    async fn reconnect(&self);
}

/// A single repeating timer driving [`Refresh::refresh`].
///
/// `start` and `stop` are idempotent. Each start resets the timer, so the
/// first tick fires one full interval later.
pub struct PollingScheduler {
    target: Arc<dyn Refresh>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(target: Arc<dyn Refresh>, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                resource = %target.kind(),
                ?interval,
                "Poll interval too short, using {:?}",
                MIN_POLL_INTERVAL
            );
        }
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self {
            target,
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn start(&self) {
        let mut task = self.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let target = self.target.clone();
        let period = self.interval;
        let first = Instant::now() + period;
        tracing::debug!(resource = %target.kind(), ?period, "Polling started");
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if target.is_loading() {
                    tracing::debug!(resource = %target.kind(), "Skipping poll, fetch in flight");
                    continue;
                }
                target.refresh().await;
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.lock().take() {
            task.abort();
            tracing::debug!(resource = %self.target.kind(), "Polling stopped");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("resource", &self.target.kind())
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        refreshes: AtomicUsize,
        loading: AtomicBool,
    }

    #[async_trait]
    impl Refresh for Counter {
        fn kind(&self) -> ResourceKind {
            ResourceKind::Plants
        }

        fn is_loading(&self) -> bool {
            self.loading.load(Ordering::SeqCst)
        }

        async fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }

        async fn reconnect(&self) {}
    }

    const PERIOD: Duration = Duration::from_secs(300);

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_full_interval() {
        let counter = Arc::new(Counter::default());
        let poller = PollingScheduler::new(counter.clone(), PERIOD);
        poller.start();
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 0);

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 1);

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let counter = Arc::new(Counter::default());
        let poller = PollingScheduler::new(counter.clone(), Duration::ZERO);
        assert_eq!(poller.interval(), MIN_POLL_INTERVAL);

        poller.start();
        tokio::time::advance(MIN_POLL_INTERVAL).await;
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 1);
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let counter = Arc::new(Counter::default());
        let poller = PollingScheduler::new(counter.clone(), PERIOD);

        poller.stop();
        poller.start();
        poller.start();
        assert!(poller.is_running());

        tokio::time::advance(PERIOD).await;
        settle().await;
        // A second start would have produced a second timer.
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 1);

        poller.stop();
        poller.stop();
        assert!(!poller.is_running());

        tokio::time::advance(PERIOD * 3).await;
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn skips_tick_while_fetch_in_flight() {
        let counter = Arc::new(Counter::default());
        counter.loading.store(true, Ordering::SeqCst);
        let poller = PollingScheduler::new(counter.clone(), PERIOD);
        poller.start();

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 0);

        counter.loading.store(false, Ordering::SeqCst);
        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 1);
    }
}
