//! Backoff used while waiting for data connections.
//!
//! A wait starts at the initial interval and doubles each retry; it gives up
//! once the next interval would exceed the cap. The pause itself is behind
//! [`Waiter`] so the same retry logic runs on the tokio reactor or, where no
//! reactor is driving the connection, by blocking the calling thread.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{DataChannelSettings, WaiterKind};

#[async_trait]
pub trait Waiter: Send + Sync {
    async fn pause(&self, interval: Duration);
}

/// Yields to the tokio timer wheel.
pub struct ReactorWaiter;

#[async_trait]
impl Waiter for ReactorWaiter {
    async fn pause(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// Sleeps the current thread.
pub struct BlockingWaiter;

impl BlockingWaiter {
    pub fn sleep(interval: Duration) {
        std::thread::sleep(interval);
    }
}

#[async_trait]
impl Waiter for BlockingWaiter {
    async fn pause(&self, interval: Duration) {
        Self::sleep(interval);
    }
}

pub fn waiter_for(kind: WaiterKind) -> Arc<dyn Waiter> {
    match kind {
        WaiterKind::Reactor => Arc::new(ReactorWaiter),
        WaiterKind::Blocking => Arc::new(BlockingWaiter),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self { initial, cap }
    }

    pub fn from_settings(settings: &DataChannelSettings) -> Self {
        Self::new(settings.wait_initial(), settings.wait_cap())
    }

    /// The pauses taken between checks, in order.
    pub fn intervals(self) -> impl Iterator<Item = Duration> + Send {
        let cap = self.cap;
        std::iter::successors(Some(self.initial), |d| d.checked_mul(2))
            .take_while(move |d| !d.is_zero() && *d <= cap)
    }

    /// Re-evaluates `check` after every pause until it yields a value or
    /// the backoff is exhausted. `check` runs once more after the last pause.
    pub async fn retry<T, F>(&self, waiter: &dyn Waiter, mut check: F) -> Option<T>
    where
        F: FnMut() -> Option<T> + Send,
    {
        for interval in self.intervals() {
            if let Some(value) = check() {
                return Some(value);
            }
            waiter.pause(interval).await;
        }
        check()
    }

    /// Same schedule as [`Backoff::retry`] for callers outside any runtime.
    pub fn retry_blocking<T, F>(&self, mut check: F) -> Option<T>
    where
        F: FnMut() -> Option<T>,
    {
        for interval in self.intervals() {
            if let Some(value) = check() {
                return Some(value);
            }
            BlockingWaiter::sleep(interval);
        }
        check()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(25))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWaiter {
        pauses: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Waiter for RecordingWaiter {
        async fn pause(&self, interval: Duration) {
            self.pauses.lock().unwrap().push(interval);
        }
    }

    #[test]
    fn test_default_intervals_double_until_cap() {
        let intervals: Vec<_> = Backoff::default().intervals().collect();
        assert_eq!(intervals.len(), 8);
        assert_eq!(intervals[0], Duration::from_millis(100));
        assert_eq!(intervals[7], Duration::from_millis(12_800));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_cap() {
        let waiter = RecordingWaiter::default();
        let mut checks = 0;
        let result: Option<()> = Backoff::default()
            .retry(&waiter, || {
                checks += 1;
                None
            })
            .await;

        assert!(result.is_none());
        assert_eq!(checks, 9);
        let total: Duration = waiter.pauses.lock().unwrap().iter().sum();
        assert_eq!(total, Duration::from_millis(25_500));
    }

    #[tokio::test]
    async fn test_retry_stops_as_soon_as_check_succeeds() {
        let waiter = RecordingWaiter::default();
        let mut checks = 0;
        let result = Backoff::default()
            .retry(&waiter, || {
                checks += 1;
                (checks == 3).then_some(checks)
            })
            .await;

        assert_eq!(result, Some(3));
        assert_eq!(waiter.pauses.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_retry_blocking_follows_schedule() {
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(8));
        let started = std::time::Instant::now();
        let mut checks = 0;
        let result: Option<()> = backoff.retry_blocking(|| {
            checks += 1;
            None
        });

        assert!(result.is_none());
        assert_eq!(checks, 5);
        assert!(started.elapsed() >= Duration::from_millis(15));

        let mut checks = 0;
        let found = backoff.retry_blocking(|| {
            checks += 1;
            (checks == 2).then_some("ready")
        });
        assert_eq!(found, Some("ready"));
    }

    #[tokio::test]
    async fn test_retry_through_blocking_waiter() {
        let backoff = Backoff::new(Duration::from_millis(2), Duration::from_millis(8));
        let started = std::time::Instant::now();
        let mut checks = 0;
        let result = backoff
            .retry(&BlockingWaiter, || {
                checks += 1;
                (checks == 3).then_some(checks)
            })
            .await;

        assert_eq!(result, Some(3));
        assert!(started.elapsed() >= Duration::from_millis(6));
    }

    #[tokio::test]
    async fn test_blocking_waiter_sleeps() {
        let started = std::time::Instant::now();
        BlockingWaiter.pause(Duration::from_millis(20)).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
