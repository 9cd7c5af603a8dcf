//! Time abstractions for testable backoff scheduling.
//!
//! Delivery pipelines read time and sleep between attempts through the
//! [`Clock`] trait, so tests can drive retry schedules without waiting on the
//! wall clock.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

/// Clock abstraction for time operations.
///
/// Production code uses `RealClock`; tests inject a `TestClock`.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Returns the current system time for timestamps.
    fn now_system(&self) -> SystemTime;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Returns the current system time as a UTC timestamp.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now_system())
    }
}

/// Real clock backed by system time and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test clock for deterministic time control.
///
/// Runs in one of two modes:
///
/// - **auto-advance** (default): `sleep` moves the clock forward by the
///   requested duration and yields, so retry schedules complete instantly.
/// - **manual**: `sleep` parks until [`TestClock::advance`] moves the clock
///   past the deadline, letting tests observe a pipeline mid-backoff.
///
/// Every requested sleep is recorded in order.
#[derive(Debug, Clone)]
pub struct TestClock {
    inner: Arc<TestClockInner>,
}

#[derive(Debug)]
struct TestClockInner {
    monotonic_ns: AtomicU64,
    system_ns: AtomicU64,
    base_instant: Instant,
    auto_advance: AtomicBool,
    sleepers: AtomicUsize,
    advanced: Notify,
    sleeps: Mutex<Vec<Duration>>,
}

fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(u64::MAX)
}

impl TestClock {
    /// Creates an auto-advancing test clock starting at the current time.
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates an auto-advancing test clock starting at a specific time.
    pub fn with_start_time(start: SystemTime) -> Self {
        let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            inner: Arc::new(TestClockInner {
                monotonic_ns: AtomicU64::new(0),
                system_ns: AtomicU64::new(duration_to_ns(since_epoch)),
                base_instant: Instant::now(),
                auto_advance: AtomicBool::new(true),
                sleepers: AtomicUsize::new(0),
                advanced: Notify::new(),
                sleeps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a test clock whose sleeps wait for explicit advances.
    pub fn manual() -> Self {
        let clock = Self::new();
        clock.set_auto_advance(false);
        clock
    }

    /// Switches between auto-advance and manual mode.
    pub fn set_auto_advance(&self, enabled: bool) {
        self.inner.auto_advance.store(enabled, Ordering::Release);
        if enabled {
            self.inner.advanced.notify_waiters();
        }
    }

    /// Advances both clocks by the specified duration and wakes sleepers.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = duration_to_ns(duration);

        self.inner.monotonic_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.inner.system_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.inner.advanced.notify_waiters();
    }

    /// Returns elapsed time since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.inner.monotonic_ns.load(Ordering::Acquire))
    }

    /// Returns how many tasks are currently parked in `sleep`.
    pub fn sleeper_count(&self) -> usize {
        self.inner.sleepers.load(Ordering::Acquire)
    }

    /// Returns every duration passed to `sleep`, in call order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.inner.sleeps.lock().map(|sleeps| sleeps.clone()).unwrap_or_default()
    }

    fn record(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.inner.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.inner.base_instant + self.elapsed()
    }

    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.inner.system_ns.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.record(duration);

        if self.inner.auto_advance.load(Ordering::Acquire) {
            self.advance(duration);
            return Box::pin(tokio::task::yield_now());
        }

        let deadline = self.elapsed().saturating_add(duration);
        Box::pin(async move {
            let _sleeper = SleeperGuard::enter(&self.inner.sleepers);
            loop {
                let notified = self.inner.advanced.notified();
                if self.elapsed() >= deadline || self.inner.auto_advance.load(Ordering::Acquire)
                {
                    break;
                }
                notified.await;
            }
        })
    }
}

/// Keeps the sleeper count accurate when a sleep is cancelled mid-wait.
struct SleeperGuard<'a>(&'a AtomicUsize);

impl<'a> SleeperGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for SleeperGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(10));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(10));
    }

    #[test]
    fn test_clock_system_time() {
        let start = UNIX_EPOCH + Duration::from_secs(1000);
        let clock = TestClock::with_start_time(start);

        assert_eq!(clock.now_system(), start);

        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now_system(), start + Duration::from_secs(60));
        assert_eq!(clock.now_utc().timestamp(), 1060);
    }

    #[tokio::test]
    async fn auto_advance_sleep_moves_time_and_records() {
        let clock = TestClock::new();

        clock.sleep(Duration::from_secs(1)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn manual_sleep_waits_for_advance() {
        let clock = TestClock::manual();
        let sleeper = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep(Duration::from_secs(4)).await })
        };

        while clock.sleeper_count() == 0 {
            tokio::task::yield_now().await;
        }

        clock.advance(Duration::from_secs(3));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        clock.advance(Duration::from_secs(1));
        tokio::time::timeout(Duration::from_secs(1), sleeper).await.unwrap().unwrap();
        assert_eq!(clock.sleeper_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_sleep_releases_sleeper_slot() {
        let clock = TestClock::manual();
        let sleeper = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep(Duration::from_secs(60)).await })
        };

        while clock.sleeper_count() == 0 {
            tokio::task::yield_now().await;
        }

        sleeper.abort();
        assert!(sleeper.await.unwrap_err().is_cancelled());
        assert_eq!(clock.sleeper_count(), 0);
    }

    #[tokio::test]
    async fn real_clock_sleep_elapses() {
        let clock = RealClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_millis(5)).await;

        assert!(clock.now().duration_since(start) >= Duration::from_millis(5));
    }
}
