use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Last time a client request was fully received.
///
/// Stored as nanoseconds since a fixed origin so reads and writes are single
/// atomic operations. The proxy is the only writer; the idle reaper and the
/// status endpoint only read.
#[derive(Debug)]
pub struct ActivityClock {
    origin: Instant,
    last_ns: AtomicU64,
}

impl ActivityClock {
    /// A clock whose last activity is "now", so a freshly started manager
    /// waits one full idle threshold before reaping a worker it finds running.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ns: AtomicU64::new(0),
        }
    }

    /// Record activity at the current instant and return it.
    pub fn touch(&self) -> Instant {
        let now = Instant::now();
        self.record(now);
        now
    }

    /// Record activity at `at`. Never moves the clock backwards.
    pub fn record(&self, at: Instant) {
        let ns = self.offset_ns(at);
        self.last_ns.fetch_max(ns, Ordering::AcqRel);
    }

    pub fn last_activity(&self) -> Instant {
        self.origin + Duration::from_nanos(self.last_ns.load(Ordering::Acquire))
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    /// True only when idleness strictly exceeds `threshold`.
    pub fn is_idle_past(&self, threshold: Duration) -> bool {
        self.idle_for() > threshold
    }

    fn offset_ns(&self, at: Instant) -> u64 {
        let offset = at.saturating_duration_since(self.origin).as_nanos();
        offset.min(u64::MAX as u128) as u64
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn idle_grows_with_time_and_resets_on_touch() {
        let clock = ActivityClock::new();
        assert_eq!(clock.idle_for(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(42)).await;
        assert_eq!(clock.idle_for(), Duration::from_secs(42));

        clock.touch();
        assert_eq!(clock.idle_for(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_boundary_is_not_idle() {
        let clock = ActivityClock::new();
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(!clock.is_idle_past(Duration::from_secs(300)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(clock.is_idle_past(Duration::from_secs(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_millisecond_touch_keeps_boundary_exact() {
        let clock = ActivityClock::new();
        tokio::time::advance(Duration::from_micros(600)).await;
        clock.touch();
        tokio::time::advance(Duration::from_secs(300)).await;

        assert_eq!(clock.idle_for(), Duration::from_secs(300));
        assert!(!clock.is_idle_past(Duration::from_secs(300)));

        tokio::time::advance(Duration::from_nanos(1)).await;
        assert!(clock.is_idle_past(Duration::from_secs(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn record_never_goes_backwards() {
        let clock = ActivityClock::new();
        tokio::time::advance(Duration::from_secs(10)).await;
        let later = clock.touch();
        clock.record(later - Duration::from_secs(5));
        assert_eq!(clock.last_activity(), later);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_touches_keep_latest() {
        let clock = Arc::new(ActivityClock::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let clock = Arc::clone(&clock);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    clock.touch();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let final_touch = clock.touch();
        assert!(clock.last_activity() <= final_touch);
        assert_eq!(clock.last_activity(), final_touch);
        assert!(clock.idle_for() < Duration::from_secs(1));
    }
}
