//! Time sources for snapshot stamping and rewind targets
//!
//! All timestamps in this crate are `Duration`s measured from the clock's own
//! epoch. Production code uses a monotonic [`SystemClock`]; tests inject a
//! [`ManualClock`] so every scenario sees deterministic timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of "now" for a lag compensator
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock's epoch
    fn now(&self) -> Duration;
}

/// Monotonic wall clock anchored at construction time
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Manually driven clock with microsecond resolution
///
/// Shared between the compensator and the test through an `Arc`.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            now_us: AtomicU64::new(start.as_micros() as u64),
        }
    }

    pub fn set(&self, now: Duration) {
        self.now_us.store(now.as_micros() as u64, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.now_us
            .fetch_add(by.as_micros() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::Acquire))
    }
}

/// Latency implied by a client's input timestamp
///
/// Typically `server_now - client_reported_input_time`. A client clock
/// reading from the future yields zero latency (no compensation).
pub fn claimed_latency(server_now: Duration, client_input_time: Duration) -> Duration {
    server_now.saturating_sub(client_input_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(10));

        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.now(), Duration::from_millis(60));

        clock.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_claimed_latency() {
        assert_eq!(
            claimed_latency(Duration::from_millis(1000), Duration::from_millis(800)),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_claimed_latency_future_client_is_zero() {
        assert_eq!(
            claimed_latency(Duration::from_millis(1000), Duration::from_millis(1200)),
            Duration::ZERO
        );
    }
}
