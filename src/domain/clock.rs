//! Monotonic time source and elapsed-time helpers

use std::time::{Duration, Instant};

/// Supplies the monotonic "now" for each tick
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Process monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time elapsed from `since` to `now`, zero if the clock went backwards
#[inline]
pub fn elapsed(now: Instant, since: Instant) -> Duration {
    now.saturating_duration_since(since)
}

/// Wall-clock epoch milliseconds for outbound payloads
#[inline]
pub fn epoch_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_forward() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(250);
        assert_eq!(elapsed(t1, t0), Duration::from_millis(250));
    }

    #[test]
    fn test_elapsed_backwards_clamps_to_zero() {
        let t0 = Instant::now() + Duration::from_secs(5);
        let earlier = t0 - Duration::from_secs(3);
        assert_eq!(elapsed(earlier, t0), Duration::ZERO);
    }

    #[test]
    fn test_epoch_ms_nonzero() {
        assert!(epoch_ms() > 1_600_000_000_000);
    }
}
