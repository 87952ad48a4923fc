// SPDX-License-Identifier: Apache-2.0
//! A minimal clock port, so that code measuring elapsed time (the follower's
//! poll sleep, the scheduler's penalty time-frame) can be driven by a fake
//! clock in tests instead of sleeping for real.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of monotonic-enough wall-clock milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;
}

/// The real system clock, backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// A deterministic clock for tests: starts at zero and only advances when
/// [`FakeClock::advance`] is called.
#[derive(Debug, Default)]
pub struct FakeClock {
    millis: AtomicU64,
}

impl FakeClock {
    /// Creates a fake clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `delta_ms` milliseconds.
    pub fn advance(&self, delta_ms: u64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_only_advances_on_request() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(150);
        assert_eq!(clock.now_ms(), 150);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 200);
    }

    #[test]
    fn system_clock_is_nonzero() {
        let clock = SystemClock;
        assert!(clock.now_ms() > 0);
    }
}
