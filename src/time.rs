//! Time sources for execution statistics.
//!
//! Scheduling never depends on wall time: timeouts are counted in ticks. The clock only feeds the
//! per-machine execution statistics.

use core::sync::atomic::{AtomicU64, Ordering};

/// A free-running counter, read by the step engine around each handler.
pub trait Clock: Sync {
    /// Returns the current counter value. Units are board-specific.
    fn now(&self) -> u64;
}

/// A clock that never advances, for boards without a usable counter.
pub struct NullClock;

impl Clock for NullClock {
    fn now(&self) -> u64 {
        0
    }
}

/// A software counter advanced by whoever owns it.
///
/// Used by the host simulation and by tests that need execution times to move.
pub struct SoftClock(AtomicU64);

impl SoftClock {
    pub const fn new() -> Self {
        SoftClock(AtomicU64::new(0))
    }

    /// Advances the clock by `delta` units.
    pub fn advance(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Clock for SoftClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
