//! Injectable time source.
//!
//! The breaker cooldown, rate-limit windows, cache TTL and cost periods all
//! read time through [`Clock`] so tests can move time deterministically.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::lock;

/// Monotonic time source
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's time driver.
///
/// Outside a runtime this is the system monotonic clock. Inside a runtime
/// with paused time (`#[tokio::test(start_paused = true)]`) it follows the
/// paused clock, so timeouts, backoff sleeps and cooldowns advance together.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Hand-driven clock for unit tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *lock(&self.offset)
    }
}
