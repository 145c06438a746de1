//! Per-caller sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clock::Clock;
use super::lock;

/// Idle callers are first pruned once this many are tracked. After each
/// prune the mark moves to twice the surviving count, so a crowd of active
/// callers costs one scan per doubling rather than one per admission.
const PRUNE_THRESHOLD: usize = 1024;

/// Rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Admissions per caller per window (default: 60)
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Window length in seconds (default: 60)
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_per_minute() -> u32 {
    60
}
fn default_window_seconds() -> u64 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Caller exceeded its admission budget
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Rate limit exceeded for caller '{caller}': {limit} requests per {window:?}, retry in {retry_after:?}")]
pub struct RateLimitExceeded {
    pub caller: String,
    pub limit: u32,
    pub window: Duration,
    pub retry_after: Duration,
}

/// Sliding-window limiter keyed by caller identity
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<Windows>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct Windows {
    callers: HashMap<String, VecDeque<Instant>>,
    prune_at: usize,
}

impl Windows {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.callers.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < window)
        });
        self.prune_at = (self.callers.len() * 2).max(PRUNE_THRESHOLD);
    }
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit: settings.per_minute,
            window: Duration::from_secs(settings.window_seconds),
            windows: Mutex::new(Windows {
                callers: HashMap::new(),
                prune_at: PRUNE_THRESHOLD,
            }),
            clock,
        }
    }

    /// Admit one request for `caller`, or reject it
    pub fn admit(&self, caller: &str) -> Result<(), RateLimitExceeded> {
        let now = self.clock.now();
        let window = self.window;
        let mut windows = lock(&self.windows);

        if windows.callers.len() > windows.prune_at {
            windows.prune(now, window);
        }

        let stamps = windows.callers.entry(caller.to_string()).or_default();
        while stamps
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= window)
        {
            stamps.pop_front();
        }

        if stamps.len() >= self.limit as usize {
            let retry_after = stamps
                .front()
                .map(|first| window.saturating_sub(now.saturating_duration_since(*first)))
                .unwrap_or(window);
            return Err(RateLimitExceeded {
                caller: caller.to_string(),
                limit: self.limit,
                window,
                retry_after,
            });
        }

        stamps.push_back(now);
        Ok(())
    }

    /// Admissions left for `caller` in the current window
    pub fn remaining(&self, caller: &str) -> u32 {
        let now = self.clock.now();
        let windows = lock(&self.windows);
        let used = windows
            .callers
            .get(caller)
            .map(|stamps| {
                stamps
                    .iter()
                    .filter(|t| now.saturating_duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0);
        self.limit.saturating_sub(used as u32)
    }

    /// Number of callers currently tracked
    pub fn tracked_callers(&self) -> usize {
        lock(&self.windows).callers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn limiter(limit: u32, clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(
            &RateLimitSettings {
                per_minute: limit,
                window_seconds: 60,
            },
            clock,
        )
    }

    #[test]
    fn test_default_settings() {
        let settings = RateLimitSettings::default();
        assert_eq!(settings.per_minute, 60);
        assert_eq!(settings.window_seconds, 60);
    }

    #[test]
    fn test_n_plus_one_rejected() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(3, clock);

        for _ in 0..3 {
            assert!(limiter.admit("alice").is_ok());
        }
        let err = limiter.admit("alice").unwrap_err();
        assert_eq!(err.caller, "alice");
        assert_eq!(err.limit, 3);
        assert_eq!(err.retry_after, Duration::from_secs(60));
    }

    #[test]
    fn test_callers_are_independent() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(1, clock);

        assert!(limiter.admit("alice").is_ok());
        assert!(limiter.admit("alice").is_err());
        assert!(limiter.admit("bob").is_ok());
        assert_eq!(limiter.remaining("carol"), 1);
    }

    #[test]
    fn test_window_slides() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(2, clock.clone());

        assert!(limiter.admit("alice").is_ok());
        clock.advance(Duration::from_secs(30));
        assert!(limiter.admit("alice").is_ok());
        assert!(limiter.admit("alice").is_err());

        // First admission leaves the window
        clock.advance(Duration::from_secs(30));
        assert!(limiter.admit("alice").is_ok());
        let err = limiter.admit("alice").unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(30));
    }

    #[test]
    fn test_rejections_do_not_consume_slots() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(1, clock.clone());

        assert!(limiter.admit("alice").is_ok());
        for _ in 0..10 {
            assert!(limiter.admit("alice").is_err());
        }
        clock.advance(Duration::from_secs(60));
        assert!(limiter.admit("alice").is_ok());
    }

    #[test]
    fn test_idle_callers_pruned() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(5, clock.clone());

        for i in 0..=PRUNE_THRESHOLD {
            limiter.admit(&format!("caller-{}", i)).unwrap();
        }
        clock.advance(Duration::from_secs(61));
        limiter.admit("fresh").unwrap();
        assert_eq!(limiter.tracked_callers(), 1);
    }

    #[test]
    fn test_active_crowd_does_not_prune_every_admission() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(5, clock.clone());

        for i in 0..1100 {
            limiter.admit(&format!("caller-{}", i)).unwrap();
        }
        // One prune at 1025 callers kept everyone and doubled the mark
        assert_eq!(lock(&limiter.windows).prune_at, 2 * (PRUNE_THRESHOLD + 1));
        assert_eq!(limiter.tracked_callers(), 1100);

        for i in 1100..2000 {
            limiter.admit(&format!("caller-{}", i)).unwrap();
        }
        assert_eq!(lock(&limiter.windows).prune_at, 2 * (PRUNE_THRESHOLD + 1));

        // Growing past the mark once the crowd has gone idle shrinks the map
        clock.advance(Duration::from_secs(61));
        for i in 0..52 {
            limiter.admit(&format!("late-{}", i)).unwrap();
        }
        assert_eq!(limiter.tracked_callers(), 52);
        assert_eq!(lock(&limiter.windows).prune_at, PRUNE_THRESHOLD);
    }
}
