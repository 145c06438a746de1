//! Circuit breaker guarding the model endpoint.
//!
//! Closed -> Open after `failure_threshold` consecutive failures. Open
//! rejects every call until its cooldown deadline; the first call after the
//! deadline moves to HalfOpen and runs as the single trial. Trial success
//! closes the circuit, trial failure reopens it with a fresh deadline.
//!
//! The Open -> HalfOpen move happens lazily inside [`CircuitBreaker::acquire`];
//! there is no timer task.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::clock::Clock;
use super::lock;

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial (default: 60)
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_seconds() -> u64 {
    60
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Call rejected without reaching the endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Circuit open for '{endpoint}', retry in {retry_in:?}")]
pub struct CircuitOpenError {
    pub endpoint: String,
    /// Time until the cooldown deadline (zero while a trial is in flight)
    pub retry_in: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { until: Instant },
    /// A single trial call is in flight
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    consecutive_failures: u32,
    last_transition: Instant,
}

impl Inner {
    fn transition(&mut self, phase: Phase, now: Instant) {
        self.phase = phase;
        self.last_transition = now;
    }
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Time since the last state change
    pub since_transition: Duration,
    /// Remaining cooldown when open
    pub open_for: Option<Duration>,
}

/// Health gate for one endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(
        endpoint: impl Into<String>,
        settings: &CircuitBreakerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            endpoint: endpoint.into(),
            failure_threshold: settings.failure_threshold.max(1),
            cooldown: Duration::from_secs(settings.cooldown_seconds),
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                consecutive_failures: 0,
                last_transition: now,
            }),
            clock,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask to make one call. The returned permit must report its outcome;
    /// dropping it unreported counts as a failure.
    pub fn acquire(self: &Arc<Self>) -> Result<CallPermit, CircuitOpenError> {
        let now = self.clock.now();
        let mut inner = lock(&self.inner);
        let phase = inner.phase;

        match phase {
            Phase::Closed => Ok(CallPermit::new(self.clone(), false)),
            Phase::Open { until } if now < until => Err(CircuitOpenError {
                endpoint: self.endpoint.clone(),
                retry_in: until - now,
            }),
            Phase::Open { .. } => {
                inner.transition(Phase::HalfOpen, now);
                info!(endpoint = %self.endpoint, "Circuit half-open, running trial call");
                Ok(CallPermit::new(self.clone(), true))
            }
            Phase::HalfOpen => Err(CircuitOpenError {
                endpoint: self.endpoint.clone(),
                retry_in: Duration::ZERO,
            }),
        }
    }

    fn record(&self, success: bool, trial: bool) {
        let now = self.clock.now();
        let mut inner = lock(&self.inner);
        let phase = inner.phase;

        match phase {
            Phase::Closed if success => inner.consecutive_failures = 0,
            Phase::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.transition(
                        Phase::Open {
                            until: now + self.cooldown,
                        },
                        now,
                    );
                    warn!(
                        endpoint = %self.endpoint,
                        failures = inner.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit opened"
                    );
                }
            }
            // Outcomes of calls admitted before the circuit opened
            Phase::HalfOpen | Phase::Open { .. } if !trial => {}
            Phase::HalfOpen if success => {
                inner.consecutive_failures = 0;
                inner.transition(Phase::Closed, now);
                info!(endpoint = %self.endpoint, "Trial call succeeded, circuit closed");
            }
            Phase::HalfOpen => {
                inner.consecutive_failures += 1;
                inner.transition(
                    Phase::Open {
                        until: now + self.cooldown,
                    },
                    now,
                );
                warn!(endpoint = %self.endpoint, "Trial call failed, circuit reopened");
            }
            Phase::Open { .. } => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        match lock(&self.inner).phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.inner).consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let inner = lock(&self.inner);
        let (state, open_for) = match inner.phase {
            Phase::Closed => (CircuitState::Closed, None),
            Phase::Open { until } => (
                CircuitState::Open,
                Some(until.saturating_duration_since(now)),
            ),
            Phase::HalfOpen => (CircuitState::HalfOpen, None),
        };

        BreakerSnapshot {
            state,
            consecutive_failures: inner.consecutive_failures,
            since_transition: now.saturating_duration_since(inner.last_transition),
            open_for,
        }
    }
}

/// Admission to make one call through the breaker
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    reported: bool,
}

impl CallPermit {
    fn new(breaker: Arc<CircuitBreaker>, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            reported: false,
        }
    }

    /// Whether this is the half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.report(true);
    }

    pub fn fail(mut self) {
        self.report(false);
    }

    fn report(&mut self, success: bool) {
        if !self.reported {
            self.reported = true;
            self.breaker.record(success, self.trial);
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.report(false);
    }
}
