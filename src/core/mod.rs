//! Core triage pipeline.
//!
//! This module contains:
//! - Safety / Redact: input validation, injection scan, log redaction
//! - Prompt: versioned prompt construction
//! - Cache: fingerprinted result cache
//! - RateLimit / CircuitBreaker / Retry: admission and endpoint health
//! - ModelAdapter: resilient model invocation
//! - Enforcer: output schema enforcement
//! - Cost: token accounting and budget signals
//! - Orchestrator: the request lifecycle

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod cost;
pub mod enforcer;
pub mod model_adapter;
pub mod orchestrator;
pub mod prompt;
pub mod rate_limit;
pub mod redact;
pub mod retry;
pub mod safety;

// Re-export commonly used types
pub use cache::{CacheError, CacheSettings, Fingerprint, InMemoryCache, NoopCache, ResultCache};
pub use circuit_breaker::{
    BreakerSnapshot, CallPermit, CircuitBreaker, CircuitBreakerSettings, CircuitOpenError,
    CircuitState,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use cost::{estimate_tokens, BudgetPolicy, BudgetSettings, BudgetThreshold, CostSnapshot, CostTracker};
pub use enforcer::{EnforcedOutput, OutputEnforcer, SchemaViolation};
pub use model_adapter::{AdapterError, ModelAdapter, ModelResponse};
pub use orchestrator::{HealthReport, HealthStatus, PipelineBuilder, TriageError, TriagePipeline};
pub use prompt::{build_prompt, PromptSpec, PROMPT_VERSION};
pub use rate_limit::{RateLimitExceeded, RateLimitSettings, RateLimiter};
pub use redact::redact;
pub use retry::RetryPolicy;
pub use safety::{InputLimits, InputValidator, ValidationError};

/// Lock a mutex, recovering the data if a holder panicked.
///
/// Every critical section here leaves its state consistent, so a poisoned
/// lock carries no torn invariant.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
