//! Triage pipeline: the request lifecycle.
//!
//! validate -> admit -> cache lookup -> build prompt -> invoke model ->
//! enforce output -> record cost -> store in cache.
//!
//! Only validation and rate-limit failures reach the caller as errors.
//! Anything that goes wrong once the request is admitted produces a
//! degraded, review-flagged result instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{build_provider, ModelProvider, ProviderError};
use crate::config::TriageConfig;
use crate::domain::{Taxonomy, TicketInput, TriageMetadata, TriageResult};

use super::cache::{Fingerprint, InMemoryCache, NoopCache, ResultCache};
use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
use super::clock::{Clock, TokioClock};
use super::cost::{estimate_tokens, BudgetPolicy, BudgetThreshold, CostTracker};
use super::enforcer::OutputEnforcer;
use super::model_adapter::{AdapterError, ModelAdapter};
use super::prompt::build_prompt;
use super::rate_limit::{RateLimitExceeded, RateLimiter};
use super::safety::{InputValidator, ValidationError};

/// Characters of redacted ticket text included in logs
const LOG_PREVIEW_CHARS: usize = 120;

/// Failures reported to the caller before any model cost is incurred
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TriageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
}

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// The circuit breaker is not closed
    Degraded,
}

/// Health/readiness report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub provider: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub breaker: BreakerSnapshot,
    /// Fraction of the token budget used this period
    pub budget_fraction: f64,
}

/// Builder for [`TriagePipeline`]
pub struct PipelineBuilder {
    config: TriageConfig,
    provider: Option<Arc<dyn ModelProvider>>,
    clock: Option<Arc<dyn Clock>>,
    cache: Option<Arc<dyn ResultCache>>,
}

impl PipelineBuilder {
    pub fn new(config: TriageConfig) -> Self {
        Self {
            config,
            provider: None,
            clock: None,
            cache: None,
        }
    }

    /// Use this provider instead of the one selected by configuration
    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this cache backend instead of the in-memory one
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<TriagePipeline> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));

        let provider = match self.provider {
            Some(provider) => provider,
            None => build_provider(&config.model)?,
        };

        let cache: Arc<dyn ResultCache> = match self.cache {
            Some(cache) => cache,
            None if config.cache.enabled => Arc::new(InMemoryCache::new(
                config.cache.max_entries,
                clock.clone(),
            )),
            None => Arc::new(NoopCache),
        };

        let validator = InputValidator::new(config.input.clone())
            .context("Invalid input.extra_injection_patterns")?;

        let endpoint = config
            .model
            .endpoint
            .clone()
            .unwrap_or_else(|| provider.name().to_string());
        let breaker = Arc::new(CircuitBreaker::new(
            endpoint,
            &config.circuit_breaker,
            clock.clone(),
        ));
        let adapter = ModelAdapter::new(provider, breaker, &config.model, clock.clone());

        let started = clock.now();
        Ok(TriagePipeline {
            validator,
            limiter: RateLimiter::new(&config.rate_limit, clock.clone()),
            cache,
            cache_enabled: config.cache.enabled,
            cache_ttl: config.cache.ttl(),
            adapter,
            enforcer: OutputEnforcer::new(config.taxonomy.clone(), config.confidence_threshold),
            costs: CostTracker::new(config.budget.clone(), clock.clone()),
            budget_policy: config.budget.policy,
            prompt_version: config.prompt_version.clone(),
            clock,
            started,
            started_at: Utc::now(),
        })
    }
}

/// The only component exposed to callers. Share it behind an `Arc`.
pub struct TriagePipeline {
    validator: InputValidator,
    limiter: RateLimiter,
    cache: Arc<dyn ResultCache>,
    cache_enabled: bool,
    cache_ttl: Duration,
    adapter: ModelAdapter,
    enforcer: OutputEnforcer,
    costs: CostTracker,
    budget_policy: BudgetPolicy,
    prompt_version: String,
    clock: Arc<dyn Clock>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl TriagePipeline {
    /// Pipeline with the provider, cache and clock chosen by configuration
    pub fn from_config(config: TriageConfig) -> Result<Self> {
        PipelineBuilder::new(config).build()
    }

    pub fn builder(config: TriageConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        self.enforcer.taxonomy()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.adapter.breaker()
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Triage one ticket
    #[instrument(skip_all, fields(request_id = tracing::field::Empty, caller = %input.caller))]
    pub async fn triage(&self, input: TicketInput) -> Result<TriageResult, TriageError> {
        let request_id = input.resolve_request_id();
        tracing::Span::current().record("request_id", request_id.as_str());

        let sanitized = self.validator.sanitize(&input.text).map_err(|e| {
            warn!(error = %e, "Ticket rejected");
            e
        })?;
        info!(
            input_length = sanitized.original_length,
            truncated = sanitized.truncated,
            injection_suspected = sanitized.injection_suspected,
            preview = %preview(&sanitized.redacted),
            "Ticket received"
        );

        self.limiter.admit(&input.caller).map_err(|e| {
            warn!(retry_after_ms = e.retry_after.as_millis() as u64, "Rate limit exceeded");
            e
        })?;

        let fingerprint = Fingerprint::compute(
            &sanitized.text,
            &self.prompt_version,
            &self.taxonomy().version,
        );
        if let Some(hit) = self.cache.lookup(&fingerprint) {
            info!(fingerprint = %fingerprint, "Cache hit");
            // The fingerprint ignores layout and anything past truncation,
            // so the stored entry may come from a ticket that scanned clean
            let mut result = hit.for_request(request_id);
            result.needs_human_review |= sanitized.injection_suspected;
            return Ok(result);
        }

        if self.budget_policy == BudgetPolicy::Degrade && self.costs.is_exhausted() {
            warn!("Token budget exhausted, skipping model call");
            return Ok(self.degraded(&request_id, "budget exhausted", sanitized.original_length, 0));
        }

        let prompt = build_prompt(&sanitized, &self.prompt_version, self.taxonomy());
        let call_started = self.clock.now();

        let response = match self.adapter.invoke(&prompt, &request_id).await {
            Ok(response) => response,
            Err(err) => {
                let latency = self.clock.now().saturating_duration_since(call_started);
                log_adapter_failure(&err);
                return Ok(self.degraded(
                    &request_id,
                    err.reason(),
                    sanitized.original_length,
                    latency.as_millis() as u64,
                ));
            }
        };

        let enforced = self.enforcer.enforce(&response.content);
        if !enforced.is_clean() {
            let issues: Vec<String> = enforced.issues.iter().map(ToString::to_string).collect();
            warn!(?issues, "Model output needed fallbacks");
        }

        let tokens = estimate_tokens(prompt.char_len(), response.content.chars().count());
        match self.costs.record(tokens) {
            Some(BudgetThreshold::Warning) => {
                warn!(fraction = self.costs.fraction_consumed(), "Token budget 80% consumed")
            }
            Some(BudgetThreshold::Exhausted) => {
                error!(fraction = self.costs.fraction_consumed(), "Token budget exhausted")
            }
            None => {}
        }

        let result = TriageResult {
            request_id,
            summary: enforced.summary,
            category: enforced.category,
            priority: enforced.priority,
            queue: enforced.queue,
            confidence: enforced.confidence,
            needs_human_review: enforced.needs_human_review || sanitized.injection_suspected,
            metadata: TriageMetadata {
                input_length: sanitized.original_length,
                latency_ms: response.latency.as_millis() as u64,
                tokens_estimate: tokens,
                success: true,
            },
        };

        // Fallback results are not pinned for the whole TTL
        if self.cache_enabled && enforced.issues.is_empty() {
            if let Err(e) = self
                .cache
                .store(fingerprint, result.clone(), self.cache_ttl)
            {
                warn!(error = %e, "Cache store failed");
            }
        }

        info!(
            category = %result.category,
            priority = %result.priority,
            queue = %result.queue,
            confidence = result.confidence,
            needs_review = result.needs_human_review,
            latency_ms = result.metadata.latency_ms,
            tokens = tokens,
            provider_tokens = ?response.tokens_used,
            attempts = response.attempts,
            "Triage complete"
        );
        Ok(result)
    }

    /// Service status, model and uptime
    pub fn health(&self) -> HealthReport {
        let breaker = self.breaker().snapshot();
        HealthReport {
            status: match breaker.state {
                CircuitState::Closed => HealthStatus::Ok,
                _ => HealthStatus::Degraded,
            },
            provider: self.adapter.provider().name().to_string(),
            model: self.adapter.model().to_string(),
            started_at: self.started_at,
            uptime_secs: self
                .clock
                .now()
                .saturating_duration_since(self.started)
                .as_secs(),
            breaker,
            budget_fraction: self.costs.fraction_consumed(),
        }
    }

    /// Reachability check against the model endpoint (bypasses the breaker)
    pub async fn probe_provider(&self) -> Result<(), ProviderError> {
        self.adapter.provider().health_check().await
    }

    fn degraded(
        &self,
        request_id: &str,
        reason: &str,
        input_length: usize,
        latency_ms: u64,
    ) -> TriageResult {
        TriageResult::degraded(
            request_id,
            self.taxonomy(),
            format!("Automated triage unavailable: {}", reason),
            input_length,
            latency_ms,
        )
    }
}

fn log_adapter_failure(err: &AdapterError) {
    match err {
        AdapterError::CircuitOpen(open) => {
            debug!(retry_in_ms = open.retry_in.as_millis() as u64, "Circuit open, degrading")
        }
        AdapterError::Provider { .. } => error!(error = %err, "Model unavailable, degrading"),
    }
}

fn preview(redacted: &str) -> String {
    let mut text: String = redacted.chars().take(LOG_PREVIEW_CHARS).collect();
    if redacted.chars().count() > LOG_PREVIEW_CHARS {
        text.push_str("...");
    }
    text
}
