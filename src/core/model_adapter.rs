//! Model adapter: breaker admission, per-attempt timeout, retry with backoff.
//!
//! Every attempt runs on its own spawned task holding a breaker permit. If
//! the caller is cancelled mid-call the task still finishes (or times out)
//! and reports to the breaker, so health accounting never depends on the
//! caller staying around.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::{ModelProvider, ModelRequest, ModelSettings, ProviderError, ProviderOutput};

use super::circuit_breaker::{CircuitBreaker, CircuitOpenError, CircuitState};
use super::clock::Clock;
use super::prompt::PromptSpec;
use super::retry::RetryPolicy;

/// Successful model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    /// Raw model text
    pub content: String,

    /// Provider-reported token usage, if any
    pub tokens_used: Option<u64>,

    /// Model identifier that answered
    pub model: String,

    /// Wall time across all attempts and backoff sleeps
    pub latency: Duration,

    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Adapter failure, converted to a degraded result by the pipeline
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("{source} (after {attempts} attempt(s))")]
    Provider {
        source: ProviderError,
        attempts: u32,
    },
}

impl AdapterError {
    /// Short label for logs and degraded summaries
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CircuitOpen(_) => "circuit open",
            Self::Provider { source, .. } => match source {
                ProviderError::Timeout(_) => "model timeout",
                ProviderError::Server { .. } => "model server error",
                ProviderError::RateLimited { .. } => "model rate limited",
                ProviderError::Auth { .. } => "model authentication failed",
                ProviderError::Rejected { .. } => "model rejected request",
                ProviderError::Transport(_) => "model unreachable",
                ProviderError::InvalidResponse(_) => "invalid model response",
            },
        }
    }
}

/// Resilient wrapper around a [`ModelProvider`]
pub struct ModelAdapter {
    provider: Arc<dyn ModelProvider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
    max_output_tokens: u32,
    clock: Arc<dyn Clock>,
}

impl ModelAdapter {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        breaker: Arc<CircuitBreaker>,
        settings: &ModelSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            breaker,
            retry: settings.retry.clone(),
            timeout: settings.timeout(),
            max_output_tokens: settings.max_output_tokens,
            clock,
        }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Invoke the model for one prompt
    pub async fn invoke(
        &self,
        prompt: &PromptSpec,
        request_id: &str,
    ) -> Result<ModelResponse, AdapterError> {
        let request = Arc::new(ModelRequest::from_prompt(
            prompt,
            request_id,
            self.max_output_tokens,
        ));
        let started = self.clock.now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.attempt(request.clone()).await? {
                Ok(output) => {
                    let latency = self.clock.now().saturating_duration_since(started);
                    debug!(
                        request_id,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        "Model call succeeded"
                    );
                    return Ok(ModelResponse {
                        content: output.content,
                        tokens_used: output.tokens_used,
                        model: self.provider.model().to_string(),
                        latency,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            // A failure that opened the circuit (or a failed trial) ends the
            // loop here, so the caller sees the real cause
            let circuit_closed = self.breaker.state() == CircuitState::Closed;
            if !error.is_retryable() || !circuit_closed || !self.retry.should_retry(attempt) {
                warn!(request_id, attempt, error = %error, "Model call failed, giving up");
                return Err(AdapterError::Provider {
                    source: error,
                    attempts: attempt,
                });
            }

            let computed = {
                let mut rng = rand::thread_rng();
                self.retry.jittered_delay(attempt, &mut rng)
            };
            let delay = self.retry.delay_with_hint(computed, error.retry_after());
            warn!(
                request_id,
                attempt,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Model call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One breaker-admitted, timeout-bounded call
    async fn attempt(
        &self,
        request: Arc<ModelRequest>,
    ) -> Result<Result<ProviderOutput, ProviderError>, CircuitOpenError> {
        let permit = self.breaker.acquire()?;
        let provider = self.provider.clone();
        let timeout = self.timeout;

        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, provider.invoke(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            };
            match outcome {
                Ok(_) => permit.succeed(),
                Err(_) => permit.fail(),
            }
            outcome
        });

        // A panicking provider drops its permit, which already counts as a failure
        Ok(task
            .await
            .unwrap_or_else(|e| Err(ProviderError::Transport(format!("model task failed: {}", e)))))
    }
}
