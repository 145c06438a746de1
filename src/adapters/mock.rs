//! Offline model provider.
//!
//! Returns a fixed, valid triage body by default. Tests script it to fail,
//! hang or return arbitrary text, one behavior per call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::lock;

use super::{ModelProvider, ModelRequest, ProviderError, ProviderOutput};

/// Body returned when nothing else is configured
pub const DEFAULT_MOCK_RESPONSE: &str = r#"{"summary": "Customer requests billing help for recent charges.", "category": "Billing", "priority": "Medium", "queue": "Billing Ops", "confidence": 0.92, "needs_human_review": false}"#;

/// What the mock does on a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Return this text
    Respond(String),
    /// Fail with this error
    Fail(ProviderError),
    /// Never complete (exercises the adapter timeout)
    Hang,
}

/// Scriptable offline provider
#[derive(Debug)]
pub struct MockProvider {
    model: String,
    script: Mutex<VecDeque<MockBehavior>>,
    fallback: MockBehavior,
    latency: Duration,
    calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Mock that always returns the default triage body
    pub fn new() -> Self {
        Self::with_fallback(MockBehavior::Respond(DEFAULT_MOCK_RESPONSE.to_string()))
    }

    /// Mock that always behaves as `fallback` once the script is exhausted
    pub fn with_fallback(fallback: MockBehavior) -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock that always returns `body`
    pub fn responding(body: impl Into<String>) -> Self {
        Self::with_fallback(MockBehavior::Respond(body.into()))
    }

    /// Mock that always fails with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self::with_fallback(MockBehavior::Fail(error))
    }

    /// Mock whose calls never complete
    pub fn hanging() -> Self {
        Self::with_fallback(MockBehavior::Hang)
    }

    /// Play these behaviors in order before falling back
    pub fn with_script(self, script: impl IntoIterator<Item = MockBehavior>) -> Self {
        lock(&self.script).extend(script);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Simulated latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of calls that reached the provider
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> MockBehavior {
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ProviderOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.next_behavior();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match behavior {
            MockBehavior::Respond(content) => {
                // Rough count: whitespace-separated words in and out
                let words = request.system.split_whitespace().count()
                    + request.user.split_whitespace().count()
                    + content.split_whitespace().count();
                Ok(ProviderOutput {
                    content,
                    tokens_used: Some(words as u64),
                })
            }
            MockBehavior::Fail(error) => Err(error),
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
