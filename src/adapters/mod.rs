//! Model provider interfaces.
//!
//! Providers give a single contract for talking to a text-generation
//! endpoint. The live HTTP provider and the offline mock are
//! interchangeable; which one runs is decided by configuration in
//! [`build_provider`], never by branching inside the pipeline.

pub mod http;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::prompt::PromptSpec;
use crate::core::retry::RetryPolicy;

// Re-export the providers
pub use http::HttpProvider;
pub use mock::{MockBehavior, MockProvider};

/// Request sent to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRequest {
    /// Correlation id, forwarded for provider-side tracing
    pub request_id: String,

    /// System instructions
    pub system: String,

    /// User message carrying the ticket
    pub user: String,

    /// Upper bound on generated tokens
    pub max_output_tokens: u32,
}

impl ModelRequest {
    pub fn from_prompt(prompt: &PromptSpec, request_id: &str, max_output_tokens: u32) -> Self {
        Self {
            request_id: request_id.to_string(),
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            max_output_tokens,
        }
    }
}

/// Output from a provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOutput {
    /// Raw text returned by the model
    pub content: String,

    /// Tokens used (if the provider reports them)
    pub tokens_used: Option<u64>,
}

impl ProviderOutput {
    /// Create a new output with just content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
        }
    }
}

/// Failures reported by a provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider rejected credentials ({status})")]
    Auth { status: u16 },

    #[error("Provider rejected the request {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Timeouts, 5xx, 429 and transport failures are worth another attempt.
    /// Auth failures and other rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Server { .. } | Self::RateLimited { .. } | Self::Transport(_)
        )
    }

    /// Server-provided wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Trait for model endpoints
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (used for breaker and logs)
    fn name(&self) -> &str;

    /// Model identifier reported by health checks
    fn model(&self) -> &str;

    /// Run one completion. No retries, no timeout: the adapter owns those.
    async fn invoke(&self, request: &ModelRequest) -> Result<ProviderOutput, ProviderError>;

    /// Cheap reachability check
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Which provider implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Deterministic offline provider
    Mock,
    /// OpenAI-compatible chat-completions endpoint
    Live,
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::Mock
    }
}

/// How the API key is sent to the live endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure OpenAI)
    Azure,
}

impl Default for AuthStyle {
    fn default() -> Self {
        Self::Bearer
    }
}

/// Model endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model identifier (default: gpt-4o-mini)
    #[serde(default = "default_model")]
    pub model: String,

    /// Full chat-completions URL (required for the live provider)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub auth_style: AuthStyle,

    /// Per-attempt timeout in seconds (default: 30)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Upper bound on generated tokens (default: 500)
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature (default: 0.0)
    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "TICKETAI_API_KEY".to_string()
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_max_output_tokens() -> u32 {
    500
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            auth_style: AuthStyle::default(),
            timeout_seconds: default_timeout_seconds(),
            max_output_tokens: default_max_output_tokens(),
            temperature: 0.0,
            retry: RetryPolicy::default(),
        }
    }
}

impl ModelSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Construct the provider selected by configuration
pub fn build_provider(settings: &ModelSettings) -> Result<Arc<dyn ModelProvider>> {
    match settings.provider {
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new().with_model(&settings.model))),
        ProviderKind::Live => {
            let endpoint = settings
                .endpoint
                .clone()
                .context("model.endpoint is required for the live provider")?;
            let api_key = std::env::var(&settings.api_key_env).with_context(|| {
                format!(
                    "{} environment variable required for the live provider",
                    settings.api_key_env
                )
            })?;

            let provider = HttpProvider::new(endpoint, api_key, settings)
                .context("Failed to build HTTP model provider")?;
            Ok(Arc::new(provider))
        }
    }
}
