//! OpenAI-compatible chat-completions provider.
//!
//! Endpoint: POST {endpoint} (full URL, e.g. .../v1/chat/completions)
//! Auth: Bearer token, or `api-key` header for Azure deployments

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthStyle, ModelProvider, ModelRequest, ModelSettings, ProviderError, ProviderOutput};

/// Connection setup bound; the overall call is bounded by the adapter timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in a `ProviderError`
const ERROR_BODY_LIMIT: usize = 200;

/// Live HTTP provider
pub struct HttpProvider {
    endpoint: String,
    api_key: String,
    model: String,
    auth_style: AuthStyle,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

impl HttpProvider {
    /// Create a new provider
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        settings: &ModelSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: settings.model.clone(),
            auth_style: settings.auth_style,
            temperature: settings.temperature,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer => builder.bearer_auth(&self.api_key),
            AuthStyle::Azure => builder.header("api-key", &self.api_key),
        }
    }
}

/// Map a non-success HTTP status to a provider error
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    let code = status.as_u16();
    let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();

    match code {
        401 | 403 => ProviderError::Auth { status: code },
        429 => ProviderError::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        500..=599 => ProviderError::Server {
            status: code,
            message,
        },
        _ => ProviderError::Rejected {
            status: code,
            message,
        },
    }
}

/// Retry-After in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

#[async_trait]
impl ModelProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ProviderOutput, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_output_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            user: Some(&request.request_id),
        };

        let response = self
            .authorize(self.client.post(&self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(request_id = %request.request_id, status = status.as_u16(), "Provider responded");

        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no message content".to_string()))?;

        Ok(ProviderOutput {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .authorize(self.client.get(&self.endpoint))
            .send()
            .await
            .map_err(transport_error)?;

        // Any answer short of an auth or server failure means the endpoint is up
        let status = response.status();
        match status.as_u16() {
            401 | 403 | 500..=599 => {
                let headers = response.headers().clone();
                let text = response.text().await.unwrap_or_default();
                Err(classify_status(status, &headers, &text))
            }
            _ => Ok(()),
        }
    }
}
