//! Inbound ticket types.

use uuid::Uuid;

/// Caller identity used when none is supplied
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// A ticket as received from a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketInput {
    /// Raw ticket text (untrusted)
    pub text: String,

    /// Identity used for rate limiting
    pub caller: String,

    /// Correlation id supplied by the caller, if any
    pub request_id: Option<String>,
}

impl TicketInput {
    pub fn new(text: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            caller: caller.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The caller's request id, or a fresh short id
    pub fn resolve_request_id(&self) -> String {
        self.request_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_request_id)
    }
}

/// Generate a short correlation id (first 8 chars of a UUIDv4)
pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Input after validation: bounded, scanned, with a redacted copy for logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedInput {
    /// Text sent to the model (possibly truncated, never redacted)
    pub text: String,

    /// Lossy copy safe to hand to logging
    pub redacted: String,

    /// Whether `text` was cut to the configured maximum
    pub truncated: bool,

    /// Whether injection markers were found
    pub injection_suspected: bool,

    /// Length of the original input in characters
    pub original_length: usize,
}
