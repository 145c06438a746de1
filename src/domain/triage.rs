//! The triage record returned to callers.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::taxonomy::Taxonomy;

/// Ticket priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Parse a priority label (trimmed, case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured triage output. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    /// Correlation id for this request
    pub request_id: String,

    /// Short summary of the ticket (may be empty on degraded results)
    pub summary: String,

    /// Category, always a member of the configured taxonomy
    pub category: String,

    pub priority: Priority,

    /// Routing queue, always a member of the configured taxonomy
    pub queue: String,

    /// Model confidence in [0, 1]
    pub confidence: f64,

    /// Whether a human must look at this ticket before acting
    pub needs_human_review: bool,

    pub metadata: TriageMetadata,
}

/// Request accounting attached to every result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageMetadata {
    /// Length of the original input in characters
    pub input_length: usize,

    /// Time spent in the model adapter, in milliseconds
    pub latency_ms: u64,

    /// Heuristic token estimate for the model call
    pub tokens_estimate: u64,

    /// False when the model could not be used and defaults were returned
    pub success: bool,
}

impl TriageResult {
    /// Build a degraded result: taxonomy defaults, zero confidence,
    /// flagged for review, `success = false`.
    pub fn degraded(
        request_id: impl Into<String>,
        taxonomy: &Taxonomy,
        summary: impl Into<String>,
        input_length: usize,
        latency_ms: u64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            summary: summary.into(),
            category: taxonomy.default_category.clone(),
            priority: Priority::default(),
            queue: taxonomy.default_queue.clone(),
            confidence: 0.0,
            needs_human_review: true,
            metadata: TriageMetadata {
                input_length,
                latency_ms,
                tokens_estimate: 0,
                success: false,
            },
        }
    }

    /// Copy of this result under another request id (used for cache hits)
    pub fn for_request(&self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..self.clone()
        }
    }

    /// Check the taxonomy invariant
    pub fn conforms_to(&self, taxonomy: &Taxonomy) -> bool {
        taxonomy.contains_category(&self.category)
            && taxonomy.contains_queue(&self.queue)
            && (0.0..=1.0).contains(&self.confidence)
    }
}
