//! Output enforcement: turn raw model text into a schema-valid triage.
//!
//! Nothing here fails. Every structural problem is recorded as a
//! [`SchemaViolation`], a safe default is substituted and the result is
//! flagged for human review.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Priority, Taxonomy};

/// Longest summary kept, in characters
pub const MAX_SUMMARY_CHARS: usize = 500;

fn default_confidence_threshold() -> f64 {
    0.5
}

/// A structural problem in the model output
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    #[error("Response is not a JSON object: {0}")]
    Unparseable(String),

    #[error("Missing or mistyped field '{0}'")]
    MissingField(&'static str),

    #[error("Category '{0}' is not in the taxonomy")]
    UnknownCategory(String),

    #[error("Queue '{0}' is not in the taxonomy")]
    UnknownQueue(String),

    #[error("Priority '{0}' is not Low, Medium or High")]
    UnknownPriority(String),

    #[error("Confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Model output after enforcement
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcedOutput {
    pub summary: String,
    pub category: String,
    pub priority: Priority,
    pub queue: String,
    pub confidence: f64,
    pub needs_human_review: bool,
    /// Everything that had to be substituted or corrected
    pub issues: Vec<SchemaViolation>,
}

impl EnforcedOutput {
    /// True when no fallback was applied
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validates model output against the taxonomy
#[derive(Debug, Clone)]
pub struct OutputEnforcer {
    taxonomy: Taxonomy,
    confidence_threshold: f64,
}

impl OutputEnforcer {
    pub fn new(taxonomy: Taxonomy, confidence_threshold: f64) -> Self {
        Self {
            taxonomy,
            confidence_threshold,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Enforce the output contract on raw model text
    pub fn enforce(&self, raw: &str) -> EnforcedOutput {
        let mut issues = Vec::new();

        let object = match extract_object(raw) {
            Ok(object) => object,
            Err(violation) => {
                issues.push(violation);
                Map::new()
            }
        };
        // One violation is enough when there was nothing to read
        let parsed = issues.is_empty();
        let missing = |field: &'static str, issues: &mut Vec<SchemaViolation>| {
            if parsed {
                issues.push(SchemaViolation::MissingField(field));
            }
        };

        let summary = match object.get("summary").and_then(Value::as_str) {
            Some(text) => truncate_chars(text.trim(), MAX_SUMMARY_CHARS),
            None => {
                missing("summary", &mut issues);
                String::new()
            }
        };

        let category = match object.get("category").and_then(Value::as_str) {
            Some(raw) => match self.taxonomy.match_category(raw) {
                Some(canonical) => canonical.to_string(),
                None => {
                    issues.push(SchemaViolation::UnknownCategory(raw.to_string()));
                    self.taxonomy.default_category.clone()
                }
            },
            None => {
                missing("category", &mut issues);
                self.taxonomy.default_category.clone()
            }
        };

        let priority = match object.get("priority").and_then(Value::as_str) {
            Some(raw) => Priority::parse(raw).unwrap_or_else(|| {
                issues.push(SchemaViolation::UnknownPriority(raw.to_string()));
                Priority::default()
            }),
            None => {
                missing("priority", &mut issues);
                Priority::default()
            }
        };

        let queue = match object.get("queue").and_then(Value::as_str) {
            Some(raw) => match self.taxonomy.match_queue(raw) {
                Some(canonical) => canonical.to_string(),
                None => {
                    issues.push(SchemaViolation::UnknownQueue(raw.to_string()));
                    self.taxonomy.default_queue.clone()
                }
            },
            None => {
                missing("queue", &mut issues);
                self.taxonomy.default_queue.clone()
            }
        };

        let confidence = match object.get("confidence").and_then(Value::as_f64) {
            Some(value) if value.is_finite() && (0.0..=1.0).contains(&value) => value,
            Some(value) if value.is_finite() => {
                issues.push(SchemaViolation::ConfidenceOutOfRange(value));
                value.clamp(0.0, 1.0)
            }
            _ => {
                missing("confidence", &mut issues);
                0.0
            }
        };

        let model_review = match object.get("needs_human_review").and_then(Value::as_bool) {
            Some(flag) => flag,
            None => {
                missing("needs_human_review", &mut issues);
                true
            }
        };

        let needs_human_review =
            model_review || !issues.is_empty() || confidence < self.confidence_threshold;

        EnforcedOutput {
            summary,
            category,
            priority,
            queue,
            confidence,
            needs_human_review,
            issues,
        }
    }
}

impl Default for OutputEnforcer {
    fn default() -> Self {
        Self::new(Taxonomy::default(), default_confidence_threshold())
    }
}

/// Find the JSON object in raw text, tolerating code fences and prose
fn extract_object(raw: &str) -> Result<Map<String, Value>, SchemaViolation> {
    let trimmed = strip_code_fence(raw.trim());

    let candidate = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(first_err) => {
            let start = trimmed.find('{');
            let end = trimmed.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str::<Value>(&trimmed[start..=end])
                        .map_err(|e| SchemaViolation::Unparseable(e.to_string()))?
                }
                _ => return Err(SchemaViolation::Unparseable(first_err.to_string())),
            }
        }
    };

    match candidate {
        Value::Object(map) => Ok(map),
        other => Err(SchemaViolation::Unparseable(format!(
            "expected object, got {}",
            json_kind(&other)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an info string such as `json`
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
