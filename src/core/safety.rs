//! Input limits and sanitization.
//!
//! Every ticket passes through here before anything costs money:
//! - Empty input is rejected
//! - Long input is truncated to a deterministic prefix
//! - Grossly oversized input is rejected outright
//! - Prompt-injection markers are flagged (never blocked)
//! - A redacted copy is produced for logging

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SanitizedInput;

use super::redact::redact;

lazy_static! {
    static ref INJECTION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(ignore|disregard|forget|override)\b.{0,40}\b(previous|prior|above|earlier|all|system)\b.{0,20}\b(instructions?|prompts?|rules|directions)\b").unwrap(),
        Regex::new(r"(?i)\b(reveal|show|print|repeat|output|leak)\b.{0,40}\b(system|hidden|initial)\s+(prompt|instructions?|message)").unwrap(),
        Regex::new(r"(?i)\byou\s+are\s+now\b").unwrap(),
        Regex::new(r"(?i)\bact\s+as\s+(an?\s+)?(admin|administrator|developer|system|root)\b").unwrap(),
        Regex::new(r"(?i)<\|?\s*(system|im_start|im_end)\s*\|?>").unwrap(),
        Regex::new(r"(?im)^\s*#{2,}\s*(system|instructions?)\b").unwrap(),
        Regex::new(r"(?i)\b(jailbreak|developer\s+mode|dan\s+mode)\b").unwrap(),
        Regex::new(r"(?i)\bnew\s+instructions?\s*:").unwrap(),
    ];
}

/// Input limits for a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLimits {
    /// Characters kept before truncation (default: 5000)
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Characters beyond which input is rejected (default: 100 000)
    #[serde(default = "default_hard_ceiling")]
    pub hard_ceiling_chars: usize,

    /// Additional injection regexes on top of the built-in set
    #[serde(default)]
    pub extra_injection_patterns: Vec<String>,
}

fn default_max_input_length() -> usize {
    5000
}
fn default_hard_ceiling() -> usize {
    100_000
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_input_length: default_max_input_length(),
            hard_ceiling_chars: default_hard_ceiling(),
            extra_injection_patterns: Vec::new(),
        }
    }
}

/// Validates, truncates and scans ticket text
#[derive(Debug, Clone)]
pub struct InputValidator {
    limits: InputLimits,
    extra_patterns: Vec<Regex>,
}

impl InputValidator {
    /// Build a validator, compiling any extra injection patterns
    pub fn new(limits: InputLimits) -> Result<Self, regex::Error> {
        let extra_patterns = limits
            .extra_injection_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            limits,
            extra_patterns,
        })
    }

    pub fn limits(&self) -> &InputLimits {
        &self.limits
    }

    /// Validate and sanitize raw ticket text
    pub fn sanitize(&self, raw: &str) -> Result<SanitizedInput, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::Empty);
        }

        let original_length = raw.chars().count();
        if original_length > self.limits.hard_ceiling_chars {
            return Err(ValidationError::Oversized {
                actual: original_length,
                limit: self.limits.hard_ceiling_chars,
            });
        }

        let truncated = original_length > self.limits.max_input_length;
        let text: String = if truncated {
            raw.chars().take(self.limits.max_input_length).collect()
        } else {
            raw.to_string()
        };

        Ok(SanitizedInput {
            redacted: redact(&text),
            injection_suspected: self.is_injection_suspected(raw),
            text,
            truncated,
            original_length,
        })
    }

    /// Check text for prompt-injection markers
    pub fn is_injection_suspected(&self, text: &str) -> bool {
        INJECTION_PATTERNS
            .iter()
            .chain(self.extra_patterns.iter())
            .any(|pattern| pattern.is_match(text))
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self {
            limits: InputLimits::default(),
            extra_patterns: Vec::new(),
        }
    }
}

/// Input rejected before any cost is incurred
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Ticket text is empty")]
    Empty,

    #[error("Ticket text is oversized: {actual} chars > hard limit {limit}")]
    Oversized { actual: usize, limit: usize },
}
