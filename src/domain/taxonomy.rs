//! Triage taxonomy: the configured categories and queues.
//!
//! The taxonomy is business configuration. The pipeline never invents a
//! category or queue; everything it emits is looked up here and returned
//! in its canonical spelling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configured set of valid categories and queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    /// Version tag; part of the cache fingerprint
    #[serde(default = "default_version")]
    pub version: String,

    /// Valid ticket categories
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Valid routing queues
    #[serde(default = "default_queues")]
    pub queues: Vec<String>,

    /// Category substituted when the model output is unusable
    #[serde(default = "default_category")]
    pub default_category: String,

    /// Queue substituted when the model output is unusable (lowest tier)
    #[serde(default = "default_queue")]
    pub default_queue: String,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_categories() -> Vec<String> {
    ["Billing", "Bug", "Access", "Feature Request", "General"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_queues() -> Vec<String> {
    ["Support L1", "Support L2", "Billing Ops", "Security", "Engineering"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_category() -> String {
    "General".to_string()
}

fn default_queue() -> String {
    "Support L1".to_string()
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            version: default_version(),
            categories: default_categories(),
            queues: default_queues(),
            default_category: default_category(),
            default_queue: default_queue(),
        }
    }
}

impl Taxonomy {
    /// Canonical category matching `raw` (trimmed, case-insensitive)
    pub fn match_category(&self, raw: &str) -> Option<&str> {
        canonical(&self.categories, raw)
    }

    /// Canonical queue matching `raw` (trimmed, case-insensitive)
    pub fn match_queue(&self, raw: &str) -> Option<&str> {
        canonical(&self.queues, raw)
    }

    /// Exact membership check for a category
    pub fn contains_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Exact membership check for a queue
    pub fn contains_queue(&self, queue: &str) -> bool {
        self.queues.iter().any(|q| q == queue)
    }

    /// Check that the lists are usable and the defaults are members
    pub fn validate(&self) -> Result<(), TaxonomyError> {
        if self.categories.is_empty() {
            return Err(TaxonomyError::Empty { field: "categories" });
        }
        if self.queues.is_empty() {
            return Err(TaxonomyError::Empty { field: "queues" });
        }
        if let Some(dup) = first_duplicate(&self.categories) {
            return Err(TaxonomyError::Duplicate {
                field: "categories",
                value: dup.to_string(),
            });
        }
        if let Some(dup) = first_duplicate(&self.queues) {
            return Err(TaxonomyError::Duplicate {
                field: "queues",
                value: dup.to_string(),
            });
        }
        if !self.contains_category(&self.default_category) {
            return Err(TaxonomyError::DefaultNotMember {
                field: "default_category",
                value: self.default_category.clone(),
            });
        }
        if !self.contains_queue(&self.default_queue) {
            return Err(TaxonomyError::DefaultNotMember {
                field: "default_queue",
                value: self.default_queue.clone(),
            });
        }
        Ok(())
    }
}

fn canonical<'a>(options: &'a [String], raw: &str) -> Option<&'a str> {
    let raw = raw.trim();
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(raw))
        .map(String::as_str)
}

// Case-insensitive, since matching is case-insensitive too
fn first_duplicate(values: &[String]) -> Option<&str> {
    values.iter().enumerate().find_map(|(i, value)| {
        values[..i]
            .iter()
            .any(|earlier| earlier.eq_ignore_ascii_case(value))
            .then_some(value.as_str())
    })
}

/// Taxonomy configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("Taxonomy {field} must not be empty")]
    Empty { field: &'static str },

    #[error("Taxonomy {field} contains duplicate entry '{value}'")]
    Duplicate { field: &'static str, value: String },

    #[error("Taxonomy {field} '{value}' is not a member of the configured list")]
    DefaultNotMember { field: &'static str, value: String },
}
