//! ticketai - Resilient support-ticket triage
//!
//! Classifies a support ticket into a structured triage record (summary,
//! category, priority, queue, confidence, review flag) by calling a remote
//! text-generation model, and guarantees a well-formed answer even when
//! that model is slow, down, wrong or attacked.
//!
//! # Architecture
//!
//! Every request runs through one pipeline:
//! - Input is validated, truncated and scanned for prompt injection
//! - Callers are rate limited before anything costs money
//! - Results are cached by a fingerprint of text and prompt version
//! - Model calls go through a circuit breaker, timeout and retry policy
//! - Model output is enforced against the configured taxonomy
//! - Failures after admission degrade to a review-flagged result
//!
//! # Modules
//!
//! - `adapters`: Model providers (live HTTP, offline mock)
//! - `core`: The triage pipeline and its resilience components
//! - `domain`: Data structures (TicketInput, TriageResult, Taxonomy)
//! - `config`: YAML + environment configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Triage a ticket
//! ticketai triage --text "Customer cannot log in, error code 500"
//!
//! # Pipe a ticket in and pretty-print
//! cat ticket.txt | ticketai triage --output pretty
//!
//! # Check health
//! ticketai health
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{MockProvider, ModelProvider};
pub use config::TriageConfig;
pub use crate::core::{HealthReport, PipelineBuilder, TriageError, TriagePipeline};
pub use domain::{Priority, Taxonomy, TicketInput, TriageResult};
