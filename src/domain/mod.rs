//! Domain types for ticket triage.
//!
//! This module contains the core data structures:
//! - Ticket: inbound ticket and its sanitized form
//! - Triage: the structured result returned to callers
//! - Taxonomy: configured categories and queues

pub mod taxonomy;
pub mod ticket;
pub mod triage;

// Re-export commonly used types
pub use taxonomy::{Taxonomy, TaxonomyError};
pub use ticket::{new_request_id, SanitizedInput, TicketInput, ANONYMOUS_CALLER};
pub use triage::{Priority, TriageMetadata, TriageResult};
