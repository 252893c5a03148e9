//! # rapport-redaction
//!
//! Tracks PII detections per utterance, one active decision per detection,
//! participant consent, and renders redacted text on read. Original text is
//! never mutated; [`RedactionService::apply_redactions_to_text`] computes an
//! overlay against the exact text version a detection was stamped with.

#![deny(unsafe_code)]

pub mod errors;
pub mod model;
pub mod service;
mod substitute;

pub use errors::RedactionError;
pub use model::{
    ConsentKind, ConsentRecord, RedactionAction, RedactionDecision, RedactionState,
    RedactionSummary,
};
pub use service::RedactionService;
