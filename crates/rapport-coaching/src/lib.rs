//! # rapport-coaching
//!
//! Turns analyzer output into coaching prompts for the moderator.
//!
//! - [`policy`]: thresholds, cooldowns, cultural adjustments, delivery
//! - [`signals`]: candidate prompts derived from an utterance analysis or a tick
//! - [`engine`]: the gate that displays or suppresses candidates and records responses

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod policy;
pub mod signals;

pub use engine::{CoachingEngine, CoachingStats, Evaluation, SuppressReason};
pub use errors::CoachingError;
pub use policy::{DeliveryPolicy, ThresholdsPolicy};
pub use signals::{PromptCandidate, SignalConfig};
