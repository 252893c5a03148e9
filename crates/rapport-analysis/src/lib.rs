//! # rapport-analysis
//!
//! Deterministic, rule-based classifiers over a single utterance and the
//! pipeline that folds their output into per-session aggregates.
//!
//! - [`pii`]: typed pattern detection of personal information
//! - [`sentiment`]: lexicon polarity, score, and emotional shifts
//! - [`bias`]: closed-set bias phrase classification
//! - [`question`]: question taxonomy, anti-patterns, running statistics
//! - [`topics`]: topic coverage inference
//! - [`aggregates`]: talk time and emotional arc
//! - [`pipeline`]: failure-isolated orchestration of all of the above

#![deny(unsafe_code)]

pub mod aggregates;
pub mod analyzer;
pub mod bias;
pub mod pii;
pub mod pipeline;
pub mod question;
pub mod sentiment;
pub mod topics;

pub use analyzer::{AnalyzerError, AnalyzerFailure, AnalyzerKind, RuleBasedAnalyzers, UtteranceAnalyzers};
pub use pipeline::{AnalyzerPipeline, PipelineConfig, PipelineSnapshot, UtteranceAnalysis};

use serde::{Deserialize, Serialize};

/// Severity attached to alerts and anti-patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth noting.
    Low,
    /// Should be corrected.
    Medium,
    /// Undermines the interview.
    High,
}
