//! The analyzer seam and failure isolation.
//!
//! [`UtteranceAnalyzers`] is the set of four classifiers the pipeline runs.
//! [`run_guarded`] wraps each call so a panic, an error, or a blown time
//! budget becomes an [`AnalyzerFailure`] instead of taking the session down.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use rapport_core::pii::PiiDetection;
use rapport_core::transcript::Utterance;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bias::{self, BiasAlert};
use crate::pii;
use crate::question::{self, QuestionAnalysis};
use crate::sentiment::{self, SentimentResult};

/// Which analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// PII detector.
    Pii,
    /// Sentiment analyzer.
    Sentiment,
    /// Bias detector.
    Bias,
    /// Question-type analyzer.
    QuestionType,
}

impl AnalyzerKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Sentiment => "sentiment",
            Self::Bias => "bias",
            Self::QuestionType => "question_type",
        }
    }
}

/// Why an analyzer produced nothing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyzerError {
    /// The analyzer panicked.
    #[error("panicked: {0}")]
    Panicked(String),
    /// The analyzer finished after its budget; the result was discarded.
    #[error("exceeded budget: {elapsed_ms}ms > {budget_ms}ms")]
    OverBudget {
        /// Time taken.
        elapsed_ms: u128,
        /// Allowed time.
        budget_ms: u128,
    },
    /// The analyzer reported an error.
    #[error("{0}")]
    Failed(String),
}

/// Recorded absence of one analyzer's contribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerFailure {
    /// Which analyzer.
    pub analyzer: AnalyzerKind,
    /// Why.
    pub reason: String,
}

/// The four classifiers run per utterance.
pub trait UtteranceAnalyzers: Send + Sync {
    /// PII spans.
    fn pii(&self, utterance: &Utterance) -> Result<Vec<PiiDetection>, AnalyzerError>;
    /// Sentiment.
    fn sentiment(&self, utterance: &Utterance) -> Result<SentimentResult, AnalyzerError>;
    /// Bias alerts.
    fn bias(&self, utterance: &Utterance) -> Result<Vec<BiasAlert>, AnalyzerError>;
    /// Question classification.
    fn question(&self, utterance: &Utterance) -> Result<Option<QuestionAnalysis>, AnalyzerError>;
}

/// The built-in deterministic analyzers.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleBasedAnalyzers;

impl UtteranceAnalyzers for RuleBasedAnalyzers {
    fn pii(&self, utterance: &Utterance) -> Result<Vec<PiiDetection>, AnalyzerError> {
        Ok(pii::scan(&utterance.id, &utterance.text))
    }

    fn sentiment(&self, utterance: &Utterance) -> Result<SentimentResult, AnalyzerError> {
        Ok(sentiment::analyze(&utterance.text))
    }

    fn bias(&self, utterance: &Utterance) -> Result<Vec<BiasAlert>, AnalyzerError> {
        Ok(bias::detect(utterance))
    }

    fn question(&self, utterance: &Utterance) -> Result<Option<QuestionAnalysis>, AnalyzerError> {
        Ok(question::classify(utterance))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one analyzer with panic capture and a time budget.
///
/// Analyzers are synchronous and cannot be preempted, so a result that
/// arrives after `budget` is discarded rather than cut short.
pub fn run_guarded<T>(
    kind: AnalyzerKind,
    budget: Duration,
    f: impl FnOnce() -> Result<T, AnalyzerError>,
) -> Result<T, AnalyzerFailure> {
    let started = Instant::now();
    let outcome = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(AnalyzerError::Panicked(panic_message(payload.as_ref()))),
    };
    let elapsed = started.elapsed();

    let outcome = match outcome {
        Ok(_) if elapsed > budget => Err(AnalyzerError::OverBudget {
            elapsed_ms: elapsed.as_millis(),
            budget_ms: budget.as_millis(),
        }),
        other => other,
    };

    outcome.map_err(|e| {
        tracing::warn!(analyzer = kind.as_str(), error = %e, "analyzer skipped");
        AnalyzerFailure {
            analyzer: kind,
            reason: e.to_string(),
        }
    })
}
