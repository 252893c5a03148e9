//! Analyzer tuning.

use serde::{Deserialize, Serialize};

/// Cultural context preset. Shifts coaching thresholds for conversational
/// norms where indirectness or emotional restraint is expected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CulturalContext {
    /// No adjustment.
    #[default]
    General,
    /// Meaning carried by context; sentiment tends to be understated.
    HighContext,
    /// Explicit, direct communication.
    LowContext,
}

impl CulturalContext {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::HighContext => "high_context",
            Self::LowContext => "low_context",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Some(Self::General),
            "high_context" => Some(Self::HighContext),
            "low_context" => Some(Self::LowContext),
            _ => None,
        }
    }
}

/// Analyzer pipeline tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    /// Minimum score change between consecutive same-speaker utterances
    /// that counts as an emotional shift.
    pub emotional_shift_threshold: f64,
    /// Participant score at or below this is a sentiment dip.
    pub sentiment_dip_score: f64,
    /// Per-analyzer time budget in milliseconds.
    pub analyzer_budget_ms: u64,
    /// Estimated seconds per word when an utterance has no end time.
    pub seconds_per_word: f64,
    /// Interviewer ratio above which talk time is imbalanced.
    pub talk_time_imbalance_ratio: f64,
    /// Total talk time before imbalance is evaluated, in seconds.
    pub talk_time_min_secs: f64,
    /// Cultural context preset.
    pub cultural_context: CulturalContext,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            emotional_shift_threshold: 0.5,
            sentiment_dip_score: -0.4,
            analyzer_budget_ms: 50,
            seconds_per_word: 0.4,
            talk_time_imbalance_ratio: 0.65,
            talk_time_min_secs: 120.0,
            cultural_context: CulturalContext::General,
        }
    }
}
