//! Interviewer bias detection.
//!
//! A closed set of bias types, each with phrase patterns, a static default
//! severity and description, and its own confidence bar. Only interviewer
//! speech is classified.

use std::sync::LazyLock;

use rapport_core::ids::UtteranceId;
use rapport_core::transcript::{Speaker, Utterance};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Severity;

/// Extra confidence per additional matching phrase of the same type.
const REPEAT_BONUS: f64 = 0.1;
/// Confidence ceiling.
const MAX_CONFIDENCE: f64 = 0.99;

/// Kinds of interviewer bias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasType {
    /// Wording that steers toward an answer.
    LeadingLanguage,
    /// Presupposes a fact the participant has not stated.
    AssumptiveLanguage,
    /// Seeks agreement with the interviewer's view.
    ConfirmationSeeking,
    /// Emotionally charged or absolute wording.
    LoadedLanguage,
    /// Generalizes about a group the participant belongs to.
    Stereotyping,
    /// Primes the answer with a reference point.
    Anchoring,
}

impl BiasType {
    /// All variants.
    pub const ALL: [Self; 6] = [
        Self::LeadingLanguage,
        Self::AssumptiveLanguage,
        Self::ConfirmationSeeking,
        Self::LoadedLanguage,
        Self::Stereotyping,
        Self::Anchoring,
    ];

    /// Human-readable explanation shown with alerts.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::LeadingLanguage => "The question suggests the answer you expect.",
            Self::AssumptiveLanguage => "The question assumes something the participant hasn't said.",
            Self::ConfirmationSeeking => "The question invites agreement rather than an honest view.",
            Self::LoadedLanguage => "Charged or absolute wording can color the response.",
            Self::Stereotyping => "The question generalizes about a group the participant belongs to.",
            Self::Anchoring => "Mentioning what others said primes the participant's answer.",
        }
    }

    /// Default severity.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::LeadingLanguage | Self::Stereotyping => Severity::High,
            Self::AssumptiveLanguage | Self::ConfirmationSeeking | Self::Anchoring => {
                Severity::Medium
            }
            Self::LoadedLanguage => Severity::Low,
        }
    }

    /// Minimum confidence for an alert of this type.
    #[must_use]
    pub const fn confidence_bar(self) -> f64 {
        match self {
            Self::LeadingLanguage | Self::LoadedLanguage | Self::AssumptiveLanguage | Self::Anchoring => 0.6,
            Self::ConfirmationSeeking => 0.65,
            Self::Stereotyping => 0.7,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeadingLanguage => "leading_language",
            Self::AssumptiveLanguage => "assumptive_language",
            Self::ConfirmationSeeking => "confirmation_seeking",
            Self::LoadedLanguage => "loaded_language",
            Self::Stereotyping => "stereotyping",
            Self::Anchoring => "anchoring",
        }
    }
}

/// One bias finding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasAlert {
    /// Utterance the phrase appeared in.
    pub utterance_id: UtteranceId,
    /// Bias kind.
    pub bias_type: BiasType,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Severity.
    pub severity: Severity,
    /// Explanation.
    pub description: String,
    /// Phrases that triggered it.
    pub matched: Vec<String>,
}

struct BiasRule {
    bias_type: BiasType,
    regex: Regex,
    base_confidence: f64,
}

fn rule(bias_type: BiasType, pattern: &str, base_confidence: f64) -> BiasRule {
    BiasRule {
        bias_type,
        regex: Regex::new(pattern).unwrap(),
        base_confidence,
    }
}

static RULES: LazyLock<Vec<BiasRule>> = LazyLock::new(|| {
    vec![
        rule(
            BiasType::LeadingLanguage,
            r"(?i)\b(?:don't you (?:think|agree|feel)|wouldn't you (?:say|agree)|isn't it true|you'd agree|surely you|you must (?:have|be|feel))\b",
            0.85,
        ),
        rule(
            BiasType::AssumptiveLanguage,
            r"(?i)\b(?:how much do you (?:love|like|enjoy|hate)|what do you (?:love|like|hate) (?:most|about)|why do you (?:love|like|hate|prefer)|how often do you (?:struggle|fail|get frustrated))\b",
            0.75,
        ),
        rule(
            BiasType::ConfirmationSeeking,
            r"(?i)(?:\b(?:is that right|isn't that so|makes sense,? right|you agree|correct)\?|,\s*right\?)",
            0.7,
        ),
        rule(
            BiasType::LoadedLanguage,
            r"(?i)\b(?:obviously|clearly|of course|everyone knows|naturally|terrible|amazing|ridiculous)\b",
            0.65,
        ),
        rule(
            BiasType::Stereotyping,
            r"(?i)\b(?:people like you|guys like you|your generation|(?:as|being) an? (?:woman|man|mother|father|millennial|boomer|older person)|typical (?:user|customer)s?)\b",
            0.8,
        ),
        rule(
            BiasType::Anchoring,
            r"(?i)\b(?:most (?:people|users|customers) (?:say|said|think|prefer|rate)|other (?:participants|people|users) (?:said|told us|mentioned)|everyone else (?:said|thinks))\b",
            0.7,
        ),
    ]
});

/// Classify an utterance. Participant speech yields no alerts.
pub fn detect(utterance: &Utterance) -> Vec<BiasAlert> {
    if utterance.speaker != Speaker::Interviewer {
        return Vec::new();
    }

    let mut alerts = Vec::new();
    for rule in RULES.iter() {
        let matched: Vec<String> = rule
            .regex
            .find_iter(&utterance.text)
            .map(|m| m.as_str().to_string())
            .collect();
        if matched.is_empty() {
            continue;
        }

        #[allow(clippy::cast_precision_loss)]
        let bonus = (matched.len() - 1) as f64 * REPEAT_BONUS;
        let confidence = (rule.base_confidence + bonus).min(MAX_CONFIDENCE);
        if confidence < rule.bias_type.confidence_bar() {
            continue;
        }

        alerts.push(BiasAlert {
            utterance_id: utterance.id.clone(),
            bias_type: rule.bias_type,
            confidence,
            severity: rule.bias_type.default_severity(),
            description: rule.bias_type.description().to_string(),
            matched,
        });
    }
    alerts
}
