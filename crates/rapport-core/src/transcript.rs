//! Transcript vocabulary: speakers, utterances, and the analyzer-derived
//! annotations stored on them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::UtteranceId;

/// Who is speaking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The moderator running the interview.
    Interviewer,
    /// The person being interviewed.
    Participant,
}

impl Speaker {
    /// The other speaker.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Interviewer => Self::Participant,
            Self::Participant => Self::Interviewer,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interviewer => "interviewer",
            Self::Participant => "participant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment polarity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Net positive.
    Positive,
    /// Net negative.
    Negative,
    /// Neither.
    Neutral,
    /// Strong signals both ways.
    Mixed,
}

/// Question taxonomy for interviewer questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Invites an elaborated answer.
    Open,
    /// Answerable with yes/no or a single fact.
    Closed,
    /// Suggests the desired answer.
    Leading,
    /// Asks several things at once.
    Compound,
    /// Asks about an imagined situation.
    Hypothetical,
    /// Digs deeper into a previous answer.
    Probing,
    /// Checks understanding of a previous answer.
    Clarifying,
}

impl QuestionType {
    /// All variants in display order.
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::Closed,
        Self::Leading,
        Self::Compound,
        Self::Hypothetical,
        Self::Probing,
        Self::Clarifying,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Leading => "leading",
            Self::Compound => "compound",
            Self::Hypothetical => "hypothetical",
            Self::Probing => "probing",
            Self::Clarifying => "clarifying",
        }
    }
}

/// A single transcribed utterance.
///
/// Immutable once stored. Redaction is an overlay computed on read; the
/// original `text` is never rewritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    /// Identity.
    pub id: UtteranceId,
    /// Who spoke.
    pub speaker: Speaker,
    /// Raw transcribed text.
    pub text: String,
    /// Start offset in seconds from session start.
    pub start_time: f64,
    /// End offset in seconds, when the transcriber supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Transcriber confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Sentiment score in `[-1, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f64>,
    /// Sentiment polarity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polarity: Option<Polarity>,
    /// Question classification, for interviewer questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionType>,
}

impl Utterance {
    /// Build an un-annotated utterance with a fresh ID.
    pub fn new(speaker: Speaker, text: impl Into<String>, start_time: f64) -> Self {
        Self {
            id: UtteranceId::new(),
            speaker,
            text: text.into(),
            start_time,
            end_time: None,
            confidence: None,
            sentiment_score: None,
            polarity: None,
            question_type: None,
        }
    }

    /// Builder: set the end time.
    #[must_use]
    pub fn with_end(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Whitespace-separated word count.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
