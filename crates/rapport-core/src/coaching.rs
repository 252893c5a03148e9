//! Coaching prompt vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::PromptEventId;

/// Kind of coaching prompt. Cooldowns are tracked per type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    /// Biased phrasing detected in the interviewer's speech.
    BiasAlert,
    /// Interviewer asked a leading question.
    LeadingQuestion,
    /// Interviewer asked several questions at once.
    CompoundQuestion,
    /// Participant sentiment dropped sharply.
    SentimentDip,
    /// Planned topics remain uncovered near the planned end.
    TopicReminder,
    /// Interviewer is dominating talk time.
    TalkTimeBalance,
}

impl PromptType {
    /// All variants.
    pub const ALL: [Self; 6] = [
        Self::BiasAlert,
        Self::LeadingQuestion,
        Self::CompoundQuestion,
        Self::SentimentDip,
        Self::TopicReminder,
        Self::TalkTimeBalance,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BiasAlert => "bias_alert",
            Self::LeadingQuestion => "leading_question",
            Self::CompoundQuestion => "compound_question",
            Self::SentimentDip => "sentiment_dip",
            Self::TopicReminder => "topic_reminder",
            Self::TalkTimeBalance => "talk_time_balance",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the moderator answered a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptResponse {
    /// Took the advice.
    Accepted,
    /// Rejected it.
    Dismissed,
    /// Deferred it. A snoozed prompt never re-surfaces in the session.
    Snoozed,
}

impl PromptResponse {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
            Self::Snoozed => "snoozed",
        }
    }
}

/// A prompt that was displayed to the moderator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingPromptEvent {
    /// Identity.
    pub id: PromptEventId,
    /// Prompt type.
    pub prompt_type: PromptType,
    /// Text shown to the moderator.
    pub text: String,
    /// Confidence of the triggering signal.
    pub confidence: f64,
    /// When it was displayed.
    pub displayed_at: DateTime<Utc>,
    /// Response, set at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<PromptResponse>,
    /// When the response was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    /// True when the response came from the auto-dismiss timer.
    #[serde(default)]
    pub auto_responded: bool,
    /// Cultural context preset that shaped this prompt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_context: Option<String>,
}

impl CoachingPromptEvent {
    /// Whether a response has been recorded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.response.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_type_wire_names_match_serde() {
        for t in PromptType::ALL {
            assert_eq!(serde_json::to_string(&t).unwrap(), format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn response_serde() {
        let r: PromptResponse = serde_json::from_str("\"snoozed\"").unwrap();
        assert_eq!(r, PromptResponse::Snoozed);
        assert_eq!(r.as_str(), "snoozed");
    }

    #[test]
    fn event_resolution() {
        let mut event = CoachingPromptEvent {
            id: PromptEventId::new(),
            prompt_type: PromptType::BiasAlert,
            text: "Rephrase neutrally".into(),
            confidence: 0.9,
            displayed_at: Utc::now(),
            response: None,
            responded_at: None,
            auto_responded: false,
            cultural_context: None,
        };
        assert!(!event.is_resolved());
        event.response = Some(PromptResponse::Accepted);
        assert!(event.is_resolved());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["promptType"], "bias_alert");
        assert_eq!(json["response"], "accepted");
    }
}
