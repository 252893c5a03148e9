//! Inbound session commands.
//!
//! Commands arrive as JSON objects tagged by `type` with camelCase fields.
//! Connection-level frames (`ack`, `ping`) never reach this layer.

use rapport_core::coaching::PromptResponse;
use rapport_core::errors::LiveError;
use rapport_core::ids::{DetectionId, PromptEventId, UtteranceId};
use rapport_core::pii::PiiType;
use rapport_core::topics::CoverageStatus;
use rapport_core::transcript::Speaker;
use rapport_redaction::{ConsentKind, RedactionAction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest accepted comment body, in characters.
pub const MAX_COMMENT_CHARS: usize = 4_000;
/// Longest accepted utterance text, in characters.
pub const MAX_UTTERANCE_CHARS: usize = 20_000;

/// A command on the session queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// A transcribed utterance. Without a speaker, the active speaker is used.
    Utterance {
        /// Who spoke.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speaker: Option<Speaker>,
        /// Transcribed text.
        text: String,
        /// Seconds from session start.
        start_time: f64,
        /// End in seconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_time: Option<f64>,
        /// Transcription confidence in `[0, 1]`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    /// `draft → running`.
    Start,
    /// `running → paused`.
    Pause,
    /// `paused → running`.
    Resume,
    /// End the session.
    Stop,
    /// Flag the moment at `timestamp` as insightful.
    FlagInsight {
        /// Session-relative seconds.
        timestamp: f64,
    },
    /// Flip the active speaker.
    ToggleSpeaker,
    /// Answer a displayed coaching prompt.
    RespondToCoaching {
        /// Prompt answered.
        event_id: PromptEventId,
        /// Response.
        response: PromptResponse,
    },
    /// Set a topic's coverage.
    UpdateTopic {
        /// Topic name.
        topic_name: String,
        /// New status.
        status: CoverageStatus,
    },
    /// Add a comment. Allowed for every role.
    Comment {
        /// Body.
        text: String,
        /// Utterance commented on.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        utterance_id: Option<UtteranceId>,
        /// Session-relative seconds commented on.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    /// Decide one PII detection.
    ApplyRedaction {
        /// Detection decided.
        detection_id: DetectionId,
        /// Action.
        action: RedactionAction,
        /// Replacement text for `replace`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replacement: Option<String>,
    },
    /// Redact every undecided detection of one type.
    BatchRedact {
        /// Type to redact.
        pii_type: PiiType,
    },
    /// Record a consent answer.
    RecordConsent {
        /// Who consented.
        subject: String,
        /// What for.
        kind: ConsentKind,
        /// Granted or refused.
        granted: bool,
    },
}

impl Command {
    /// Decode a command from JSON text.
    pub fn parse(json: &str) -> Result<Self, LiveError> {
        serde_json::from_str(json).map_err(|e| LiveError::validation(e.to_string()))
    }

    /// Decode a command from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, LiveError> {
        serde_json::from_value(value).map_err(|e| LiveError::validation(e.to_string()))
    }

    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utterance { .. } => "utterance",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::FlagInsight { .. } => "flagInsight",
            Self::ToggleSpeaker => "toggleSpeaker",
            Self::RespondToCoaching { .. } => "respondToCoaching",
            Self::UpdateTopic { .. } => "updateTopic",
            Self::Comment { .. } => "comment",
            Self::ApplyRedaction { .. } => "applyRedaction",
            Self::BatchRedact { .. } => "batchRedact",
            Self::RecordConsent { .. } => "recordConsent",
        }
    }

    /// Whether only hosts may issue this command.
    pub fn requires_host(&self) -> bool {
        !matches!(self, Self::Comment { .. })
    }

    /// Field-level checks that need no session state.
    pub fn validate(&self) -> Result<(), LiveError> {
        match self {
            Self::Utterance {
                text,
                start_time,
                end_time,
                confidence,
                ..
            } => {
                non_blank("text", text)?;
                max_chars("text", text, MAX_UTTERANCE_CHARS)?;
                seconds("startTime", *start_time)?;
                if let Some(end) = end_time {
                    seconds("endTime", *end)?;
                    if end < start_time {
                        return Err(LiveError::validation("endTime must not precede startTime"));
                    }
                }
                if let Some(c) = confidence {
                    if !(0.0..=1.0).contains(c) {
                        return Err(LiveError::validation("confidence must be within [0, 1]"));
                    }
                }
                Ok(())
            }
            Self::FlagInsight { timestamp } => seconds("timestamp", *timestamp),
            Self::UpdateTopic { topic_name, .. } => non_blank("topicName", topic_name),
            Self::Comment { text, timestamp, .. } => {
                non_blank("text", text)?;
                max_chars("text", text, MAX_COMMENT_CHARS)?;
                timestamp.map_or(Ok(()), |t| seconds("timestamp", t))
            }
            Self::RecordConsent { subject, .. } => non_blank("subject", subject),
            Self::ApplyRedaction {
                action: RedactionAction::Replace,
                replacement: Some(r),
                ..
            } => non_blank("replacement", r),
            Self::Start
            | Self::Pause
            | Self::Resume
            | Self::Stop
            | Self::ToggleSpeaker
            | Self::RespondToCoaching { .. }
            | Self::ApplyRedaction { .. }
            | Self::BatchRedact { .. } => Ok(()),
        }
    }
}

fn non_blank(field: &str, value: &str) -> Result<(), LiveError> {
    if value.trim().is_empty() {
        return Err(LiveError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn max_chars(field: &str, value: &str, max: usize) -> Result<(), LiveError> {
    if value.chars().count() > max {
        return Err(LiveError::validation(format!("{field} exceeds {max} characters")));
    }
    Ok(())
}

fn seconds(field: &str, value: f64) -> Result<(), LiveError> {
    if !value.is_finite() || value < 0.0 {
        return Err(LiveError::validation(format!(
            "{field} must be a non-negative number of seconds"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_utterance() {
        let cmd = Command::parse(
            r#"{"type":"utterance","speaker":"participant","text":"hi","startTime":1.5,"endTime":2.0}"#,
        )
        .unwrap();
        assert_matches!(
            cmd,
            Command::Utterance { speaker: Some(Speaker::Participant), end_time: Some(_), .. }
        );
        assert_eq!(cmd.name(), "utterance");
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn parses_unit_commands() {
        assert_eq!(Command::parse(r#"{"type":"pause"}"#).unwrap(), Command::Pause);
        assert_eq!(
            Command::parse(r#"{"type":"toggleSpeaker"}"#).unwrap(),
            Command::ToggleSpeaker
        );
    }

    #[test]
    fn parses_camel_case_fields() {
        let cmd = Command::parse(
            r#"{"type":"respondToCoaching","eventId":"prm_1","response":"snoozed"}"#,
        )
        .unwrap();
        assert_matches!(cmd, Command::RespondToCoaching { response: PromptResponse::Snoozed, .. });
        let cmd = Command::parse(r#"{"type":"updateTopic","topicName":"Pricing","status":"covered"}"#)
            .unwrap();
        assert_matches!(cmd, Command::UpdateTopic { status: CoverageStatus::Covered, .. });
        let cmd = Command::parse(r#"{"type":"batchRedact","piiType":"email"}"#).unwrap();
        assert_matches!(cmd, Command::BatchRedact { pii_type: PiiType::Email });
    }

    #[test]
    fn malformed_is_validation_error() {
        for bad in [
            r#"{"type":"utterance","text":"hi"}"#,
            r#"{"type":"nope"}"#,
            r#"{"type":"flagInsight","timestamp":"soon"}"#,
            "not json",
        ] {
            assert_matches!(Command::parse(bad), Err(LiveError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn field_checks() {
        let utterance = |text: &str, start: f64, end: Option<f64>, confidence: Option<f64>| {
            Command::Utterance {
                speaker: None,
                text: text.into(),
                start_time: start,
                end_time: end,
                confidence,
            }
        };
        assert!(utterance("  ", 0.0, None, None).validate().is_err());
        assert!(utterance("hi", -1.0, None, None).validate().is_err());
        assert!(utterance("hi", f64::NAN, None, None).validate().is_err());
        assert!(utterance("hi", 5.0, Some(4.0), None).validate().is_err());
        assert!(utterance("hi", 5.0, None, Some(1.5)).validate().is_err());
        assert!(utterance("hi", 5.0, Some(5.0), Some(0.9)).validate().is_ok());

        let blank_replace = Command::ApplyRedaction {
            detection_id: DetectionId::from_raw("pii_1"),
            action: RedactionAction::Replace,
            replacement: Some(" ".into()),
        };
        assert!(blank_replace.validate().is_err());
        let long = Command::Comment {
            text: "x".repeat(MAX_COMMENT_CHARS + 1),
            utterance_id: None,
            timestamp: None,
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn only_comment_is_open_to_observers() {
        assert!(!Command::Comment { text: "nice".into(), utterance_id: None, timestamp: None }
            .requires_host());
        assert!(Command::Pause.requires_host());
        assert!(Command::BatchRedact { pii_type: PiiType::Phone }.requires_host());
    }
}
