//! Outbound session events and the snapshot sent on connect or resync.
//!
//! Events carry no sequence number; the fan-out hub stamps each one when it
//! wraps it in an envelope.

use rapport_analysis::bias::BiasAlert;
use rapport_analysis::{PipelineSnapshot, UtteranceAnalysis};
use rapport_coaching::CoachingStats;
use rapport_core::coaching::CoachingPromptEvent;
use rapport_core::ids::{SessionId, UtteranceId};
use rapport_core::session::{Comment, Insight};
use rapport_core::topics::TopicStatus;
use rapport_core::transcript::{Speaker, Utterance};
use rapport_redaction::{RedactionDecision, RedactionSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::StatusView;

/// Who receives an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Every connection.
    All,
    /// Host connections only.
    Hosts,
}

/// An utterance as clients see it: redaction overlay applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
    /// The stored utterance with analyzer annotations.
    pub utterance: Utterance,
    /// Text with active redactions substituted.
    pub display_text: String,
}

/// Payload of `utterance.analyzed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedUtterance {
    /// The transcript line.
    #[serde(flatten)]
    pub line: TranscriptLine,
    /// Composite analyzer result.
    pub analysis: UtteranceAnalysis,
}

/// One re-rendered utterance after a redaction change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayUpdate {
    /// Utterance re-rendered.
    pub utterance_id: UtteranceId,
    /// New display text.
    pub display_text: String,
}

/// Payload of `redaction.updated`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionUpdate {
    /// Utterances whose display text changed.
    pub updates: Vec<DisplayUpdate>,
    /// Decisions recorded by the command.
    pub decisions: Vec<RedactionDecision>,
    /// Counts after the change.
    pub summary: RedactionSummary,
}

/// Payload of `session.warning`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWarning {
    /// Error code of the degraded subsystem.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

/// An event broadcast to a session's connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Lifecycle change.
    #[serde(rename = "session.status")]
    Status(StatusView),
    /// An utterance was ingested and analyzed.
    #[serde(rename = "utterance.analyzed")]
    UtteranceAnalyzed(Box<AnalyzedUtterance>),
    /// A coaching prompt was displayed.
    #[serde(rename = "coaching.prompt")]
    CoachingPrompt(CoachingPromptEvent),
    /// A coaching prompt was answered, manually or by timer.
    #[serde(rename = "coaching.response")]
    CoachingResponse(CoachingPromptEvent),
    /// A bias alert on an interviewer utterance.
    #[serde(rename = "bias.alert")]
    BiasAlert(BiasAlert),
    /// A topic changed coverage.
    #[serde(rename = "topic.status")]
    TopicStatus(TopicStatus),
    /// A comment was added.
    #[serde(rename = "comment.added")]
    CommentAdded(Comment),
    /// An insight was flagged.
    #[serde(rename = "insight.flagged")]
    InsightFlagged(Insight),
    /// The active speaker changed.
    #[serde(rename = "speaker.toggled")]
    SpeakerToggled {
        /// New active speaker.
        #[serde(rename = "activeSpeaker")]
        active_speaker: Speaker,
    },
    /// Redaction decisions or consent changed.
    #[serde(rename = "redaction.updated")]
    RedactionUpdated(RedactionUpdate),
    /// A subsystem degraded. Hosts only.
    #[serde(rename = "session.warning")]
    Warning(SessionWarning),
}

impl SessionEvent {
    /// Wire type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status(_) => "session.status",
            Self::UtteranceAnalyzed(_) => "utterance.analyzed",
            Self::CoachingPrompt(_) => "coaching.prompt",
            Self::CoachingResponse(_) => "coaching.response",
            Self::BiasAlert(_) => "bias.alert",
            Self::TopicStatus(_) => "topic.status",
            Self::CommentAdded(_) => "comment.added",
            Self::InsightFlagged(_) => "insight.flagged",
            Self::SpeakerToggled { .. } => "speaker.toggled",
            Self::RedactionUpdated(_) => "redaction.updated",
            Self::Warning(_) => "session.warning",
        }
    }

    /// Who receives it.
    pub fn audience(&self) -> Audience {
        match self {
            Self::Warning(_) => Audience::Hosts,
            _ => Audience::All,
        }
    }

    /// Split into the wire type name and the `data` payload.
    pub fn into_parts(self) -> Result<(&'static str, Value), serde_json::Error> {
        let event_type = self.event_type();
        let mut value = serde_json::to_value(self)?;
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok((event_type, data))
    }
}

/// Full session state for a connecting or resyncing client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session identity.
    pub session_id: SessionId,
    /// Lifecycle.
    pub status: StatusView,
    /// Planned topics.
    pub topics: Vec<TopicStatus>,
    /// Planned length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_duration_secs: Option<u64>,
    /// Transcript with redactions applied.
    pub transcript: Vec<TranscriptLine>,
    /// Displayed coaching prompts.
    pub prompts: Vec<CoachingPromptEvent>,
    /// Coaching response counts.
    pub coaching: CoachingStats,
    /// Comments.
    pub comments: Vec<Comment>,
    /// Insights.
    pub insights: Vec<Insight>,
    /// Rolling aggregates.
    pub aggregates: PipelineSnapshot,
    /// Redaction counts.
    pub redaction: RedactionSummary,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rapport_core::session::SessionStatus;

    use super::*;

    fn status() -> StatusView {
        StatusView {
            status: SessionStatus::Paused,
            started_at: Some(Utc::now()),
            ended_at: None,
            paused_at: Some(Utc::now()),
            effective_secs: 10.0,
            active_speaker: Speaker::Interviewer,
        }
    }

    #[test]
    fn adjacently_tagged_wire_shape() {
        let v = serde_json::to_value(SessionEvent::Status(status())).unwrap();
        assert_eq!(v["type"], "session.status");
        assert_eq!(v["data"]["status"], "paused");
        assert_eq!(v["data"]["effectiveSecs"], 10.0);
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let events = [
            SessionEvent::Status(status()),
            SessionEvent::SpeakerToggled {
                active_speaker: Speaker::Participant,
            },
            SessionEvent::Warning(SessionWarning {
                code: "PERSISTENCE_FAILURE".into(),
                message: "disk".into(),
            }),
            SessionEvent::TopicStatus(TopicStatus::new("Pricing")),
        ];
        for e in events {
            let v = serde_json::to_value(&e).unwrap();
            assert_eq!(v["type"], e.event_type());
        }
    }

    #[test]
    fn into_parts_extracts_data() {
        let (t, data) = SessionEvent::SpeakerToggled {
            active_speaker: Speaker::Participant,
        }
        .into_parts()
        .unwrap();
        assert_eq!(t, "speaker.toggled");
        assert_eq!(data["activeSpeaker"], "participant");
    }

    #[test]
    fn warnings_go_to_hosts() {
        let w = SessionEvent::Warning(SessionWarning {
            code: "X".into(),
            message: "y".into(),
        });
        assert_eq!(w.audience(), Audience::Hosts);
        assert_eq!(SessionEvent::Status(status()).audience(), Audience::All);
    }
}
