//! Decisions, consent, and the exported state shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rapport_core::ids::{DetectionId, UserId};
use rapport_core::pii::{PiiDetection, PiiType};
use serde::{Deserialize, Serialize};

/// What to do with a detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionAction {
    /// Undecided.
    #[default]
    Pending,
    /// Leave the original text.
    Keep,
    /// Substitute the canonical label.
    Redact,
    /// Substitute caller text, or the label when none was given.
    Replace,
}

impl RedactionAction {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Keep => "keep",
            Self::Redact => "redact",
            Self::Replace => "replace",
        }
    }
}

/// The active decision for one detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionDecision {
    /// Detection decided.
    pub detection_id: DetectionId,
    /// Action.
    pub action: RedactionAction,
    /// Replacement text for `replace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    /// Who decided.
    pub decided_by: UserId,
    /// When.
    pub decided_at: DateTime<Utc>,
}

impl RedactionDecision {
    /// Text to substitute for `pii_type`, or `None` when the span stays.
    #[must_use]
    pub fn substitution(&self, pii_type: PiiType) -> Option<&str> {
        match self.action {
            RedactionAction::Pending | RedactionAction::Keep => None,
            RedactionAction::Redact => Some(pii_type.label()),
            RedactionAction::Replace => Some(self.replacement.as_deref().unwrap_or(pii_type.label())),
        }
    }
}

/// Consent categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentKind {
    /// Audio/video recording.
    Recording,
    /// Sharing the transcript with stakeholders.
    TranscriptSharing,
    /// Quoting the participant in reports.
    QuoteUsage,
}

/// A recorded consent answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    /// Who consented, usually the participant.
    pub subject: String,
    /// What for.
    pub kind: ConsentKind,
    /// Granted or refused.
    pub granted: bool,
    /// Who recorded it.
    pub recorded_by: UserId,
    /// When.
    pub recorded_at: DateTime<Utc>,
}

/// Lossless snapshot of a [`RedactionService`](crate::RedactionService).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionState {
    /// Detections ordered by ID.
    pub detections: Vec<PiiDetection>,
    /// Decisions ordered by detection ID.
    pub decisions: Vec<RedactionDecision>,
    /// Consent records in recording order.
    pub consents: Vec<ConsentRecord>,
}

/// Counts for review screens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionSummary {
    /// All detections.
    pub total: usize,
    /// Without a decision, or explicitly pending.
    pub pending: usize,
    /// Kept.
    pub kept: usize,
    /// Redacted.
    pub redacted: usize,
    /// Replaced.
    pub replaced: usize,
    /// Detections per type.
    pub by_type: BTreeMap<PiiType, usize>,
    /// Latest answer per consent kind for any subject.
    pub consent: BTreeMap<ConsentKind, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(action: RedactionAction, replacement: Option<&str>) -> RedactionDecision {
        RedactionDecision {
            detection_id: DetectionId::new(),
            action,
            replacement: replacement.map(str::to_string),
            decided_by: UserId::from_raw("user_host"),
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn substitution_per_action() {
        assert_eq!(decision(RedactionAction::Pending, None).substitution(PiiType::Email), None);
        assert_eq!(decision(RedactionAction::Keep, None).substitution(PiiType::Email), None);
        assert_eq!(
            decision(RedactionAction::Redact, Some("ignored")).substitution(PiiType::Phone),
            Some("[PHONE]")
        );
        assert_eq!(
            decision(RedactionAction::Replace, Some("Jane")).substitution(PiiType::PersonName),
            Some("Jane")
        );
        assert_eq!(
            decision(RedactionAction::Replace, None).substitution(PiiType::PersonName),
            Some("[NAME]")
        );
    }

    #[test]
    fn action_wire_names() {
        for a in [
            RedactionAction::Pending,
            RedactionAction::Keep,
            RedactionAction::Redact,
            RedactionAction::Replace,
        ] {
            assert_eq!(serde_json::to_string(&a).unwrap(), format!("\"{}\"", a.as_str()));
        }
    }
}
