//! The per-session redaction service.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rapport_core::ids::{DetectionId, UserId, UtteranceId};
use rapport_core::pii::{PiiDetection, PiiType, TextVersion};
use tracing::{debug, info};

use crate::errors::RedactionError;
use crate::model::{
    ConsentKind, ConsentRecord, RedactionAction, RedactionDecision, RedactionState,
    RedactionSummary,
};
use crate::substitute::{Span, substitute};

/// Detections, decisions, and consent for one session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RedactionService {
    detections: BTreeMap<DetectionId, PiiDetection>,
    decisions: BTreeMap<DetectionId, RedactionDecision>,
    consents: Vec<ConsentRecord>,
}

impl RedactionService {
    /// Empty service.
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Detections
    // ─────────────────────────────────────────────────────────────────────

    /// Replace every detection. Decisions for detections that are gone are
    /// dropped.
    pub fn set_detections(&mut self, detections: Vec<PiiDetection>) {
        self.detections = detections.into_iter().map(|d| (d.id.clone(), d)).collect();
        self.prune_decisions();
    }

    /// Replace the detections of one utterance, leaving the rest alone.
    pub fn set_detections_for_utterance(
        &mut self,
        utterance_id: &UtteranceId,
        detections: Vec<PiiDetection>,
    ) {
        self.detections.retain(|_, d| &d.utterance_id != utterance_id);
        for d in detections {
            if &d.utterance_id == utterance_id {
                let _ = self.detections.insert(d.id.clone(), d);
            }
        }
        self.prune_decisions();
    }

    /// Add detections. Existing IDs are left untouched. Returns how many
    /// were new.
    pub fn add_detections(&mut self, detections: impl IntoIterator<Item = PiiDetection>) -> usize {
        let mut added = 0;
        for d in detections {
            if !self.detections.contains_key(&d.id) {
                let _ = self.detections.insert(d.id.clone(), d);
                added += 1;
            }
        }
        added
    }

    fn prune_decisions(&mut self) {
        let detections = &self.detections;
        self.decisions.retain(|id, _| detections.contains_key(id));
    }

    /// One detection.
    pub fn detection(&self, id: &DetectionId) -> Option<&PiiDetection> {
        self.detections.get(id)
    }

    /// Detections of one utterance, by start offset.
    pub fn detections_for(&self, utterance_id: &UtteranceId) -> Vec<&PiiDetection> {
        let mut out: Vec<_> = self
            .detections
            .values()
            .filter(|d| &d.utterance_id == utterance_id)
            .collect();
        out.sort_by_key(|d| (d.start, d.end));
        out
    }

    /// Every detection, by ID.
    pub fn detections(&self) -> impl Iterator<Item = &PiiDetection> {
        self.detections.values()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────

    /// Record a decision, replacing any earlier one.
    pub fn apply_redaction(
        &mut self,
        action: RedactionAction,
        detection_id: &DetectionId,
        replacement: Option<String>,
        decided_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<&RedactionDecision, RedactionError> {
        if !self.detections.contains_key(detection_id) {
            return Err(RedactionError::UnknownDetection(detection_id.clone()));
        }
        let replacement = match action {
            RedactionAction::Replace => match replacement {
                Some(r) if r.trim().is_empty() => return Err(RedactionError::EmptyReplacement),
                other => other,
            },
            _ => None,
        };

        debug!(detection_id = %detection_id, action = action.as_str(), "redaction decision");
        let decision = RedactionDecision {
            detection_id: detection_id.clone(),
            action,
            replacement,
            decided_by,
            decided_at: now,
        };
        let _ = self.decisions.insert(detection_id.clone(), decision);
        self.decisions
            .get(detection_id)
            .ok_or_else(|| RedactionError::UnknownDetection(detection_id.clone()))
    }

    /// Active decision for a detection.
    pub fn decision(&self, id: &DetectionId) -> Option<&RedactionDecision> {
        self.decisions.get(id)
    }

    fn is_undecided(&self, id: &DetectionId) -> bool {
        self.decisions
            .get(id)
            .is_none_or(|d| d.action == RedactionAction::Pending)
    }

    /// Redact every undecided detection of `pii_type`. Never overwrites a
    /// decision. Returns the detections newly redacted.
    pub fn batch_redact(
        &mut self,
        pii_type: PiiType,
        decided_by: &UserId,
        now: DateTime<Utc>,
    ) -> Vec<DetectionId> {
        let targets: Vec<DetectionId> = self
            .detections
            .values()
            .filter(|d| d.pii_type == pii_type && self.is_undecided(&d.id))
            .map(|d| d.id.clone())
            .collect();
        for id in &targets {
            let _ = self.decisions.insert(
                id.clone(),
                RedactionDecision {
                    detection_id: id.clone(),
                    action: RedactionAction::Redact,
                    replacement: None,
                    decided_by: decided_by.clone(),
                    decided_at: now,
                },
            );
        }
        info!(pii_type = %pii_type, count = targets.len(), "batch redaction");
        targets
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────

    /// Render `text` with this utterance's decisions applied.
    ///
    /// Only decisions whose detection was stamped with this exact text
    /// version apply; offsets that do not fit the text are skipped.
    pub fn apply_redactions_to_text(&self, text: &str, utterance_id: &UtteranceId) -> String {
        let version = TextVersion::of(text);
        let spans: Vec<Span<'_>> = self
            .detections
            .values()
            .filter(|d| &d.utterance_id == utterance_id && d.text_version == version)
            .filter_map(|d| {
                let replacement = self.decisions.get(&d.id)?.substitution(d.pii_type)?;
                Some(Span {
                    start: d.start,
                    end: d.end,
                    replacement,
                })
            })
            .collect();
        if spans.is_empty() {
            return text.to_string();
        }
        substitute(text, spans)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Consent
    // ─────────────────────────────────────────────────────────────────────

    /// Record a consent answer.
    pub fn record_consent(
        &mut self,
        subject: impl Into<String>,
        kind: ConsentKind,
        granted: bool,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> &ConsentRecord {
        self.consents.push(ConsentRecord {
            subject: subject.into(),
            kind,
            granted,
            recorded_by,
            recorded_at: now,
        });
        let idx = self.consents.len() - 1;
        &self.consents[idx]
    }

    /// Consent records in recording order.
    pub fn consents(&self) -> &[ConsentRecord] {
        &self.consents
    }

    /// Counts by decision and type.
    pub fn summary(&self) -> RedactionSummary {
        let mut s = RedactionSummary {
            total: self.detections.len(),
            ..RedactionSummary::default()
        };
        for d in self.detections.values() {
            *s.by_type.entry(d.pii_type).or_insert(0) += 1;
            match self.decisions.get(&d.id).map(|x| x.action) {
                None | Some(RedactionAction::Pending) => s.pending += 1,
                Some(RedactionAction::Keep) => s.kept += 1,
                Some(RedactionAction::Redact) => s.redacted += 1,
                Some(RedactionAction::Replace) => s.replaced += 1,
            }
        }
        for c in &self.consents {
            let _ = s.consent.insert(c.kind, c.granted);
        }
        s
    }

    // ─────────────────────────────────────────────────────────────────────
    // Export / import
    // ─────────────────────────────────────────────────────────────────────

    /// Lossless snapshot.
    pub fn export_state(&self) -> RedactionState {
        RedactionState {
            detections: self.detections.values().cloned().collect(),
            decisions: self.decisions.values().cloned().collect(),
            consents: self.consents.clone(),
        }
    }

    /// Rebuild from a snapshot. Fails on duplicate detections or decisions
    /// that reference a detection the snapshot does not contain.
    pub fn import_state(state: RedactionState) -> Result<Self, RedactionError> {
        let mut seen = HashSet::new();
        for d in &state.detections {
            if !seen.insert(d.id.clone()) {
                return Err(RedactionError::DuplicateDetection(d.id.clone()));
            }
        }
        if let Some(dangling) = state
            .decisions
            .iter()
            .find(|d| !seen.contains(&d.detection_id))
        {
            return Err(RedactionError::DanglingDecision(dangling.detection_id.clone()));
        }

        Ok(Self {
            detections: state
                .detections
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
            decisions: state
                .decisions
                .into_iter()
                .map(|d| (d.detection_id.clone(), d))
                .collect(),
            consents: state.consents,
        })
    }
}
