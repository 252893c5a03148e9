//! The coaching gate.
//!
//! A candidate is displayed iff coaching is enabled, its confidence clears
//! the effective threshold for its type, and no prompt of the same type was
//! displayed within that type's cooldown. Suppressed candidates leave the
//! cooldown clock alone. Responses are single transitions; snoozing is final
//! for the session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rapport_core::clock::duration_secs;
use rapport_core::coaching::{CoachingPromptEvent, PromptResponse, PromptType};
use rapport_core::ids::PromptEventId;
use rapport_settings::{CoachingSettings, CulturalContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::CoachingError;
use crate::policy::{DeliveryPolicy, ThresholdsPolicy};
use crate::signals::PromptCandidate;

/// Why a candidate was not displayed.
#[derive(Clone, Debug, PartialEq)]
pub enum SuppressReason {
    /// Coaching is switched off.
    Disabled,
    /// Confidence under the effective threshold.
    BelowThreshold {
        /// Candidate confidence.
        confidence: f64,
        /// Effective threshold.
        threshold: f64,
    },
    /// Same type displayed too recently.
    Cooldown {
        /// Seconds until the type may display again.
        remaining_secs: f64,
    },
}

/// Result of evaluating one candidate.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    /// Displayed; the new event.
    Displayed(CoachingPromptEvent),
    /// Not displayed.
    Suppressed {
        /// Candidate type.
        prompt_type: PromptType,
        /// Why.
        reason: SuppressReason,
    },
}

/// Response counts for the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingStats {
    /// Prompts displayed.
    pub displayed: u32,
    /// Accepted.
    pub accepted: u32,
    /// Dismissed.
    pub dismissed: u32,
    /// Snoozed, manual or automatic.
    pub snoozed: u32,
    /// Snoozed by the auto-dismiss timer.
    pub auto_snoozed: u32,
    /// Still unanswered.
    pub pending: u32,
}

/// Per-session coaching state.
#[derive(Debug)]
pub struct CoachingEngine {
    enabled: bool,
    thresholds: ThresholdsPolicy,
    delivery: DeliveryPolicy,
    last_displayed: HashMap<PromptType, DateTime<Utc>>,
    prompts: Vec<CoachingPromptEvent>,
}

impl CoachingEngine {
    /// Engine with explicit policies.
    pub fn new(thresholds: ThresholdsPolicy, delivery: DeliveryPolicy) -> Self {
        Self {
            enabled: true,
            thresholds,
            delivery,
            last_displayed: HashMap::new(),
            prompts: Vec::new(),
        }
    }

    /// Engine from settings.
    pub fn from_settings(settings: &CoachingSettings, cultural_context: CulturalContext) -> Self {
        let mut engine = Self::new(
            ThresholdsPolicy::from_settings(settings, cultural_context),
            DeliveryPolicy::from(settings),
        );
        engine.enabled = settings.enabled;
        engine
    }

    /// Switch coaching on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Delivery policy.
    pub fn delivery(&self) -> &DeliveryPolicy {
        &self.delivery
    }

    /// Thresholds policy.
    pub fn thresholds(&self) -> &ThresholdsPolicy {
        &self.thresholds
    }

    /// Gate one candidate at `now`.
    pub fn evaluate(&mut self, candidate: PromptCandidate, now: DateTime<Utc>) -> Evaluation {
        let prompt_type = candidate.prompt_type;
        if !self.enabled {
            return Evaluation::Suppressed {
                prompt_type,
                reason: SuppressReason::Disabled,
            };
        }

        let threshold = self.thresholds.threshold(prompt_type);
        if candidate.confidence < threshold {
            return Evaluation::Suppressed {
                prompt_type,
                reason: SuppressReason::BelowThreshold {
                    confidence: candidate.confidence,
                    threshold,
                },
            };
        }

        if let (Some(cooldown), Some(last)) = (
            self.thresholds.cooldown(prompt_type),
            self.last_displayed.get(&prompt_type),
        ) {
            let since = now - *last;
            if since < cooldown {
                let remaining_secs = duration_secs(cooldown - since);
                debug!(prompt_type = %prompt_type, remaining_secs, "prompt in cooldown");
                return Evaluation::Suppressed {
                    prompt_type,
                    reason: SuppressReason::Cooldown { remaining_secs },
                };
            }
        }

        let cultural_context = (self.thresholds.adjustment(prompt_type).abs() > f64::EPSILON)
            .then(|| self.thresholds.cultural_context().as_str().to_string());
        let event = CoachingPromptEvent {
            id: PromptEventId::new(),
            prompt_type,
            text: candidate.text,
            confidence: candidate.confidence,
            displayed_at: now,
            response: None,
            responded_at: None,
            auto_responded: false,
            cultural_context,
        };
        let _ = self.last_displayed.insert(prompt_type, now);
        self.prompts.push(event.clone());
        info!(
            prompt_id = %event.id,
            prompt_type = %prompt_type,
            confidence = event.confidence,
            "coaching prompt displayed"
        );
        Evaluation::Displayed(event)
    }

    /// Gate every candidate independently; returns the displayed events.
    pub fn evaluate_all(
        &mut self,
        candidates: impl IntoIterator<Item = PromptCandidate>,
        now: DateTime<Utc>,
    ) -> Vec<CoachingPromptEvent> {
        candidates
            .into_iter()
            .filter_map(|c| match self.evaluate(c, now) {
                Evaluation::Displayed(e) => Some(e),
                Evaluation::Suppressed { .. } => None,
            })
            .collect()
    }

    fn record(
        &mut self,
        id: &PromptEventId,
        response: PromptResponse,
        now: DateTime<Utc>,
        auto: bool,
    ) -> Result<&CoachingPromptEvent, CoachingError> {
        let event = self
            .prompts
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| CoachingError::UnknownPrompt(id.clone()))?;
        if let Some(existing) = event.response {
            return Err(CoachingError::AlreadyResponded {
                id: id.clone(),
                existing,
            });
        }
        event.response = Some(response);
        event.responded_at = Some(now);
        event.auto_responded = auto;
        Ok(event)
    }

    /// Record the moderator's response. A second response is rejected.
    pub fn respond(
        &mut self,
        id: &PromptEventId,
        response: PromptResponse,
        now: DateTime<Utc>,
    ) -> Result<&CoachingPromptEvent, CoachingError> {
        self.record(id, response, now, false)
    }

    /// Auto-snooze an unanswered prompt. Returns `None` when the prompt is
    /// unknown or already answered.
    pub fn auto_dismiss(
        &mut self,
        id: &PromptEventId,
        now: DateTime<Utc>,
    ) -> Option<CoachingPromptEvent> {
        self.record(id, PromptResponse::Snoozed, now, true).ok().cloned()
    }

    /// A displayed prompt.
    pub fn prompt(&self, id: &PromptEventId) -> Option<&CoachingPromptEvent> {
        self.prompts.iter().find(|p| &p.id == id)
    }

    /// All displayed prompts in display order.
    pub fn prompts(&self) -> &[CoachingPromptEvent] {
        &self.prompts
    }

    /// When `prompt_type` was last displayed.
    pub fn last_displayed(&self, prompt_type: PromptType) -> Option<DateTime<Utc>> {
        self.last_displayed.get(&prompt_type).copied()
    }

    /// Response counts.
    pub fn stats(&self) -> CoachingStats {
        let mut s = CoachingStats::default();
        for p in &self.prompts {
            s.displayed += 1;
            match p.response {
                None => s.pending += 1,
                Some(PromptResponse::Accepted) => s.accepted += 1,
                Some(PromptResponse::Dismissed) => s.dismissed += 1,
                Some(PromptResponse::Snoozed) => {
                    s.snoozed += 1;
                    if p.auto_responded {
                        s.auto_snoozed += 1;
                    }
                }
            }
        }
        s
    }
}

impl Default for CoachingEngine {
    fn default() -> Self {
        Self::new(ThresholdsPolicy::default(), DeliveryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn bias(confidence: f64) -> PromptCandidate {
        PromptCandidate::new(PromptType::BiasAlert, confidence, "Rephrase neutrally")
    }

    fn engine() -> CoachingEngine {
        CoachingEngine::new(ThresholdsPolicy::uniform(0.6, 60.0), DeliveryPolicy::default())
    }

    #[test]
    fn bias_cooldown_scenario() {
        let mut e = engine();
        assert_matches!(e.evaluate(bias(0.9), t(0)), Evaluation::Displayed(_));
        assert_matches!(
            e.evaluate(bias(0.95), t(30)),
            Evaluation::Suppressed {
                reason: SuppressReason::Cooldown { remaining_secs },
                ..
            } if (remaining_secs - 30.0).abs() < 1e-9
        );
        assert_matches!(e.evaluate(bias(0.9), t(65)), Evaluation::Displayed(_));
        assert_eq!(e.prompts().len(), 2);
        assert_eq!(e.last_displayed(PromptType::BiasAlert), Some(t(65)));
    }

    #[test]
    fn below_threshold_suppressed_without_touching_cooldown() {
        let mut e = engine();
        assert_matches!(
            e.evaluate(bias(0.5), t(0)),
            Evaluation::Suppressed {
                reason: SuppressReason::BelowThreshold { .. },
                ..
            }
        );
        assert_eq!(e.last_displayed(PromptType::BiasAlert), None);
        assert_matches!(e.evaluate(bias(0.7), t(1)), Evaluation::Displayed(_));
    }

    #[test]
    fn cooldown_is_per_type() {
        let mut e = engine();
        let shown = e.evaluate_all(
            [
                bias(0.9),
                PromptCandidate::new(PromptType::LeadingQuestion, 0.85, "Ask neutrally"),
            ],
            t(0),
        );
        assert_eq!(shown.len(), 2);
    }

    #[test]
    fn burst_within_cooldown_displays_once() {
        let mut e = engine();
        let shown: usize = (0..10)
            .map(|i| e.evaluate_all([bias(0.9)], t(i * 5)).len())
            .sum();
        assert_eq!(shown, 1);
    }

    #[test]
    fn zero_cooldown_never_throttles() {
        let mut e = CoachingEngine::new(ThresholdsPolicy::uniform(0.6, 0.0), DeliveryPolicy::default());
        for i in 0..5 {
            assert_matches!(e.evaluate(bias(0.9), t(i)), Evaluation::Displayed(_));
        }
    }

    #[test]
    fn disabled_engine_shows_nothing() {
        let mut e = engine();
        e.set_enabled(false);
        assert_matches!(
            e.evaluate(bias(0.99), t(0)),
            Evaluation::Suppressed {
                reason: SuppressReason::Disabled,
                ..
            }
        );
    }

    #[test]
    fn single_response_transition() {
        let mut e = engine();
        let Evaluation::Displayed(event) = e.evaluate(bias(0.9), t(0)) else {
            panic!("expected display");
        };
        let r = e.respond(&event.id, PromptResponse::Accepted, t(5)).unwrap();
        assert_eq!(r.response, Some(PromptResponse::Accepted));
        assert_eq!(r.responded_at, Some(t(5)));
        assert_matches!(
            e.respond(&event.id, PromptResponse::Dismissed, t(6)),
            Err(CoachingError::AlreadyResponded {
                existing: PromptResponse::Accepted,
                ..
            })
        );
    }

    #[test]
    fn snooze_does_not_reset_cooldown_or_resurface() {
        let mut e = engine();
        let Evaluation::Displayed(event) = e.evaluate(bias(0.9), t(0)) else {
            panic!("expected display");
        };
        let _ = e.respond(&event.id, PromptResponse::Snoozed, t(10)).unwrap();
        assert_eq!(e.last_displayed(PromptType::BiasAlert), Some(t(0)));
        assert_matches!(e.evaluate(bias(0.9), t(30)), Evaluation::Suppressed { .. });
        assert!(e.auto_dismiss(&event.id, t(40)).is_none());
    }

    #[test]
    fn auto_dismiss_snoozes_unanswered() {
        let mut e = engine();
        let Evaluation::Displayed(event) = e.evaluate(bias(0.9), t(0)) else {
            panic!("expected display");
        };
        let snoozed = e.auto_dismiss(&event.id, t(30)).unwrap();
        assert_eq!(snoozed.response, Some(PromptResponse::Snoozed));
        assert!(snoozed.auto_responded);
        assert_matches!(
            e.respond(&event.id, PromptResponse::Accepted, t(31)),
            Err(CoachingError::AlreadyResponded { .. })
        );
        let stats = e.stats();
        assert_eq!(stats.displayed, 1);
        assert_eq!(stats.auto_snoozed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn unknown_prompt_rejected() {
        let mut e = engine();
        assert_matches!(
            e.respond(&PromptEventId::from_raw("cpe_nope"), PromptResponse::Accepted, t(0)),
            Err(CoachingError::UnknownPrompt(_))
        );
    }

    #[test]
    fn cultural_context_annotates_influenced_prompts() {
        let mut e = CoachingEngine::new(
            ThresholdsPolicy::uniform(0.6, 60.0).with_cultural_context(CulturalContext::HighContext),
            DeliveryPolicy::default(),
        );
        let shown = e.evaluate_all(
            [
                PromptCandidate::new(PromptType::SentimentDip, 0.55, "dip"),
                bias(0.9),
            ],
            t(0),
        );
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].cultural_context.as_deref(), Some("high_context"));
        assert_eq!(shown[1].cultural_context, None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn displayed_prompts_of_a_type_are_spaced_by_cooldown(
                mut offsets in proptest::collection::vec(0i64..1_000, 1..50),
                cooldown in 1i64..200,
            ) {
                offsets.sort_unstable();
                #[allow(clippy::cast_precision_loss)]
                let mut e = CoachingEngine::new(
                    ThresholdsPolicy::uniform(0.5, cooldown as f64),
                    DeliveryPolicy::default(),
                );
                for o in &offsets {
                    let _ = e.evaluate(bias(0.9), t(*o));
                }
                let shown: Vec<_> = e.prompts().iter().map(|p| p.displayed_at).collect();
                prop_assert!(!shown.is_empty());
                for pair in shown.windows(2) {
                    prop_assert!(pair[1] - pair[0] >= Duration::seconds(cooldown));
                }
            }
        }
    }
}
