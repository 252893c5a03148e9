//! Candidate prompts.
//!
//! A candidate is a prompt type with a confidence and display text. Each
//! signal maps to its own type; an utterance that both leads and carries
//! biased phrasing yields two independent candidates.

use rapport_analysis::UtteranceAnalysis;
use rapport_analysis::aggregates::TalkTimeRatios;
use rapport_analysis::sentiment::ShiftDirection;
use rapport_core::coaching::PromptType;
use rapport_core::ids::UtteranceId;
use rapport_core::transcript::{QuestionType, Speaker};
use rapport_settings::{AnalysisSettings, SessionSettings};
use serde::{Deserialize, Serialize};

/// A prompt the engine may display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCandidate {
    /// Prompt type.
    pub prompt_type: PromptType,
    /// Signal confidence in `[0, 1]`.
    pub confidence: f64,
    /// Text shown to the moderator.
    pub text: String,
    /// Utterance that triggered it, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<UtteranceId>,
}

impl PromptCandidate {
    /// New candidate; confidence is clamped to `[0, 1]`.
    pub fn new(prompt_type: PromptType, confidence: f64, text: impl Into<String>) -> Self {
        Self {
            prompt_type,
            confidence: confidence.clamp(0.0, 1.0),
            text: text.into(),
            utterance_id: None,
        }
    }

    /// Attach the triggering utterance.
    #[must_use]
    pub fn for_utterance(mut self, id: UtteranceId) -> Self {
        self.utterance_id = Some(id);
        self
    }
}

/// Signal cut-offs.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalConfig {
    /// Participant score at or below this is a dip.
    pub sentiment_dip_score: f64,
    /// Interviewer share above this is imbalanced.
    pub talk_time_imbalance_ratio: f64,
    /// Minimum total talk time before imbalance counts.
    pub talk_time_min_secs: f64,
    /// Fraction of the planned duration after which uncovered topics are reminded.
    pub topic_reminder_fraction: f64,
}

impl SignalConfig {
    /// Build from settings.
    #[must_use]
    pub fn new(analysis: &AnalysisSettings, session: &SessionSettings) -> Self {
        Self {
            sentiment_dip_score: analysis.sentiment_dip_score,
            talk_time_imbalance_ratio: analysis.talk_time_imbalance_ratio,
            talk_time_min_secs: analysis.talk_time_min_secs,
            topic_reminder_fraction: session.topic_reminder_fraction,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::new(&AnalysisSettings::default(), &SessionSettings::default())
    }
}

/// Candidates derived from one utterance analysis.
pub fn from_analysis(analysis: &UtteranceAnalysis, config: &SignalConfig) -> Vec<PromptCandidate> {
    let mut out = Vec::new();
    let id = &analysis.utterance_id;

    if let Some(alert) = analysis
        .bias_alerts
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    {
        out.push(
            PromptCandidate::new(PromptType::BiasAlert, alert.confidence, &alert.description)
                .for_utterance(id.clone()),
        );
    }

    if let Some(q) = &analysis.question {
        let prompt_type = match q.question_type {
            QuestionType::Leading => Some(PromptType::LeadingQuestion),
            QuestionType::Compound => Some(PromptType::CompoundQuestion),
            _ => None,
        };
        if let (Some(prompt_type), Some(anti)) = (prompt_type, &q.anti_pattern) {
            out.push(
                PromptCandidate::new(prompt_type, q.confidence, &anti.message)
                    .for_utterance(id.clone()),
            );
        }
    }

    if analysis.speaker == Speaker::Participant {
        if let Some(c) = sentiment_dip(analysis, config) {
            out.push(c);
        }
    }

    if let Some(c) = talk_time_imbalance(&analysis.talk_time, config) {
        out.push(c);
    }

    out
}

fn sentiment_dip(analysis: &UtteranceAnalysis, config: &SignalConfig) -> Option<PromptCandidate> {
    let score = analysis.sentiment.as_ref()?.score;
    let from_score = (score <= config.sentiment_dip_score).then_some(-score);
    let from_shift = analysis
        .shift
        .as_ref()
        .filter(|s| s.direction == ShiftDirection::Down)
        .map(|s| s.delta.abs() / 2.0);
    let confidence = match (from_score, from_shift) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return None,
    };
    Some(
        PromptCandidate::new(
            PromptType::SentimentDip,
            confidence,
            "The participant sounds less positive. Consider acknowledging it or easing off.",
        )
        .for_utterance(analysis.utterance_id.clone()),
    )
}

/// Talk-time imbalance candidate, once enough has been said.
pub fn talk_time_imbalance(ratios: &TalkTimeRatios, config: &SignalConfig) -> Option<PromptCandidate> {
    if ratios.total_secs < config.talk_time_min_secs
        || ratios.interviewer <= config.talk_time_imbalance_ratio
    {
        return None;
    }
    Some(PromptCandidate::new(
        PromptType::TalkTimeBalance,
        ratios.interviewer,
        format!(
            "You've spoken {:.0}% of the time. Let the participant talk more.",
            ratios.interviewer * 100.0
        ),
    ))
}

/// Topic reminder candidate once `elapsed_secs` passes the configured share of
/// `planned_secs` with topics still uncovered.
pub fn topic_reminder(
    elapsed_secs: f64,
    planned_secs: f64,
    uncovered: &[String],
    config: &SignalConfig,
) -> Option<PromptCandidate> {
    if uncovered.is_empty() || planned_secs <= 0.0 {
        return None;
    }
    let progress = elapsed_secs / planned_secs;
    if progress < config.topic_reminder_fraction {
        return None;
    }
    Some(PromptCandidate::new(
        PromptType::TopicReminder,
        progress,
        format!("Topics not yet covered: {}", uncovered.join(", ")),
    ))
}

#[cfg(test)]
mod tests {
    use rapport_analysis::{AnalyzerPipeline, PipelineConfig};
    use rapport_core::transcript::Utterance;

    use super::*;

    fn analyze(texts: &[(Speaker, &str)]) -> UtteranceAnalysis {
        let mut p = AnalyzerPipeline::new(PipelineConfig::default());
        let mut last = None;
        for (i, (speaker, text)) in texts.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let start = i as f64 * 5.0;
            last = Some(p.process(&Utterance::new(*speaker, *text, start), &[]));
        }
        last.unwrap()
    }

    fn types(c: &[PromptCandidate]) -> Vec<PromptType> {
        c.iter().map(|c| c.prompt_type).collect()
    }

    #[test]
    fn leading_question_yields_bias_and_leading_candidates() {
        let a = analyze(&[(Speaker::Interviewer, "Don't you think the new layout is better?")]);
        let c = from_analysis(&a, &SignalConfig::default());
        let t = types(&c);
        assert!(t.contains(&PromptType::BiasAlert));
        assert!(t.contains(&PromptType::LeadingQuestion));
        assert!(c.iter().all(|c| c.utterance_id.as_ref() == Some(&a.utterance_id)));
    }

    #[test]
    fn compound_question_candidate() {
        let a = analyze(&[(Speaker::Interviewer, "Where do you shop and how often do you go?")]);
        assert_eq!(
            types(&from_analysis(&a, &SignalConfig::default())),
            vec![PromptType::CompoundQuestion]
        );
    }

    #[test]
    fn participant_dip() {
        let a = analyze(&[(Speaker::Participant, "Honestly it was awful and frustrating")]);
        let c = from_analysis(&a, &SignalConfig::default());
        assert_eq!(types(&c), vec![PromptType::SentimentDip]);
        assert!(c[0].confidence > 0.6);
    }

    #[test]
    fn neutral_exchange_has_no_candidates() {
        let a = analyze(&[
            (Speaker::Interviewer, "How do you plan your week?"),
            (Speaker::Participant, "Usually on Sunday evening with a notebook"),
        ]);
        assert!(from_analysis(&a, &SignalConfig::default()).is_empty());
    }

    #[test]
    fn talk_time_needs_minimum_total() {
        let config = SignalConfig::default();
        let short = TalkTimeRatios {
            interviewer: 0.9,
            participant: 0.1,
            total_secs: 60.0,
        };
        assert!(talk_time_imbalance(&short, &config).is_none());
        let long = TalkTimeRatios {
            total_secs: 300.0,
            ..short
        };
        let c = talk_time_imbalance(&long, &config).unwrap();
        assert!((c.confidence - 0.9).abs() < 1e-9);
        assert!(c.text.contains("90%"));
    }

    #[test]
    fn topic_reminder_near_end() {
        let config = SignalConfig::default();
        let uncovered = vec!["Pricing".to_string(), "Support".to_string()];
        assert!(topic_reminder(1000.0, 1800.0, &uncovered, &config).is_none());
        let c = topic_reminder(1500.0, 1800.0, &uncovered, &config).unwrap();
        assert_eq!(c.prompt_type, PromptType::TopicReminder);
        assert!(c.text.contains("Pricing, Support"));
        assert!(topic_reminder(1700.0, 1800.0, &[], &config).is_none());
    }
}
