//! Per-session analyzer pipeline.
//!
//! Runs the four analyzers on each utterance, isolating failures, then folds
//! the results into rolling aggregates (talk time, emotional arc, question
//! statistics). One pipeline per session; utterances are processed in order.

use std::time::{Duration, Instant};

use rapport_core::ids::UtteranceId;
use rapport_core::pii::PiiDetection;
use rapport_core::topics::TopicStatus;
use rapport_core::transcript::{Speaker, Utterance};
use rapport_settings::AnalysisSettings;
use serde::{Deserialize, Serialize};

use crate::aggregates::{
    ArcPoint, ArcSummary, EmotionalArc, TalkTimeAggregate, TalkTimeRatios, utterance_duration,
};
use crate::analyzer::{AnalyzerFailure, AnalyzerKind, RuleBasedAnalyzers, UtteranceAnalyzers, run_guarded};
use crate::bias::BiasAlert;
use crate::question::{QuestionAnalysis, QuestionStats};
use crate::sentiment::{self, EmotionalShift, SentimentResult};
use crate::topics;

/// Pipeline tuning derived from [`AnalysisSettings`].
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Score change that counts as an emotional shift.
    pub shift_threshold: f64,
    /// Per-analyzer time budget.
    pub budget: Duration,
    /// Duration estimate for utterances without an end time.
    pub seconds_per_word: f64,
}

impl From<&AnalysisSettings> for PipelineConfig {
    fn from(s: &AnalysisSettings) -> Self {
        Self {
            shift_threshold: s.emotional_shift_threshold,
            budget: Duration::from_millis(s.analyzer_budget_ms),
            seconds_per_word: s.seconds_per_word,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AnalysisSettings::default())
    }
}

/// Everything learned from one utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceAnalysis {
    /// Utterance analyzed.
    pub utterance_id: UtteranceId,
    /// Who spoke.
    pub speaker: Speaker,
    /// Sentiment, absent when the analyzer failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentResult>,
    /// Shift against the speaker's previous score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<EmotionalShift>,
    /// Bias findings.
    pub bias_alerts: Vec<BiasAlert>,
    /// Question classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionAnalysis>,
    /// PII spans.
    pub pii: Vec<PiiDetection>,
    /// Analyzers that contributed nothing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AnalyzerFailure>,
    /// Talk-time ratios after this utterance.
    pub talk_time: TalkTimeRatios,
    /// Topics this utterance newly covers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub newly_covered_topics: Vec<String>,
}

impl UtteranceAnalysis {
    /// Copy annotation fields onto the utterance.
    pub fn annotate(&self, utterance: &mut Utterance) {
        if let Some(s) = &self.sentiment {
            utterance.sentiment_score = Some(s.score);
            utterance.polarity = Some(s.polarity);
        }
        if let Some(q) = &self.question {
            utterance.question_type = Some(q.question_type);
        }
    }

    /// Whether `kind` failed on this utterance.
    #[must_use]
    pub fn failed(&self, kind: AnalyzerKind) -> bool {
        self.failures.iter().any(|f| f.analyzer == kind)
    }
}

/// Point-in-time view of the rolling aggregates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    /// Talk-time ratios.
    pub talk_time: TalkTimeRatios,
    /// Arc across both speakers.
    pub arc: ArcSummary,
    /// Participant-only arc.
    pub participant_arc: ArcSummary,
    /// Question statistics.
    pub questions: QuestionStats,
    /// Utterances processed.
    pub processed: u64,
}

/// Analyzer orchestration plus rolling aggregates for one session.
pub struct AnalyzerPipeline<A: UtteranceAnalyzers = RuleBasedAnalyzers> {
    analyzers: A,
    config: PipelineConfig,
    talk_time: TalkTimeAggregate,
    arc: EmotionalArc,
    questions: QuestionStats,
    last_interviewer: Option<f64>,
    last_participant: Option<f64>,
    processed: u64,
}

impl AnalyzerPipeline<RuleBasedAnalyzers> {
    /// Pipeline with the built-in analyzers.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_analyzers(RuleBasedAnalyzers, config)
    }
}

impl<A: UtteranceAnalyzers> AnalyzerPipeline<A> {
    /// Pipeline over a custom analyzer set.
    pub fn with_analyzers(analyzers: A, config: PipelineConfig) -> Self {
        Self {
            analyzers,
            config,
            talk_time: TalkTimeAggregate::default(),
            arc: EmotionalArc::default(),
            questions: QuestionStats::default(),
            last_interviewer: None,
            last_participant: None,
            processed: 0,
        }
    }

    fn last_score_mut(&mut self, speaker: Speaker) -> &mut Option<f64> {
        match speaker {
            Speaker::Interviewer => &mut self.last_interviewer,
            Speaker::Participant => &mut self.last_participant,
        }
    }

    /// Analyze one utterance and fold it into the aggregates.
    ///
    /// A failing analyzer contributes nothing; the rest still run. A failed
    /// sentiment leaves the speaker's previous score in place so the next
    /// shift is measured against the last known value.
    pub fn process(&mut self, utterance: &Utterance, topics: &[TopicStatus]) -> UtteranceAnalysis {
        let started = Instant::now();
        let budget = self.config.budget;
        let mut failures = Vec::new();

        let pii = run_guarded(AnalyzerKind::Pii, budget, || self.analyzers.pii(utterance))
            .unwrap_or_else(|f| {
                failures.push(f);
                Vec::new()
            });
        let sentiment = run_guarded(AnalyzerKind::Sentiment, budget, || {
            self.analyzers.sentiment(utterance)
        })
        .map_err(|f| failures.push(f))
        .ok();
        let bias_alerts = run_guarded(AnalyzerKind::Bias, budget, || self.analyzers.bias(utterance))
            .unwrap_or_else(|f| {
                failures.push(f);
                Vec::new()
            });
        let question = run_guarded(AnalyzerKind::QuestionType, budget, || {
            self.analyzers.question(utterance)
        })
        .unwrap_or_else(|f| {
            failures.push(f);
            None
        });

        let duration = utterance_duration(utterance, self.config.seconds_per_word);
        self.talk_time.add(utterance.speaker, duration);

        let mut shift = None;
        if let Some(s) = &sentiment {
            let threshold = self.config.shift_threshold;
            let last = self.last_score_mut(utterance.speaker);
            if let Some(previous) = *last {
                shift = sentiment::detect_shift(
                    &utterance.id,
                    utterance.speaker,
                    previous,
                    s.score,
                    threshold,
                );
            }
            *last = Some(s.score);

            self.arc.push(ArcPoint {
                utterance_id: utterance.id.clone(),
                speaker: utterance.speaker,
                time: utterance.start_time,
                score: s.score,
            });
            if let Some(sh) = &shift {
                self.arc.push_shift(sh.clone());
            }
        }

        if let Some(q) = &question {
            self.questions.record(q);
        }

        let newly_covered_topics = topics::infer_covered(&utterance.text, topics);
        self.processed += 1;

        tracing::debug!(
            utterance_id = %utterance.id,
            speaker = utterance.speaker.as_str(),
            pii = pii.len(),
            bias = bias_alerts.len(),
            failures = failures.len(),
            elapsed_us = started.elapsed().as_micros(),
            "utterance analyzed"
        );

        UtteranceAnalysis {
            utterance_id: utterance.id.clone(),
            speaker: utterance.speaker,
            sentiment,
            shift,
            bias_alerts,
            question,
            pii,
            failures,
            talk_time: self.talk_time.ratios(),
            newly_covered_topics,
        }
    }

    /// Talk-time totals.
    pub fn talk_time(&self) -> &TalkTimeAggregate {
        &self.talk_time
    }

    /// Emotional arc.
    pub fn arc(&self) -> &EmotionalArc {
        &self.arc
    }

    /// Question statistics.
    pub fn question_stats(&self) -> &QuestionStats {
        &self.questions
    }

    /// Utterances processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Pipeline tuning.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current aggregates.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            talk_time: self.talk_time.ratios(),
            arc: self.arc.summary(None),
            participant_arc: self.arc.summary(Some(Speaker::Participant)),
            questions: self.questions.clone(),
            processed: self.processed,
        }
    }
}
