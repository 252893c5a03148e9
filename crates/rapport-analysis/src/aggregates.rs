//! Rolling per-session aggregates: talk time and the emotional arc.

use rapport_core::ids::UtteranceId;
use rapport_core::transcript::{Speaker, Utterance};
use serde::{Deserialize, Serialize};

use crate::sentiment::EmotionalShift;

/// Mean difference between first and last third that counts as a trend.
const TREND_DELTA: f64 = 0.15;

// ─────────────────────────────────────────────────────────────────────────────
// Talk time
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulated speaking time per speaker, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkTimeAggregate {
    /// Interviewer seconds.
    pub interviewer_secs: f64,
    /// Participant seconds.
    pub participant_secs: f64,
}

/// Talk-time shares. Both zero until anyone has spoken.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkTimeRatios {
    /// Interviewer share.
    pub interviewer: f64,
    /// Participant share.
    pub participant: f64,
    /// Total seconds.
    pub total_secs: f64,
}

impl TalkTimeAggregate {
    /// Add `secs` for `speaker`. Negative and non-finite durations are ignored.
    pub fn add(&mut self, speaker: Speaker, secs: f64) {
        if !secs.is_finite() || secs <= 0.0 {
            return;
        }
        match speaker {
            Speaker::Interviewer => self.interviewer_secs += secs,
            Speaker::Participant => self.participant_secs += secs,
        }
    }

    /// Total seconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.interviewer_secs + self.participant_secs
    }

    /// Shares summing to 1 when total > 0, both 0 otherwise.
    #[must_use]
    pub fn ratios(&self) -> TalkTimeRatios {
        let total = self.total();
        if total <= 0.0 {
            return TalkTimeRatios {
                interviewer: 0.0,
                participant: 0.0,
                total_secs: 0.0,
            };
        }
        let interviewer = self.interviewer_secs / total;
        TalkTimeRatios {
            interviewer,
            participant: 1.0 - interviewer,
            total_secs: total,
        }
    }
}

/// Speaking duration of an utterance: `end - start` when the end is known and
/// not before the start, otherwise estimated from word count.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn utterance_duration(utterance: &Utterance, seconds_per_word: f64) -> f64 {
    match utterance.end_time {
        Some(end) if end >= utterance.start_time => end - utterance.start_time,
        _ => utterance.word_count() as f64 * seconds_per_word,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emotional arc
// ─────────────────────────────────────────────────────────────────────────────

/// One scored utterance on the arc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcPoint {
    /// Utterance scored.
    pub utterance_id: UtteranceId,
    /// Speaker.
    pub speaker: Speaker,
    /// Session-relative seconds.
    pub time: f64,
    /// Sentiment score.
    pub score: f64,
}

/// Overall direction of the arc.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcTrend {
    /// Later utterances are more positive.
    Improving,
    /// Later utterances are more negative.
    Declining,
    /// No clear movement.
    Stable,
}

/// Summary statistics for the arc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcSummary {
    /// Mean score.
    pub average: f64,
    /// Lowest score.
    pub min: f64,
    /// Highest score.
    pub max: f64,
    /// Direction.
    pub trend: ArcTrend,
    /// Number of shifts.
    pub shift_count: usize,
}

/// Sentiment over the course of a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalArc {
    /// Scored utterances in arrival order.
    pub points: Vec<ArcPoint>,
    /// Detected shifts.
    pub shifts: Vec<EmotionalShift>,
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = scores.len() as f64;
    scores.iter().sum::<f64>() / n
}

impl EmotionalArc {
    /// Append a point.
    pub fn push(&mut self, point: ArcPoint) {
        self.points.push(point);
    }

    /// Record a shift.
    pub fn push_shift(&mut self, shift: EmotionalShift) {
        self.shifts.push(shift);
    }

    /// Summary for one speaker, or all speakers when `None`.
    #[must_use]
    pub fn summary(&self, speaker: Option<Speaker>) -> ArcSummary {
        let scores: Vec<f64> = self
            .points
            .iter()
            .filter(|p| speaker.is_none_or(|s| p.speaker == s))
            .map(|p| p.score)
            .collect();

        let trend = if scores.len() < 3 {
            ArcTrend::Stable
        } else {
            let third = scores.len() / 3;
            let delta = mean(&scores[scores.len() - third..]) - mean(&scores[..third]);
            if delta > TREND_DELTA {
                ArcTrend::Improving
            } else if delta < -TREND_DELTA {
                ArcTrend::Declining
            } else {
                ArcTrend::Stable
            }
        };

        let (min, max) = if scores.is_empty() {
            (0.0, 0.0)
        } else {
            (
                scores.iter().copied().fold(f64::INFINITY, f64::min),
                scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };

        ArcSummary {
            average: mean(&scores),
            min,
            max,
            trend,
            shift_count: self
                .shifts
                .iter()
                .filter(|s| speaker.is_none_or(|sp| s.speaker == sp))
                .count(),
        }
    }
}
