//! Question classification for interviewer speech.
//!
//! Rules are checked in priority order: leading, compound, hypothetical,
//! clarifying, probing, then the opening word decides open vs closed.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use rapport_core::ids::UtteranceId;
use rapport_core::transcript::{QuestionType, Speaker, Utterance};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Severity;

static LEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:don't you|wouldn't you|isn't it|aren't you|didn't you|doesn't it|wouldn't it be|you (?:must|would) (?:agree|feel|think)|surely)\b",
    )
    .unwrap()
});

static COMPOUND_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:and|or) (?:how|what|why|when|where|who|do you|does it|did you|is it|are you|can you|could you|would you)\b",
    )
    .unwrap()
});

static HYPOTHETICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:what if|imagine|suppose|if you could|hypothetically|would you ever|let's say)\b")
        .unwrap()
});

static CLARIFYING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:what do you mean|could you clarify|can you clarify|so you're saying|did you mean|do you mean|when you say)\b",
    )
    .unwrap()
});

static PROBING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:tell me more|can you elaborate|could you elaborate|why do you think|what makes you|can you give (?:me )?an example|how so|what happened next|go on)\b",
    )
    .unwrap()
});

const OPEN_STARTERS: &[&str] = &[
    "how", "what", "why", "where", "when", "who", "which", "describe", "tell", "explain", "walk",
];

const CLOSED_STARTERS: &[&str] = &[
    "do", "does", "did", "is", "are", "was", "were", "can", "could", "will", "would", "have",
    "has", "had", "should", "shall", "may", "am",
];

const FILLERS: &[&str] = &["so", "and", "okay", "ok", "well", "um", "uh", "right", "now", "alright"];

/// A questioning anti-pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiPattern {
    /// Which question type is the problem.
    pub question_type: QuestionType,
    /// How serious.
    pub severity: Severity,
    /// Advice for the moderator.
    pub message: String,
}

/// Classification of one interviewer question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnalysis {
    /// Utterance classified.
    pub utterance_id: UtteranceId,
    /// Question type.
    pub question_type: QuestionType,
    /// Rule confidence.
    pub confidence: f64,
    /// Anti-pattern, if the type is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_pattern: Option<AntiPattern>,
}

/// Anti-pattern attached to a question type.
#[must_use]
pub fn anti_pattern_for(question_type: QuestionType) -> Option<AntiPattern> {
    match question_type {
        QuestionType::Leading => Some(AntiPattern {
            question_type,
            severity: Severity::High,
            message: "Leading question: ask neutrally so the participant can answer in their own words."
                .into(),
        }),
        QuestionType::Compound => Some(AntiPattern {
            question_type,
            severity: Severity::Medium,
            message: "Compound question: ask one thing at a time.".into(),
        }),
        _ => None,
    }
}

fn first_meaningful_word(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .find(|w| !FILLERS.contains(&w.as_str()))
}

/// Classify an utterance. Returns `None` for participant speech and for
/// interviewer speech that is not a question.
pub fn classify(utterance: &Utterance) -> Option<QuestionAnalysis> {
    if utterance.speaker != Speaker::Interviewer {
        return None;
    }
    let text = utterance.text.trim();
    let ends_with_question = text.ends_with('?');
    let first = first_meaningful_word(text);
    let starts_open = first
        .as_deref()
        .is_some_and(|w| OPEN_STARTERS.contains(&w));
    let starts_closed = first
        .as_deref()
        .is_some_and(|w| CLOSED_STARTERS.contains(&w));

    let (question_type, confidence) = if LEADING.is_match(text) {
        (QuestionType::Leading, 0.85)
    } else if text.matches('?').count() >= 2 || (ends_with_question && COMPOUND_JOIN.is_match(text)) {
        (QuestionType::Compound, 0.8)
    } else if HYPOTHETICAL.is_match(text) {
        (QuestionType::Hypothetical, 0.8)
    } else if CLARIFYING.is_match(text) {
        (QuestionType::Clarifying, 0.8)
    } else if PROBING.is_match(text) {
        (QuestionType::Probing, 0.75)
    } else if starts_open {
        (QuestionType::Open, 0.7)
    } else if starts_closed && (ends_with_question || text.len() < 120) {
        (QuestionType::Closed, 0.7)
    } else if ends_with_question {
        (QuestionType::Closed, 0.5)
    } else {
        return None;
    };

    // Statements that merely start with "what"/"how" are not questions
    if question_type == QuestionType::Open
        && !ends_with_question
        && !matches!(first.as_deref(), Some("describe" | "tell" | "explain" | "walk"))
    {
        return None;
    }

    Some(QuestionAnalysis {
        utterance_id: utterance.id.clone(),
        question_type,
        confidence,
        anti_pattern: anti_pattern_for(question_type),
    })
}

/// Running per-session question statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStats {
    /// Count per type.
    pub counts: BTreeMap<QuestionType, u32>,
    /// Total questions.
    pub total: u32,
    /// Questions flagged as anti-patterns.
    pub anti_patterns: u32,
}

impl QuestionStats {
    /// Fold one classification in.
    pub fn record(&mut self, analysis: &QuestionAnalysis) {
        *self.counts.entry(analysis.question_type).or_insert(0) += 1;
        self.total += 1;
        if analysis.anti_pattern.is_some() {
            self.anti_patterns += 1;
        }
    }

    /// Count for one type.
    #[must_use]
    pub fn count(&self, question_type: QuestionType) -> u32 {
        self.counts.get(&question_type).copied().unwrap_or(0)
    }

    /// Share of open questions, 0 when nothing was asked.
    #[must_use]
    pub fn open_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.count(QuestionType::Open)) / f64::from(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qt(text: &str) -> Option<QuestionType> {
        classify(&Utterance::new(Speaker::Interviewer, text, 0.0)).map(|a| a.question_type)
    }

    #[test]
    fn open_question() {
        assert_eq!(qt("How do you usually plan your week?"), Some(QuestionType::Open));
        assert_eq!(qt("Tell me about your last trip"), Some(QuestionType::Open));
    }

    #[test]
    fn closed_question() {
        assert_eq!(qt("Do you use the mobile app?"), Some(QuestionType::Closed));
        assert_eq!(qt("So, did that work for you?"), Some(QuestionType::Closed));
    }

    #[test]
    fn leading_question_is_anti_pattern() {
        let a = classify(&Utterance::new(
            Speaker::Interviewer,
            "Wouldn't you say the old version was slower?",
            0.0,
        ))
        .unwrap();
        assert_eq!(a.question_type, QuestionType::Leading);
        assert_eq!(a.anti_pattern.unwrap().severity, Severity::High);
    }

    #[test]
    fn compound_question() {
        assert_eq!(
            qt("What do you like about it and what would you change?"),
            Some(QuestionType::Compound)
        );
        assert_eq!(
            qt("Where do you shop? How often?"),
            Some(QuestionType::Compound)
        );
    }

    #[test]
    fn hypothetical_clarifying_probing() {
        assert_eq!(
            qt("What if the app could do it for you?"),
            Some(QuestionType::Hypothetical)
        );
        assert_eq!(
            qt("What do you mean by cluttered?"),
            Some(QuestionType::Clarifying)
        );
        assert_eq!(qt("Can you elaborate on that?"), Some(QuestionType::Probing));
    }

    #[test]
    fn statements_are_not_questions() {
        assert_eq!(qt("Thanks, that's really helpful."), None);
        assert_eq!(qt("What a day it has been."), None);
    }

    #[test]
    fn participant_questions_ignored() {
        let u = Utterance::new(Speaker::Participant, "How does this work?", 0.0);
        assert!(classify(&u).is_none());
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = QuestionStats::default();
        for text in [
            "How do you plan?",
            "Why is that?",
            "Don't you think it's better?",
            "Do you like it?",
        ] {
            if let Some(a) = classify(&Utterance::new(Speaker::Interviewer, text, 0.0)) {
                stats.record(&a);
            }
        }
        assert_eq!(stats.total, 4);
        assert_eq!(stats.count(QuestionType::Open), 2);
        assert_eq!(stats.anti_patterns, 1);
        assert!((stats.open_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_ratio_is_zero() {
        assert!(QuestionStats::default().open_ratio().abs() < f64::EPSILON);
    }
}
