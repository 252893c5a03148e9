//! Lexicon-based sentiment scoring.
//!
//! Each lexicon word carries a valence in `[-3, 3]`. A negator flips (and
//! dampens) the next three tokens; an intensifier boosts the next sentiment
//! word by half. The raw sum is squashed into `[-1, 1]` with
//! `x / sqrt(x² + α)`.

use rapport_core::ids::UtteranceId;
use rapport_core::transcript::{Polarity, Speaker};
use serde::{Deserialize, Serialize};

/// Squash constant for score normalization.
const ALPHA: f64 = 15.0;
/// Multiplier applied to a negated word.
const NEGATION_SCALAR: f64 = -0.74;
/// Tokens after a negator that it affects.
const NEGATION_WINDOW: usize = 3;
/// Multiplier applied after an intensifier.
const INTENSIFIER_SCALAR: f64 = 1.5;
/// Scores within this band of zero are neutral.
const NEUTRAL_BAND: f64 = 0.05;
/// Weaker side / stronger side ratio at which polarity is mixed.
const MIXED_RATIO: f64 = 0.5;

const LEXICON: &[(&str, f64)] = &[
    ("love", 3.0),
    ("loved", 2.9),
    ("excellent", 3.0),
    ("amazing", 2.8),
    ("awesome", 2.8),
    ("fantastic", 2.8),
    ("perfect", 2.8),
    ("great", 2.5),
    ("happy", 2.2),
    ("impressed", 2.2),
    ("excited", 2.2),
    ("enjoy", 2.0),
    ("enjoyed", 2.0),
    ("glad", 2.0),
    ("pleased", 2.0),
    ("good", 1.9),
    ("helpful", 1.8),
    ("intuitive", 1.8),
    ("nice", 1.8),
    ("satisfied", 1.8),
    ("useful", 1.6),
    ("easy", 1.5),
    ("convenient", 1.5),
    ("smooth", 1.2),
    ("clear", 1.0),
    ("fine", 0.8),
    ("worst", -3.0),
    ("awful", -2.8),
    ("horrible", -2.8),
    ("terrible", -2.8),
    ("hate", -2.7),
    ("hated", -2.7),
    ("angry", -2.5),
    ("bad", -2.3),
    ("useless", -2.3),
    ("frustrating", -2.2),
    ("frustrated", -2.2),
    ("disappointed", -2.2),
    ("disappointing", -2.2),
    ("painful", -2.2),
    ("unhappy", -2.2),
    ("annoying", -2.0),
    ("annoyed", -2.0),
    ("broken", -2.0),
    ("stressful", -2.0),
    ("upset", -2.0),
    ("sad", -2.0),
    ("fail", -2.0),
    ("failed", -2.0),
    ("stressed", -1.9),
    ("confusing", -1.8),
    ("crash", -1.8),
    ("crashes", -1.8),
    ("confused", -1.6),
    ("worried", -1.6),
    ("difficult", -1.5),
    ("problem", -1.4),
    ("problems", -1.4),
    ("slow", -1.2),
    ("hard", -1.0),
    ("issue", -1.0),
    ("issues", -1.0),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "neither", "nor", "hardly", "don't", "doesn't", "didn't",
    "isn't", "wasn't", "aren't", "weren't", "can't", "cannot", "won't", "couldn't", "wouldn't",
    "shouldn't", "dont", "doesnt", "didnt", "isnt", "wasnt", "cant", "wont",
];

const INTENSIFIERS: &[&str] = &[
    "very",
    "really",
    "extremely",
    "so",
    "incredibly",
    "super",
    "totally",
    "absolutely",
    "quite",
];

/// Sentiment of one utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResult {
    /// Normalized score in `[-1, 1]`.
    pub score: f64,
    /// Polarity label.
    pub polarity: Polarity,
    /// Sum of positive contributions.
    pub positive: f64,
    /// Sum of negative contributions (as a positive number).
    pub negative: f64,
}

/// Direction of an emotional shift.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    /// Score rose.
    Up,
    /// Score fell.
    Down,
}

/// A large score change between consecutive utterances by one speaker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalShift {
    /// Utterance where the shift landed.
    pub utterance_id: UtteranceId,
    /// Speaker whose sentiment moved.
    pub speaker: Speaker,
    /// Previous score.
    pub from: f64,
    /// New score.
    pub to: f64,
    /// `to - from`.
    pub delta: f64,
    /// Up or down.
    pub direction: ShiftDirection,
}

fn valence(word: &str) -> Option<f64> {
    LEXICON.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|t| t.replace('\u{2019}', "'").trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Score `text`.
pub fn analyze(text: &str) -> SentimentResult {
    let tokens = tokenize(text);
    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut negate_left = 0usize;
    let mut boost = false;

    for token in &tokens {
        if NEGATORS.contains(&token.as_str()) {
            negate_left = NEGATION_WINDOW;
            continue;
        }
        if INTENSIFIERS.contains(&token.as_str()) {
            boost = true;
            continue;
        }

        if let Some(mut v) = valence(token) {
            if boost {
                v *= INTENSIFIER_SCALAR;
                boost = false;
            }
            if negate_left > 0 {
                v *= NEGATION_SCALAR;
            }
            if v > 0.0 {
                positive += v;
            } else {
                negative -= v;
            }
        }
        negate_left = negate_left.saturating_sub(1);
    }

    let raw: f64 = positive - negative;
    let score = (raw / (raw * raw + ALPHA).sqrt()).clamp(-1.0, 1.0);
    let polarity = classify(score, positive, negative);

    SentimentResult {
        score,
        polarity,
        positive,
        negative,
    }
}

fn classify(score: f64, positive: f64, negative: f64) -> Polarity {
    if positive > 0.0 && negative > 0.0 {
        let ratio = positive.min(negative) / positive.max(negative);
        if ratio >= MIXED_RATIO {
            return Polarity::Mixed;
        }
    }
    if score >= NEUTRAL_BAND {
        Polarity::Positive
    } else if score <= -NEUTRAL_BAND {
        Polarity::Negative
    } else {
        Polarity::Neutral
    }
}

/// Detect an emotional shift between two consecutive same-speaker scores.
pub fn detect_shift(
    utterance_id: &UtteranceId,
    speaker: Speaker,
    previous: f64,
    current: f64,
    threshold: f64,
) -> Option<EmotionalShift> {
    let delta = current - previous;
    if delta.abs() < threshold {
        return None;
    }
    Some(EmotionalShift {
        utterance_id: utterance_id.clone(),
        speaker,
        from: previous,
        to: current,
        delta,
        direction: if delta > 0.0 {
            ShiftDirection::Up
        } else {
            ShiftDirection::Down
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_text() {
        let r = analyze("I love this, it's great");
        assert_eq!(r.polarity, Polarity::Positive);
        assert!(r.score > 0.5);
    }

    #[test]
    fn negative_text() {
        let r = analyze("The checkout was frustrating and slow");
        assert_eq!(r.polarity, Polarity::Negative);
        assert!(r.score < 0.0);
    }

    #[test]
    fn neutral_text() {
        let r = analyze("The meeting is at noon");
        assert_eq!(r.polarity, Polarity::Neutral);
        assert!(r.score.abs() < f64::EPSILON);
    }

    #[test]
    fn negation_flips() {
        let r = analyze("This is not good");
        assert_eq!(r.polarity, Polarity::Negative);
    }

    #[test]
    fn negation_window_expires() {
        // "good" is four tokens after "not"
        let r = analyze("not that it matters, good");
        assert_eq!(r.polarity, Polarity::Positive);
    }

    #[test]
    fn intensifier_boosts() {
        let plain = analyze("it was good");
        let boosted = analyze("it was really good");
        assert!(boosted.score > plain.score);
    }

    #[test]
    fn mixed_when_both_sides_strong() {
        let r = analyze("I hate the login but love the dashboard");
        assert_eq!(r.polarity, Polarity::Mixed);
    }

    #[test]
    fn curly_apostrophe_negator() {
        let r = analyze("Honestly it isn\u{2019}t good");
        assert_eq!(r.polarity, Polarity::Negative);
    }

    #[test]
    fn score_is_bounded() {
        let r = analyze(&"amazing ".repeat(200));
        assert!(r.score <= 1.0 && r.score > 0.99);
    }

    #[test]
    fn shift_detected_past_threshold() {
        let id = UtteranceId::new();
        let shift = detect_shift(&id, Speaker::Participant, 0.6, -0.2, 0.5).unwrap();
        assert_eq!(shift.direction, ShiftDirection::Down);
        assert!((shift.delta + 0.8).abs() < 1e-9);
        assert!(detect_shift(&id, Speaker::Participant, 0.1, 0.3, 0.5).is_none());
    }
}
