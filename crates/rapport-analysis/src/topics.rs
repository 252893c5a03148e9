//! Topic coverage inference from transcript text.

use std::collections::HashSet;

use rapport_core::topics::TopicStatus;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "about", "your", "you", "our", "how", "what", "why", "are",
];

fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.push(' ');
    out
}

fn words(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}

fn contains_phrase(normalized_text: &str, phrase: &str) -> bool {
    let needle = normalize(phrase);
    let needle = needle.split_whitespace().collect::<Vec<_>>().join(" ");
    if needle.is_empty() {
        return false;
    }
    normalized_text.contains(&format!(" {needle} "))
}

/// Whether `text` mentions `topic`: every significant word of the name, or
/// any keyword phrase.
pub fn mentions(text: &str, topic: &TopicStatus) -> bool {
    let normalized = normalize(text);
    if topic
        .keywords
        .iter()
        .any(|k| contains_phrase(&normalized, k))
    {
        return true;
    }

    let name = normalize(&topic.name);
    let significant: Vec<&str> = name
        .split_whitespace()
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .collect();
    if significant.is_empty() {
        return false;
    }
    let present = words(&normalized);
    significant.iter().all(|w| present.contains(w))
}

/// Names of uncovered topics that `text` mentions.
pub fn infer_covered(text: &str, topics: &[TopicStatus]) -> Vec<String> {
    topics
        .iter()
        .filter(|t| !t.is_covered() && mentions(text, t))
        .map(|t| t.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rapport_core::topics::CoverageSource;

    use super::*;

    #[test]
    fn name_words_all_required() {
        let topic = TopicStatus::new("Pricing tiers");
        assert!(mentions("I looked at the pricing and the tiers confused me", &topic));
        assert!(!mentions("Pricing was fine", &topic));
    }

    #[test]
    fn keyword_phrase_matches_on_word_boundaries() {
        let topic = TopicStatus::new("Onboarding").with_keywords(["sign up", "signup"]);
        assert!(mentions("When I tried to sign up, it failed", &topic));
        assert!(!mentions("I saw the signupflow", &topic));
    }

    #[test]
    fn covered_topics_not_reinferred() {
        let mut covered = TopicStatus::new("Support");
        let _ = covered.mark_covered(Utc::now(), CoverageSource::Manual);
        let topics = vec![covered, TopicStatus::new("Billing")];
        let found = infer_covered("support and billing both came up", &topics);
        assert_eq!(found, vec!["Billing".to_string()]);
    }

    #[test]
    fn stopword_only_names_never_match() {
        let topic = TopicStatus::new("How and why");
        assert!(!mentions("how and why", &topic));
    }
}
