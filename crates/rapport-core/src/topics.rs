//! Planned topic coverage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coverage state of a topic. Only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    /// Not yet discussed.
    NotCovered,
    /// Discussed.
    Covered,
}

/// How a topic came to be marked covered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageSource {
    /// Moderator marked it.
    Manual,
    /// Inferred from the transcript.
    Inferred,
}

/// Status of one planned topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatus {
    /// Topic name, unique within the session.
    pub name: String,
    /// Extra words that signal the topic in speech.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Coverage status.
    pub status: CoverageStatus,
    /// When it became covered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covered_at: Option<DateTime<Utc>>,
    /// How it became covered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CoverageSource>,
}

impl TopicStatus {
    /// A new uncovered topic.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            status: CoverageStatus::NotCovered,
            covered_at: None,
            source: None,
        }
    }

    /// Builder: attach keywords.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the topic is covered.
    #[must_use]
    pub fn is_covered(&self) -> bool {
        self.status == CoverageStatus::Covered
    }

    /// Mark covered. Returns `false` if it already was.
    pub fn mark_covered(&mut self, at: DateTime<Utc>, source: CoverageSource) -> bool {
        if self.is_covered() {
            return false;
        }
        self.status = CoverageStatus::Covered;
        self.covered_at = Some(at);
        self.source = Some(source);
        true
    }
}
