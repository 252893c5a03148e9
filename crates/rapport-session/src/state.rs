//! The session state machine.
//!
//! ```text
//! draft ──start──▶ running ◀──resume── paused
//!                     │ ──pause──────────▶ │
//!                     └──stop──▶ ended ◀──stop┘   (stop also valid from draft)
//! ```
//!
//! Effective duration is `ended_at (or now) - started_at - paused`, where an
//! open pause counts up to `now`.

use chrono::{DateTime, Duration, Utc};
use rapport_core::clock::duration_secs;
use rapport_core::errors::LiveError;
use rapport_core::ids::SessionId;
use rapport_core::session::SessionStatus;
use rapport_core::topics::{CoverageSource, CoverageStatus, TopicStatus};
use rapport_core::transcript::Speaker;
use serde::{Deserialize, Serialize};

/// Authoritative state of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Identity.
    pub id: SessionId,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// First `start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// `stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Start of the open pause, while paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Closed pause intervals, in milliseconds.
    pub paused_ms: i64,
    /// Planned topics.
    pub topics: Vec<TopicStatus>,
    /// Planned length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_duration_secs: Option<u64>,
    /// Speaker attributed to untagged speech.
    pub active_speaker: Speaker,
}

/// Status broadcast payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    /// Lifecycle status.
    pub status: SessionStatus,
    /// First `start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// `stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Start of the open pause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Effective seconds at the time of the view.
    pub effective_secs: f64,
    /// Active speaker.
    pub active_speaker: Speaker,
}

impl Session {
    /// A new draft session.
    pub fn new(id: SessionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SessionStatus::Draft,
            created_at,
            started_at: None,
            ended_at: None,
            paused_at: None,
            paused_ms: 0,
            topics: Vec::new(),
            planned_duration_secs: None,
            active_speaker: Speaker::Interviewer,
        }
    }

    /// Builder: planned topics.
    #[must_use]
    pub fn with_topics(mut self, topics: Vec<TopicStatus>) -> Self {
        self.topics = topics;
        self
    }

    /// Builder: planned duration.
    #[must_use]
    pub fn with_planned_duration(mut self, secs: Option<u64>) -> Self {
        self.planned_duration_secs = secs;
        self
    }

    /// `draft → running`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), LiveError> {
        if self.status != SessionStatus::Draft {
            return Err(LiveError::state("start", self.status));
        }
        self.status = SessionStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// `running → paused`.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), LiveError> {
        if self.status != SessionStatus::Running {
            return Err(LiveError::state("pause", self.status));
        }
        self.status = SessionStatus::Paused;
        self.paused_at = Some(now);
        Ok(())
    }

    /// `paused → running`.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), LiveError> {
        if self.status != SessionStatus::Paused {
            return Err(LiveError::state("resume", self.status));
        }
        self.close_pause(now);
        self.status = SessionStatus::Running;
        Ok(())
    }

    /// Any non-ended status `→ ended`.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<(), LiveError> {
        if self.status.is_terminal() {
            return Err(LiveError::state("stop", self.status));
        }
        self.close_pause(now);
        self.status = SessionStatus::Ended;
        self.ended_at = Some(now);
        Ok(())
    }

    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_ms += (now - paused_at).num_milliseconds().max(0);
        }
    }

    /// Total paused time, including an open pause up to `now`.
    pub fn paused_duration(&self, now: DateTime<Utc>) -> Duration {
        let open = self
            .paused_at
            .map_or(Duration::zero(), |p| (now - p).max(Duration::zero()));
        Duration::milliseconds(self.paused_ms) + open
    }

    /// Time spent live.
    pub fn effective_duration(&self, now: DateTime<Utc>) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::zero();
        };
        let end = self.ended_at.unwrap_or(now);
        (end - started - self.paused_duration(end)).max(Duration::zero())
    }

    /// [`Self::effective_duration`] in seconds.
    pub fn effective_secs(&self, now: DateTime<Utc>) -> f64 {
        duration_secs(self.effective_duration(now))
    }

    /// Reject everything once ended.
    pub fn ensure_open(&self, command: &str) -> Result<(), LiveError> {
        if self.status.is_terminal() {
            return Err(LiveError::state(command, self.status));
        }
        Ok(())
    }

    /// Require `running`.
    pub fn ensure_running(&self, command: &str) -> Result<(), LiveError> {
        if self.status != SessionStatus::Running {
            return Err(LiveError::state(command, self.status));
        }
        Ok(())
    }

    /// Flip the active speaker.
    pub fn toggle_speaker(&mut self) -> Speaker {
        self.active_speaker = self.active_speaker.toggled();
        self.active_speaker
    }

    /// Set a topic's coverage. Unknown names are added. A covered topic
    /// cannot return to not covered. Returns the topic when it changed.
    pub fn update_topic(
        &mut self,
        name: &str,
        status: CoverageStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<TopicStatus>, LiveError> {
        let idx = match self.topics.iter().position(|t| t.name.eq_ignore_ascii_case(name)) {
            Some(i) => i,
            None => {
                self.topics.push(TopicStatus::new(name));
                if status == CoverageStatus::NotCovered {
                    return Ok(self.topics.last().cloned());
                }
                self.topics.len() - 1
            }
        };
        let topic = &mut self.topics[idx];
        match status {
            CoverageStatus::Covered => {
                Ok(topic.mark_covered(now, CoverageSource::Manual).then(|| topic.clone()))
            }
            CoverageStatus::NotCovered if topic.is_covered() => Err(LiveError::Conflict(format!(
                "topic '{}' is already covered",
                topic.name
            ))),
            CoverageStatus::NotCovered => Ok(None),
        }
    }

    /// Mark inferred topics covered; returns the ones that changed.
    pub fn cover_inferred(&mut self, names: &[String], now: DateTime<Utc>) -> Vec<TopicStatus> {
        self.topics
            .iter_mut()
            .filter(|t| names.contains(&t.name))
            .filter_map(|t| t.mark_covered(now, CoverageSource::Inferred).then(|| t.clone()))
            .collect()
    }

    /// Names of topics not yet covered.
    pub fn uncovered_topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|t| !t.is_covered())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Status payload at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> StatusView {
        StatusView {
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            paused_at: self.paused_at,
            effective_secs: self.effective_secs(now),
            active_speaker: self.active_speaker,
        }
    }
}
