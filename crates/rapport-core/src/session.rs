//! Session-level vocabulary: status, roles, comments, insights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{CommentId, InsightId, UserId, UtteranceId};

/// Lifecycle status of a session. `Ended` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not started.
    Draft,
    /// Live.
    Running,
    /// Temporarily halted.
    Paused,
    /// Finished.
    Ended,
}

impl SessionStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a connected user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// The moderator. May issue session-control commands.
    Host,
    /// A passive stakeholder. Read-only plus comments.
    Observer,
}

impl ConnectionRole {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated user as seen by a session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User.
    pub user_id: UserId,
    /// Role in this session.
    pub role: ConnectionRole,
}

impl Identity {
    /// A host identity.
    pub fn host(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::from_raw(user_id),
            role: ConnectionRole::Host,
        }
    }

    /// An observer identity.
    pub fn observer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::from_raw(user_id),
            role: ConnectionRole::Observer,
        }
    }

    /// Whether this identity may control the session.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.role == ConnectionRole::Host
    }
}

/// An observer or host comment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Identity.
    pub id: CommentId,
    /// Who wrote it.
    pub author: UserId,
    /// Comment body.
    pub text: String,
    /// Utterance it refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<UtteranceId>,
    /// Session-relative seconds it refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// When it was written.
    pub created_at: DateTime<Utc>,
}

/// A moment the moderator flagged as insightful.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// Identity.
    pub id: InsightId,
    /// Who flagged it.
    pub flagged_by: UserId,
    /// Session-relative seconds.
    pub timestamp: f64,
    /// Utterance being spoken at that moment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<UtteranceId>,
    /// When it was flagged.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ended_is_terminal() {
        assert!(SessionStatus::Ended.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
        assert!(!SessionStatus::Draft.is_terminal());
    }

    #[test]
    fn status_display() {
        assert_eq!(SessionStatus::Running.to_string(), "running");
    }

    #[test]
    fn identity_roles() {
        assert!(Identity::host("user_a").is_host());
        assert!(!Identity::observer("user_b").is_host());
    }

    #[test]
    fn role_serde() {
        let r: ConnectionRole = serde_json::from_str("\"observer\"").unwrap();
        assert_eq!(r, ConnectionRole::Observer);
        assert_eq!(serde_json::to_string(&ConnectionRole::Host).unwrap(), "\"host\"");
    }
}
