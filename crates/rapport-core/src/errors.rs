//! Error hierarchy for the live session service.
//!
//! [`LiveError`] is the error every command path returns to a client. Each
//! variant maps to a stable wire code via [`LiveError::code`]. Only
//! [`LiveError::Internal`] is fatal to a session; everything else is rejected
//! or logged while the session keeps running.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionStatus;

/// Wire error codes.
pub mod codes {
    /// Malformed inbound command.
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// Command not allowed for the caller's role.
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    /// Command illegal for the current session state.
    pub const STATE_ERROR: &str = "STATE_ERROR";
    /// An analyzer was skipped for an utterance.
    pub const ANALYZER_FAILURE: &str = "ANALYZER_FAILURE";
    /// Socket dropped or overflowed.
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    /// Persistence append exhausted its retries.
    pub const PERSISTENCE_FAILURE: &str = "PERSISTENCE_FAILURE";
    /// Redaction offsets did not fit the text.
    pub const REDACTION_OFFSET_ERROR: &str = "REDACTION_OFFSET_ERROR";
    /// Referenced entity does not exist.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Credentials rejected by the auth collaborator.
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    /// Session actor is gone or unresponsive.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Coarse classification used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller sent something wrong; nothing changed.
    Client,
    /// A subsystem degraded but the session continues.
    Degraded,
    /// The session cannot continue.
    Fatal,
}

/// Errors surfaced by the live session service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LiveError {
    /// Malformed inbound command (missing field, wrong type, bad value).
    #[error("invalid command: {0}")]
    Validation(String),

    /// Command not permitted for the connection's role.
    #[error("permission denied: {command} requires the host role")]
    PermissionDenied {
        /// Wire name of the rejected command.
        command: String,
    },

    /// Command is illegal in the session's current status.
    #[error("cannot {command} while session is {status}")]
    State {
        /// Wire name of the rejected command.
        command: String,
        /// Status at the time of rejection.
        status: SessionStatus,
    },

    /// A state transition on a sub-entity was rejected.
    #[error("{0}")]
    Conflict(String),

    /// An analyzer was skipped.
    #[error("analyzer {analyzer} failed: {reason}")]
    AnalyzerFailure {
        /// Analyzer name.
        analyzer: String,
        /// Why it was skipped.
        reason: String,
    },

    /// Connection dropped or overflowed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Persistence gave up after retries.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Redaction offsets are invalid for the text they were applied to.
    #[error("redaction offsets {start}..{end} invalid for text of length {len}")]
    RedactionOffset {
        /// Start offset.
        start: usize,
        /// End offset.
        end: usize,
        /// Byte length of the text.
        len: usize,
    },

    /// Referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// The missing ID.
        id: String,
    },

    /// Credentials rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unrecoverable fault (actor gone, channel closed).
    #[error("internal error: {0}")]
    Internal(String),
}

impl LiveError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a state error.
    pub fn state(command: impl Into<String>, status: SessionStatus) -> Self {
        Self::State {
            command: command.into(),
            status,
        }
    }

    /// Stable wire code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => codes::VALIDATION_ERROR,
            Self::PermissionDenied { .. } => codes::PERMISSION_DENIED,
            Self::State { .. } | Self::Conflict(_) => codes::STATE_ERROR,
            Self::AnalyzerFailure { .. } => codes::ANALYZER_FAILURE,
            Self::Connection(_) => codes::CONNECTION_ERROR,
            Self::Persistence(_) => codes::PERSISTENCE_FAILURE,
            Self::RedactionOffset { .. } => codes::REDACTION_OFFSET_ERROR,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::Unauthorized(_) => codes::UNAUTHORIZED,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Classification for logging and metrics.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_)
            | Self::PermissionDenied { .. }
            | Self::State { .. }
            | Self::Conflict(_)
            | Self::NotFound { .. }
            | Self::Unauthorized(_) => ErrorCategory::Client,
            Self::AnalyzerFailure { .. }
            | Self::Connection(_)
            | Self::Persistence(_)
            | Self::RedactionOffset { .. } => ErrorCategory::Degraded,
            Self::Internal(_) => ErrorCategory::Fatal,
        }
    }

    /// Whether the session must end because of this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LiveError>;
