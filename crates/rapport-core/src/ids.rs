//! Branded identifier newtypes.
//!
//! Every entity gets its own ID type so a `DetectionId` can never be passed
//! where an `UtteranceId` is expected. Generated IDs are `<prefix>_<uuid v7>`,
//! which keeps them time-ordered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered ID.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing string without validation.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identifies one live interview session.
    SessionId,
    "sess"
);
branded_id!(
    /// Identifies one transcribed utterance.
    UtteranceId,
    "utt"
);
branded_id!(
    /// Identifies one PII match inside an utterance.
    DetectionId,
    "pii"
);
branded_id!(
    /// Identifies one displayed coaching prompt.
    PromptEventId,
    "cpe"
);
branded_id!(
    /// Identifies one WebSocket connection.
    ConnectionId,
    "conn"
);
branded_id!(
    /// Identifies one observer comment.
    CommentId,
    "cmt"
);
branded_id!(
    /// Identifies one flagged insight.
    InsightId,
    "ins"
);
branded_id!(
    /// Identifies an authenticated user, as resolved by the auth collaborator.
    UserId,
    "user"
);
