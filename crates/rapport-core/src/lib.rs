//! # rapport-core
//!
//! Foundation types shared by every Rapport crate.
//!
//! - **Branded IDs**: `SessionId`, `UtteranceId`, `DetectionId`, `PromptEventId`,
//!   `ConnectionId`, `CommentId`, `InsightId`, `UserId`
//! - **Transcript**: `Utterance`, `Speaker`, `Polarity`, `QuestionType`
//! - **PII**: `PiiType` with canonical labels, `PiiDetection`, `TextVersion`
//! - **Coaching**: `PromptType`, `PromptResponse`, `CoachingPromptEvent`
//! - **Session**: `SessionStatus`, `ConnectionRole`, `Identity`, `TopicStatus`, `Comment`, `Insight`
//! - **Errors**: `LiveError` with wire codes
//! - **Clock**: the session's authoritative time source
//! - **Retry**: backoff math for persistence retries
//! - **Logging**: `tracing` subscriber setup
//! - **Metrics**: metric names recorded across crates

#![deny(unsafe_code)]

pub mod clock;
pub mod coaching;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod pii;
pub mod retry;
pub mod session;
pub mod topics;
pub mod transcript;
