//! # rapport-session
//!
//! Session coordination: the lifecycle state machine, the per-session actor
//! that serializes every command and transcript utterance, persistence, and
//! the registry of live sessions.
//!
//! - [`state`]: `draft → running ⇄ paused → ended` and effective duration
//! - [`command`]: inbound commands with role and field validation
//! - [`event`]: outbound events and the connect/resync snapshot
//! - [`actor`]: one task per session owning all of its state
//! - [`persistence`]: sink and reader collaborators, in-memory and JSON lines
//! - [`writer`]: fire-and-forget persistence queue with retry
//! - [`registry`]: `SessionId → SessionHandle`

#![deny(unsafe_code)]

pub mod actor;
pub mod command;
pub mod config;
pub mod errors;
pub mod event;
pub mod persistence;
pub mod registry;
pub mod sink;
pub mod state;
pub mod writer;

pub use actor::{CommandAck, SessionActor, SessionDeps, SessionHandle};
pub use command::Command;
pub use config::SessionConfig;
pub use errors::PersistenceError;
pub use event::{Audience, SessionEvent, SessionSnapshot, SessionWarning};
pub use persistence::{
    JsonlPersistence, MemoryPersistence, PersistenceRecord, PersistenceSink, RecordKind,
    SessionMetadata, SessionReader,
};
pub use registry::SessionRegistry;
pub use sink::EventSink;
pub use state::{Session, StatusView};
