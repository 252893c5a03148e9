//! Wire frames.
//!
//! Broadcasts travel in an [`Envelope`] stamped with the session sequence
//! number. Direct replies to one connection ([`Reply`]) carry no sequence
//! number and never enter the replay buffer.

use chrono::{DateTime, Utc};
use rapport_core::errors::LiveError;
use rapport_core::ids::SessionId;
use rapport_session::{Command, CommandAck};
use serde::Serialize;
use serde_json::Value;

use crate::websocket::connection::ConnectionQuality;

/// Event type of the per-connection full-state message.
pub const RESYNC: &str = "session.resync";
/// Event type of the connection-count broadcast.
pub const OBSERVERS_COUNT: &str = "observers.count";

/// Broadcast frame.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<'a> {
    /// Event type, e.g. `session.status`.
    #[serde(rename = "type")]
    pub event_type: &'a str,
    /// Session the event belongs to.
    pub session_id: &'a SessionId,
    /// Per-session sequence number.
    pub seq: u64,
    /// When the event was stamped.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub data: Value,
}

/// Data of an `observers.count` broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ObserverCount {
    /// Connected hosts.
    pub hosts: usize,
    /// Connected observers.
    pub observers: usize,
    /// All connections.
    pub total: usize,
}

/// Direct reply to the sending connection.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Reply {
    /// Command accepted.
    Ack(CommandAck),
    /// Command or frame rejected.
    Error {
        /// Stable error code.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Answer to an application-level `ping`.
    Pong {
        /// Server time.
        timestamp: DateTime<Utc>,
        /// Last sampled round-trip time.
        #[serde(skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u64>,
        /// Tier derived from `latency_ms`.
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<ConnectionQuality>,
    },
}

impl Reply {
    /// Error reply carrying the error's code.
    pub fn error(err: &LiveError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    /// Client has applied every broadcast up to `seq`.
    Ack {
        /// Highest applied sequence number.
        seq: u64,
    },
    /// Application-level ping.
    Ping,
    /// Session command.
    Command(Command),
}

impl ClientFrame {
    /// Decode an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, LiveError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| LiveError::validation(e.to_string()))?;
        match value.get("type").and_then(Value::as_str) {
            Some("ack") => value
                .get("seq")
                .and_then(Value::as_u64)
                .map(|seq| Self::Ack { seq })
                .ok_or_else(|| LiveError::validation("ack requires a non-negative integer seq")),
            Some("ping") => Ok(Self::Ping),
            Some(_) => Command::from_value(value).map(Self::Command),
            None => Err(LiveError::validation("frame has no type")),
        }
    }
}
