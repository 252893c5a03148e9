//! Server, auth, and logging settings.

use rapport_core::logging::LogFormat;
use rapport_core::session::ConnectionRole;
use serde::{Deserialize, Serialize};

/// Network and connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket/HTTP port.
    pub ws_port: u16,
    /// Maximum simultaneous connections across all sessions.
    pub max_connections: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A connection with no pong for this long is dropped.
    pub heartbeat_timeout_ms: u64,
    /// Outbound buffer per connection, in messages. Overflow disconnects.
    pub send_queue_capacity: usize,
    /// Largest accepted inbound frame in bytes.
    pub max_message_bytes: usize,
    /// RTT at or below this is "good".
    pub latency_good_ms: u64,
    /// RTT at or below this is "degraded"; above is "poor".
    pub latency_degraded_ms: u64,
    /// How long process shutdown waits for session actors.
    pub shutdown_timeout_ms: u64,
    /// Development token table for the static authenticator.
    pub auth: AuthSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ws_port: 8787,
            max_connections: 512,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 45_000,
            send_queue_capacity: 256,
            max_message_bytes: 64 * 1024,
            latency_good_ms: 150,
            latency_degraded_ms: 400,
            shutdown_timeout_ms: 30_000,
            auth: AuthSettings::default(),
        }
    }
}

/// Static token grants.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Accepted tokens.
    pub tokens: Vec<TokenGrant>,
}

/// One accepted bearer token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Opaque token string.
    pub token: String,
    /// User the token authenticates.
    pub user_id: String,
    /// Role granted on any session.
    pub role: ConnectionRole,
    /// Restrict to these sessions. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<String>,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`..`error`) or an `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
