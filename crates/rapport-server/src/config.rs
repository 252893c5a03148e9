//! Server configuration.

use std::time::Duration;

use rapport_settings::RapportSettings;

use crate::websocket::connection::LatencyThresholds;

/// Runtime configuration for the gateway.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent `WebSocket` connections across all sessions.
    pub max_connections: usize,
    /// Ping period.
    pub heartbeat_interval: Duration,
    /// Close a connection after this long without a pong.
    pub heartbeat_timeout: Duration,
    /// Outbound queue per connection.
    pub send_queue_capacity: usize,
    /// Largest accepted inbound frame.
    pub max_message_bytes: usize,
    /// Latency tier boundaries.
    pub latency: LatencyThresholds,
    /// Broadcasts kept per session for reconnect gap-fill.
    pub replay_capacity: usize,
    /// Upper bound on process shutdown.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Assemble from loaded settings.
    pub fn from_settings(settings: &RapportSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.ws_port,
            max_connections: server.max_connections,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            send_queue_capacity: server.send_queue_capacity,
            max_message_bytes: server.max_message_bytes,
            latency: LatencyThresholds {
                good: Duration::from_millis(server.latency_good_ms),
                degraded: Duration::from_millis(server.latency_degraded_ms),
            },
            replay_capacity: settings.session.replay_buffer,
            shutdown_timeout: Duration::from_millis(server.shutdown_timeout_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from_settings(&RapportSettings::default())
        }
    }
}
