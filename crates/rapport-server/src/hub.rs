//! Connection fan-out hub.
//!
//! Owns the session registry and the broadcast channels. Connecting a client
//! spawns its session actor on first use, brings the client up to date
//! (replay or snapshot), and announces the new connection count.

use std::sync::Arc;
use std::time::Duration;

use rapport_core::clock::Clock;
use rapport_core::errors::LiveError;
use rapport_core::ids::SessionId;
use rapport_core::session::Identity;
use rapport_session::{
    PersistenceSink, SessionConfig, SessionDeps, SessionHandle, SessionReader, SessionRegistry,
};
use tracing::{debug, instrument};

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::protocol::ObserverCount;
use crate::websocket::broadcast::{Attach, BroadcastManager};
use crate::websocket::connection::{ClientConnection, ConnectionInfo, LatencyThresholds};

/// External collaborators of the hub.
#[derive(Clone)]
pub struct HubDeps {
    /// Append-only session record writer.
    pub persistence: Arc<dyn PersistenceSink>,
    /// Session metadata reader.
    pub reader: Arc<dyn SessionReader>,
    /// Resolves connect tokens.
    pub auth: Arc<dyn Authenticator>,
    /// Time source for session actors.
    pub clock: Arc<dyn Clock>,
}

/// Sessions, their connections, and their broadcast channels.
pub struct Hub {
    broadcast: Arc<BroadcastManager>,
    registry: SessionRegistry,
    auth: Arc<dyn Authenticator>,
    latency: LatencyThresholds,
}

impl Hub {
    /// Build a hub whose session actors publish into its broadcast channels.
    pub fn new(server: &ServerConfig, sessions: SessionConfig, deps: HubDeps) -> Self {
        let broadcast = Arc::new(BroadcastManager::new(
            server.replay_capacity,
            server.send_queue_capacity,
        ));
        let session_deps = SessionDeps {
            sink: Arc::clone(&broadcast) as _,
            persistence: deps.persistence,
            clock: deps.clock,
        };
        Self {
            registry: SessionRegistry::new(sessions, session_deps, deps.reader),
            broadcast,
            auth: deps.auth,
            latency: server.latency,
        }
    }

    /// Resolve a connect token.
    pub async fn authenticate(
        &self,
        token: &str,
        session_id: &SessionId,
    ) -> Result<Identity, LiveError> {
        self.auth.authenticate(token, session_id).await
    }

    /// Admit a connection to its session.
    ///
    /// A `last_seq` still covered by the replay buffer gets the missing
    /// broadcasts; anything else gets a `session.resync` snapshot followed
    /// by the broadcasts stamped while it was taken.
    #[instrument(skip_all, fields(session_id = %conn.session_id(), conn_id = %conn.id))]
    pub async fn connect(
        &self,
        conn: &Arc<ClientConnection>,
        last_seq: Option<u64>,
    ) -> Result<SessionHandle, LiveError> {
        let session = self.open(conn.session_id()).await;

        match self.broadcast.attach(conn, last_seq)? {
            Attach::Replayed { frames } => debug!(frames, "resumed from replay buffer"),
            Attach::NeedsResync { baseline } => {
                let snapshot = session
                    .snapshot()
                    .await
                    .and_then(|s| {
                        serde_json::to_value(s).map_err(|e| LiveError::Internal(e.to_string()))
                    });
                let snapshot = match snapshot {
                    Ok(s) => s,
                    Err(e) => {
                        self.disconnect(conn);
                        return Err(e);
                    }
                };
                if !self.broadcast.finish_resync(conn, baseline, snapshot) {
                    return Err(LiveError::Connection(
                        "connection dropped before its snapshot was queued".into(),
                    ));
                }
                debug!(baseline, "snapshot queued");
            }
        }

        let _ = self.broadcast.broadcast_observer_count(conn.session_id());
        Ok(session)
    }

    /// Remove a connection and announce the new count.
    pub fn disconnect(&self, conn: &ClientConnection) {
        let session_id = conn.session_id();
        let Some(remaining) = self.broadcast.detach(conn) else {
            return;
        };
        if remaining > 0 {
            let _ = self.broadcast.broadcast_observer_count(session_id);
        } else if self.registry.get(session_id).is_none() && self.broadcast.remove_idle(session_id)
        {
            debug!(%session_id, "broadcast channel released");
        }
    }

    /// Handle for a session, spawning its actor if none is running.
    pub async fn open(&self, session_id: &SessionId) -> SessionHandle {
        self.registry.get_or_spawn(session_id).await
    }

    /// Handle for a running session.
    pub fn session(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.registry.get(session_id)
    }

    /// Connections watching a session.
    pub fn connections(&self, session_id: &SessionId) -> Vec<ConnectionInfo> {
        self.broadcast
            .session_connections(session_id)
            .iter()
            .map(|c| c.info(&self.latency))
            .collect()
    }

    /// Host/observer counts for a session.
    pub fn observer_count(&self, session_id: &SessionId) -> ObserverCount {
        self.broadcast.observer_count(session_id)
    }

    /// Total open connections.
    pub fn connection_count(&self) -> usize {
        self.broadcast.connection_count()
    }

    /// Registered session actors.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Broadcast channels.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Latency tier boundaries.
    pub fn latency_thresholds(&self) -> &LatencyThresholds {
        &self.latency
    }

    /// Stop every session actor, ending live sessions and closing their
    /// connections. Returns the number of actors aborted after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.registry.shutdown_all(timeout).await
    }
}
