//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::Hub;

/// What a graceful shutdown had to force.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Session actors aborted after the timeout.
    pub aborted_sessions: usize,
    /// Whether the HTTP listener had to be aborted.
    pub listener_aborted: bool,
}

/// Coordinates graceful shutdown of the listener and every session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown: the listener stops accepting and new upgrades are
    /// refused.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Full graceful shutdown.
    ///
    /// 1. Cancel the token so the listener stops accepting
    /// 2. Stop every session actor; live sessions end and their final status
    ///    is flushed to connections before they close
    /// 3. Wait for the listener task, all within `timeout`
    pub async fn graceful_shutdown(
        &self,
        hub: &Hub,
        listener: JoinHandle<()>,
        timeout: Duration,
    ) -> ShutdownReport {
        self.shutdown();
        info!(
            sessions = hub.session_count(),
            connections = hub.connection_count(),
            timeout_secs = timeout.as_secs(),
            "shutting down"
        );
        let deadline = tokio::time::Instant::now() + timeout;

        let aborted_sessions = hub.shutdown(timeout).await;

        let abort = listener.abort_handle();
        let listener_aborted = tokio::time::timeout_at(deadline, listener).await.is_err();
        if listener_aborted {
            warn!("listener did not stop within {timeout:?}, aborting");
            abort.abort();
        }

        ShutdownReport {
            aborted_sessions,
            listener_aborted,
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rapport_core::clock::ManualClock;
    use rapport_core::ids::SessionId;
    use rapport_core::session::Identity;
    use rapport_session::{Command, MemoryPersistence, SessionConfig};

    use super::*;
    use crate::auth::StaticTokenAuthenticator;
    use crate::config::ServerConfig;
    use crate::hub::HubDeps;

    fn hub() -> Hub {
        let store = MemoryPersistence::new();
        Hub::new(
            &ServerConfig::default(),
            SessionConfig::default(),
            HubDeps {
                persistence: Arc::new(store.clone()),
                reader: Arc::new(store),
                auth: Arc::new(StaticTokenAuthenticator::default()),
                clock: Arc::new(ManualClock::new(Utc::now())),
            },
        )
    }

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::default();
        let token = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_stops_sessions_and_listener() {
        let coord = ShutdownCoordinator::new();
        let hub = hub();
        let token = coord.token();
        let listener = tokio::spawn(async move { token.cancelled().await });

        let session = hub.open(&SessionId::from_raw("sess_1")).await;
        let _ = session
            .dispatch(Command::Start, Identity::host("alice"))
            .await
            .unwrap();

        let report = coord
            .graceful_shutdown(&hub, listener, Duration::from_secs(5))
            .await;
        assert_eq!(report, ShutdownReport::default());
        assert!(session.is_closed());
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_listener_is_aborted() {
        let coord = ShutdownCoordinator::new();
        let hub = hub();
        let listener = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let report = coord
            .graceful_shutdown(&hub, listener, Duration::from_millis(100))
            .await;
        assert!(report.listener_aborted);
    }
}
