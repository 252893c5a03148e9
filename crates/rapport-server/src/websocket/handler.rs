//! Inbound frame dispatch for one connection.

use chrono::Utc;
use rapport_session::SessionHandle;
use tracing::{debug, warn};

use super::connection::{ClientConnection, LatencyThresholds, millis};
use crate::protocol::{ClientFrame, Reply};

/// Handle one inbound text frame. Returns the direct reply, if any.
///
/// Session commands go through the session queue with the connection's
/// identity; role and state checks happen there.
pub async fn handle_message(
    text: &str,
    connection: &ClientConnection,
    session: &SessionHandle,
    latency: &LatencyThresholds,
) -> Option<Reply> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(conn_id = %connection.id, error = %e, "malformed frame");
            return Some(Reply::error(&e));
        }
    };

    match frame {
        ClientFrame::Ack { seq } => {
            connection.ack(seq);
            None
        }
        ClientFrame::Ping => Some(Reply::Pong {
            timestamp: Utc::now(),
            latency_ms: connection.latency().map(millis),
            quality: connection.quality(latency),
        }),
        ClientFrame::Command(command) => {
            let name = command.name();
            match session.dispatch(command, connection.identity().clone()).await {
                Ok(ack) => Some(Reply::Ack(ack)),
                Err(e) => {
                    if e.is_fatal() {
                        warn!(conn_id = %connection.id, command = name, error = %e, "command failed");
                    } else {
                        debug!(conn_id = %connection.id, command = name, code = e.code(), "command rejected");
                    }
                    Some(Reply::error(&e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use rapport_core::clock::SystemClock;
    use rapport_core::ids::{ConnectionId, SessionId};
    use rapport_core::session::Identity;
    use rapport_session::{
        MemoryPersistence, SessionActor, SessionConfig, SessionDeps, SessionMetadata,
    };
    use tokio::sync::mpsc;

    use super::*;
    use crate::websocket::broadcast::BroadcastManager;
    use crate::websocket::connection::{ConnectionQuality, Outbound};

    const THRESHOLDS: LatencyThresholds = LatencyThresholds {
        good: Duration::from_millis(150),
        degraded: Duration::from_millis(400),
    };

    fn spawn_session() -> SessionHandle {
        let store = MemoryPersistence::new();
        let deps = SessionDeps {
            sink: Arc::new(BroadcastManager::new(16, 16)),
            persistence: Arc::new(store),
            clock: Arc::new(SystemClock),
        };
        let (handle, _join) = SessionActor::spawn(
            SessionId::from_raw("sess_h"),
            SessionMetadata::default(),
            SessionConfig::default(),
            deps,
        );
        handle
    }

    fn connection(identity: Identity) -> (ClientConnection, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = ClientConnection::new(
            ConnectionId::new(),
            SessionId::from_raw("sess_h"),
            identity,
            tx,
        );
        (conn, rx)
    }

    #[tokio::test]
    async fn host_command_is_acked() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::host("alice"));
        let reply = handle_message(r#"{"type":"start"}"#, &conn, &session, &THRESHOLDS).await;
        assert_matches!(reply, Some(Reply::Ack(ack)) if ack.command == "start");
    }

    #[tokio::test]
    async fn observer_control_command_denied() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::observer("bob"));
        let reply = handle_message(r#"{"type":"start"}"#, &conn, &session, &THRESHOLDS).await;
        assert_matches!(reply, Some(Reply::Error { code: "PERMISSION_DENIED", .. }));
    }

    #[tokio::test]
    async fn observer_may_comment() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::observer("bob"));
        let reply = handle_message(
            r#"{"type":"comment","text":"good follow-up"}"#,
            &conn,
            &session,
            &THRESHOLDS,
        )
        .await;
        assert_matches!(reply, Some(Reply::Ack(ack)) if ack.command == "comment" && ack.id.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_is_state_error() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::host("alice"));
        let reply = handle_message(r#"{"type":"pause"}"#, &conn, &session, &THRESHOLDS).await;
        assert_matches!(reply, Some(Reply::Error { code: "STATE_ERROR", .. }));
    }

    #[tokio::test]
    async fn malformed_frame_is_validation_error() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::host("alice"));
        let reply = handle_message("{", &conn, &session, &THRESHOLDS).await;
        assert_matches!(reply, Some(Reply::Error { code: "VALIDATION_ERROR", .. }));
    }

    #[tokio::test]
    async fn ack_updates_connection_silently() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::observer("bob"));
        let reply = handle_message(r#"{"type":"ack","seq":9}"#, &conn, &session, &THRESHOLDS).await;
        assert!(reply.is_none());
        assert_eq!(conn.last_acked(), 9);
    }

    #[tokio::test]
    async fn ping_reports_latency() {
        let session = spawn_session();
        let (conn, _rx) = connection(Identity::observer("bob"));
        conn.record_latency(Duration::from_millis(250));
        let reply = handle_message(r#"{"type":"ping"}"#, &conn, &session, &THRESHOLDS).await;
        assert_matches!(
            reply,
            Some(Reply::Pong {
                latency_ms: Some(250),
                quality: Some(ConnectionQuality::Degraded),
                ..
            })
        );
    }
}
