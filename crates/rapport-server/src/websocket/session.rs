//! `WebSocket` connection lifecycle, from upgrade through disconnect.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use rapport_core::errors::LiveError;
use rapport_core::ids::{ConnectionId, SessionId};
use rapport_core::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use rapport_core::session::Identity;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, Outbound, millis};
use super::handler::handle_message;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::hub::Hub;
use crate::protocol::Reply;

/// Run a `WebSocket` connection for an authenticated client.
///
/// 1. Registers with the hub, which replays the gap after `last_seq` or
///    queues a `session.resync` snapshot
/// 2. Forwards queued frames and heartbeat pings to the socket
/// 3. Dispatches inbound text frames to the session
/// 4. Unregisters on disconnect, heartbeat timeout, or overflow
#[instrument(skip_all, fields(session_id = %session_id, user_id = %identity.user_id, role = %identity.role))]
pub async fn run_ws_session(
    ws: WebSocket,
    session_id: SessionId,
    identity: Identity,
    last_seq: Option<u64>,
    hub: Arc<Hub>,
    config: Arc<ServerConfig>,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Outbound>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(
        ConnectionId::new(),
        session_id,
        identity,
        send_tx,
    ));
    let conn_id = connection.id.clone();

    info!(%conn_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL, "role" => connection.role().as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound = spawn_writer(ws_tx, send_rx, Arc::clone(&connection));

    let session = match hub.connect(&connection, last_seq).await {
        Ok(session) => session,
        Err(e) => {
            warn!(%conn_id, error = %e, "connection not admitted");
            let _ = connection.reply(&Reply::error(&e));
            connection.close();
            let _ = outbound.await;
            hub.disconnect(&connection);
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
            return;
        }
    };

    let heartbeat_cancel = CancellationToken::new();
    let heartbeat = {
        let conn = Arc::clone(&connection);
        let cancel = heartbeat_cancel.clone();
        let (interval, timeout) = (config.heartbeat_interval, config.heartbeat_timeout);
        tokio::spawn(async move {
            if run_heartbeat(Arc::clone(&conn), interval, timeout, cancel).await
                == HeartbeatResult::TimedOut
            {
                warn!(conn_id = %conn.id, ?timeout, "client unresponsive, disconnecting");
                conn.kill();
            }
        })
    };

    loop {
        let next = tokio::select! {
            () = connection.killed() => break,
            next = ws_rx.next() => next,
        };
        let Some(Ok(msg)) = next else { break };

        let text = match msg {
            Message::Text(text) => text.to_string(),
            Message::Binary(data) => {
                if let Ok(s) = String::from_utf8(data.to_vec()) {
                    s
                } else {
                    let err = LiveError::validation("binary frames must be UTF-8 JSON");
                    let _ = connection.reply(&Reply::error(&err));
                    continue;
                }
            }
            Message::Pong(payload) => {
                if let Some(rtt) = connection.record_pong(&payload) {
                    debug!(%conn_id, rtt_ms = millis(rtt), "latency sampled");
                }
                continue;
            }
            Message::Ping(_) => {
                connection.mark_alive();
                continue;
            }
            Message::Close(_) => {
                info!(%conn_id, "client sent close frame");
                break;
            }
        };

        connection.mark_alive();
        if let Some(reply) = handle_message(&text, &connection, &session, &config.latency).await {
            if !connection.reply(&reply) {
                warn!(%conn_id, "reply did not fit the send queue, disconnecting");
                connection.kill();
            }
        }
    }

    info!(%conn_id, dropped = connection.drop_count(), age_secs = connection.age().as_secs(), "client disconnected");
    heartbeat_cancel.cancel();
    hub.disconnect(&connection);
    connection.kill();
    outbound.abort();
    heartbeat.abort();
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Forward queued frames to the socket until closed or killed.
fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Outbound>,
    connection: Arc<ClientConnection>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                biased;
                () = connection.killed() => break,
                item = send_rx.recv() => item,
            };
            let msg = match item {
                Some(Outbound::Text(text)) => Message::Text(text.to_string().into()),
                Some(Outbound::Ping(nonce)) => Message::Ping(nonce.to_be_bytes().to_vec().into()),
                Some(Outbound::Close) => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: Utf8Bytes::from_static("session ended"),
                        })))
                        .await;
                    debug!(conn_id = %connection.id, "closed by server");
                    break;
                }
                None => break,
            };
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
        // Wake the read loop.
        connection.kill();
    })
}
