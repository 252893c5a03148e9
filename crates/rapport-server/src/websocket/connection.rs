//! Per-connection state: identity, outbound queue, liveness, latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rapport_core::ids::{ConnectionId, SessionId, UserId};
use rapport_core::session::{ConnectionRole, Identity};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::protocol::Reply;

/// Item on a connection's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized text frame.
    Text(Arc<str>),
    /// Heartbeat ping carrying a nonce.
    Ping(u64),
    /// Close the socket after everything queued before it.
    Close,
}

/// Coarse connection quality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// RTT at or below the good threshold.
    Good,
    /// RTT at or below the degraded threshold.
    Degraded,
    /// Anything slower.
    Poor,
}

/// Latency tier boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyThresholds {
    /// Upper bound of [`ConnectionQuality::Good`].
    pub good: Duration,
    /// Upper bound of [`ConnectionQuality::Degraded`].
    pub degraded: Duration,
}

impl LatencyThresholds {
    /// Tier for a round-trip sample.
    pub fn classify(&self, rtt: Duration) -> ConnectionQuality {
        if rtt <= self.good {
            ConnectionQuality::Good
        } else if rtt <= self.degraded {
            ConnectionQuality::Degraded
        } else {
            ConnectionQuality::Poor
        }
    }
}

/// Point-in-time view of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Connection ID.
    pub id: ConnectionId,
    /// Authenticated user.
    pub user_id: UserId,
    /// Role.
    pub role: ConnectionRole,
    /// Last RTT sample.
    pub latency_ms: Option<u64>,
    /// Tier of `latency_ms`.
    pub quality: Option<ConnectionQuality>,
    /// Highest broadcast sequence queued to the client.
    pub last_delivered_seq: u64,
    /// Highest sequence the client acknowledged.
    pub last_acked_seq: u64,
}

/// A connected `WebSocket` client bound to one session.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    session_id: SessionId,
    identity: Identity,
    tx: mpsc::Sender<Outbound>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    next_nonce: AtomicU64,
    pending_ping: Mutex<Option<(u64, Instant)>>,
    latency: Mutex<Option<Duration>>,
    last_delivered: AtomicU64,
    last_acked: AtomicU64,
    dropped_messages: AtomicU64,
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a connection writing into `tx`.
    pub fn new(
        id: ConnectionId,
        session_id: SessionId,
        identity: Identity,
        tx: mpsc::Sender<Outbound>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            session_id,
            identity,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            next_nonce: AtomicU64::new(1),
            pending_ping: Mutex::new(None),
            latency: Mutex::new(None),
            last_delivered: AtomicU64::new(0),
            last_acked: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Session this connection watches.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Authenticated identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Role of the connection.
    pub fn role(&self) -> ConnectionRole {
        self.identity.role
    }

    /// Whether the connection may issue session-control commands.
    pub fn is_host(&self) -> bool {
        self.identity.is_host()
    }

    // ── Outbound ──

    /// Queue a text frame without waiting.
    ///
    /// Returns `false` when the queue is full or closed and counts the drop.
    pub fn send(&self, text: Arc<str>) -> bool {
        if self.tx.try_send(Outbound::Text(text)).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue a sequenced broadcast.
    pub fn deliver(&self, seq: u64, text: Arc<str>) -> bool {
        let sent = self.send(text);
        if sent {
            let _ = self.last_delivered.fetch_max(seq, Ordering::Relaxed);
        }
        sent
    }

    /// Serialize and queue a direct reply.
    pub fn reply(&self, reply: &Reply) -> bool {
        match serde_json::to_string(reply) {
            Ok(json) => self.send(Arc::from(json)),
            Err(_) => false,
        }
    }

    /// Total frames dropped on a full or closed queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    // ── Liveness ──

    /// Queue a heartbeat ping and remember when it left.
    pub fn send_ping(&self) -> bool {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        if self.tx.try_send(Outbound::Ping(nonce)).is_err() {
            return false;
        }
        *self.pending_ping.lock() = Some((nonce, Instant::now()));
        true
    }

    /// Handle a pong frame. Returns the RTT when the payload answers the
    /// outstanding ping.
    pub fn record_pong(&self, payload: &[u8]) -> Option<Duration> {
        self.mark_alive();
        let nonce = u64::from_be_bytes(payload.try_into().ok()?);
        let mut pending = self.pending_ping.lock();
        match *pending {
            Some((expected, sent_at)) if expected == nonce => {
                *pending = None;
                let rtt = sent_at.elapsed();
                self.record_latency(rtt);
                Some(rtt)
            }
            _ => None,
        }
    }

    /// Store a round-trip sample.
    pub fn record_latency(&self, rtt: Duration) {
        *self.latency.lock() = Some(rtt);
    }

    /// Last round-trip sample.
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }

    /// Tier of the last sample.
    pub fn quality(&self, thresholds: &LatencyThresholds) -> Option<ConnectionQuality> {
        self.latency().map(|rtt| thresholds.classify(rtt))
    }

    /// Mark the connection as alive (pong or other activity received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    // ── Sequence tracking ──

    /// Record a client acknowledgement. Never moves backwards.
    pub fn ack(&self, seq: u64) {
        let _ = self.last_acked.fetch_max(seq, Ordering::Relaxed);
    }

    /// Highest acknowledged sequence.
    pub fn last_acked(&self) -> u64 {
        self.last_acked.load(Ordering::Relaxed)
    }

    /// Highest queued sequence.
    pub fn last_delivered(&self) -> u64 {
        self.last_delivered.load(Ordering::Relaxed)
    }

    // ── Closing ──

    /// Close after the frames already queued. Falls back to [`kill`] when
    /// the queue has no room for the close marker.
    ///
    /// [`kill`]: Self::kill
    pub fn close(&self) {
        if self.tx.try_send(Outbound::Close).is_err() {
            self.kill();
        }
    }

    /// Drop the connection immediately, discarding queued frames.
    pub fn kill(&self) {
        self.closed.cancel();
    }

    /// Resolves once [`kill`](Self::kill) has been called.
    pub fn killed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Whether the connection was killed.
    pub fn is_killed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Snapshot for diagnostics.
    pub fn info(&self, thresholds: &LatencyThresholds) -> ConnectionInfo {
        let latency = self.latency();
        ConnectionInfo {
            id: self.id.clone(),
            user_id: self.identity.user_id.clone(),
            role: self.identity.role,
            latency_ms: latency.map(millis),
            quality: latency.map(|d| thresholds.classify(d)),
            last_delivered_seq: self.last_delivered(),
            last_acked_seq: self.last_acked(),
        }
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Whole milliseconds, saturating.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
