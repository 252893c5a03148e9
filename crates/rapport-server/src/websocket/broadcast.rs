//! Per-session event fan-out to connected `WebSocket` clients.
//!
//! Each session has one channel: its connections, the last stamped sequence
//! number, and a bounded replay buffer. Stamping, buffering, and queueing to
//! every connection happen under the channel lock, so all connections see
//! the same sequence number for the same event and in the same order.
//!
//! Only frames every connection receives advance the sequence. Host-only
//! frames carry the current head sequence and are not replayed, so
//! observers never see a gap they cannot fill.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use rapport_core::errors::LiveError;
use rapport_core::ids::{ConnectionId, SessionId};
use rapport_core::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_SLOW_DISCONNECTS_TOTAL};
use rapport_core::session::ConnectionRole;
use rapport_session::{Audience, EventSink, SessionEvent};
use serde_json::Value;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::protocol::{Envelope, OBSERVERS_COUNT, ObserverCount, RESYNC};

/// A stamped, serialized broadcast.
#[derive(Debug)]
struct Frame {
    seq: u64,
    audience: Audience,
    text: Arc<str>,
}

impl Frame {
    fn visible_to(&self, conn: &ClientConnection) -> bool {
        self.audience == Audience::All || conn.is_host()
    }
}

#[derive(Default)]
struct ChannelState {
    seq: u64,
    replay: VecDeque<Arc<Frame>>,
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    /// Connections waiting for their snapshot; live frames are held here.
    syncing: HashMap<ConnectionId, Vec<Arc<Frame>>>,
}

impl ChannelState {
    fn remember(&mut self, frame: Arc<Frame>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.replay.len() >= capacity {
            let _ = self.replay.pop_front();
        }
        self.replay.push_back(frame);
    }

    /// Frames after `last_seq`, or `None` when the buffer no longer holds
    /// all of them.
    fn replay_since(&self, last_seq: u64) -> Option<Vec<Arc<Frame>>> {
        if last_seq > self.seq {
            return None;
        }
        if last_seq == self.seq {
            return Some(Vec::new());
        }
        let oldest = self.replay.front()?.seq;
        if oldest > last_seq + 1 {
            return None;
        }
        Some(
            self.replay
                .iter()
                .filter(|f| f.seq > last_seq)
                .cloned()
                .collect(),
        )
    }

    fn fan_out(&mut self, frame: &Arc<Frame>, sync_capacity: usize) -> Vec<Arc<ClientConnection>> {
        let mut slow = Vec::new();
        for (id, conn) in &self.connections {
            if !frame.visible_to(conn) {
                continue;
            }
            if let Some(pending) = self.syncing.get_mut(id) {
                if pending.len() < sync_capacity {
                    pending.push(Arc::clone(frame));
                } else {
                    slow.push(id.clone());
                }
                continue;
            }
            if !conn.deliver(frame.seq, Arc::clone(&frame.text)) {
                slow.push(id.clone());
            }
        }
        slow.iter().filter_map(|id| self.remove(id)).collect()
    }

    fn remove(&mut self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let _ = self.syncing.remove(id);
        self.connections.remove(id)
    }

    fn observer_count(&self) -> ObserverCount {
        let hosts = self
            .connections
            .values()
            .filter(|c| c.role() == ConnectionRole::Host)
            .count();
        ObserverCount {
            hosts,
            observers: self.connections.len() - hosts,
            total: self.connections.len(),
        }
    }
}

/// How a connection was brought up to date on attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attach {
    /// The gap after `lastSeq` was replayed; the connection is live.
    Replayed {
        /// Frames replayed.
        frames: usize,
    },
    /// The connection needs a full snapshot. Live frames are held until
    /// [`BroadcastManager::finish_resync`].
    NeedsResync {
        /// Sequence the snapshot is stamped with.
        baseline: u64,
    },
}

type Channel = Arc<Mutex<ChannelState>>;

/// Manages event broadcasting to connected clients.
pub struct BroadcastManager {
    channels: DashMap<SessionId, Channel>,
    replay_capacity: usize,
    sync_capacity: usize,
    connections: AtomicUsize,
}

impl BroadcastManager {
    /// Keep `replay_capacity` frames per session; hold at most
    /// `sync_capacity` live frames for a connection awaiting its snapshot.
    pub fn new(replay_capacity: usize, sync_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            replay_capacity,
            sync_capacity,
            connections: AtomicUsize::new(0),
        }
    }

    fn channel(&self, session_id: &SessionId) -> Channel {
        if let Some(ch) = self.channels.get(session_id) {
            return Arc::clone(ch.value());
        }
        Arc::clone(self.channels.entry(session_id.clone()).or_default().value())
    }

    /// Register a connection and bring it up to date.
    ///
    /// With `last_seq` covered by the replay buffer the missing frames are
    /// queued before any newer broadcast. Otherwise the caller must fetch a
    /// snapshot and pass it to [`finish_resync`](Self::finish_resync).
    pub fn attach(
        &self,
        conn: &Arc<ClientConnection>,
        last_seq: Option<u64>,
    ) -> Result<Attach, LiveError> {
        let channel = self.channel(conn.session_id());
        let mut state = channel.lock();
        if state
            .connections
            .insert(conn.id.clone(), Arc::clone(conn))
            .is_none()
        {
            let _ = self.connections.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(frames) = last_seq.and_then(|last| state.replay_since(last)) {
            let mut replayed = 0;
            for frame in frames.iter().filter(|f| f.visible_to(conn)) {
                if !conn.deliver(frame.seq, Arc::clone(&frame.text)) {
                    let _ = state.remove(&conn.id);
                    drop(state);
                    self.on_removed(conn);
                    return Err(LiveError::Connection(
                        "replay exceeded the send queue".into(),
                    ));
                }
                replayed += 1;
            }
            debug!(conn_id = %conn.id, replayed, "gap replayed");
            return Ok(Attach::Replayed { frames: replayed });
        }

        let _ = state.syncing.insert(conn.id.clone(), Vec::new());
        Ok(Attach::NeedsResync {
            baseline: state.seq,
        })
    }

    /// Queue the snapshot, then every frame held since
    /// [`attach`](Self::attach). Returns `false` if the connection is gone.
    pub fn finish_resync(
        &self,
        conn: &Arc<ClientConnection>,
        baseline: u64,
        snapshot: Value,
    ) -> bool {
        let envelope = Envelope {
            event_type: RESYNC,
            session_id: conn.session_id(),
            seq: baseline,
            timestamp: Utc::now(),
            data: snapshot,
        };
        let text: Arc<str> = match serde_json::to_string(&envelope) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(conn_id = %conn.id, error = %e, "failed to serialize snapshot");
                return false;
            }
        };

        let channel = self.channel(conn.session_id());
        let mut state = channel.lock();
        let Some(pending) = state.syncing.remove(&conn.id) else {
            return false;
        };
        let delivered = conn.send(text)
            && pending
                .iter()
                .all(|f| conn.deliver(f.seq, Arc::clone(&f.text)));
        if delivered {
            return true;
        }
        let removed = state.remove(&conn.id);
        drop(state);
        if removed.is_some() {
            self.on_removed(conn);
        }
        false
    }

    /// Unregister a connection. Returns the number of connections left on
    /// its session, or `None` if it was already gone.
    pub fn detach(&self, conn: &ClientConnection) -> Option<usize> {
        let channel = self.channels.get(conn.session_id()).map(|c| Arc::clone(c.value()))?;
        let mut state = channel.lock();
        let _ = state.remove(&conn.id)?;
        let _ = self.connections.fetch_sub(1, Ordering::Relaxed);
        Some(state.connections.len())
    }

    /// Stamp and fan out one event. Returns the sequence number used, which
    /// for a host-only event is the unchanged head.
    pub fn broadcast(
        &self,
        session_id: &SessionId,
        event_type: &str,
        audience: Audience,
        data: Value,
    ) -> Option<u64> {
        self.stamp(session_id, event_type, audience, |_| data)
    }

    /// Broadcast the current host/observer counts.
    pub fn broadcast_observer_count(&self, session_id: &SessionId) -> Option<u64> {
        self.stamp(session_id, OBSERVERS_COUNT, Audience::All, |state| {
            serde_json::to_value(state.observer_count()).unwrap_or(Value::Null)
        })
    }

    fn stamp(
        &self,
        session_id: &SessionId,
        event_type: &str,
        audience: Audience,
        data: impl FnOnce(&ChannelState) -> Value,
    ) -> Option<u64> {
        let channel = self.channel(session_id);
        let (seq, evicted, recipients) = {
            let mut state = channel.lock();
            let sequenced = audience == Audience::All;
            let seq = if sequenced { state.seq + 1 } else { state.seq };
            let envelope = Envelope {
                event_type,
                session_id,
                seq,
                timestamp: Utc::now(),
                data: data(&state),
            };
            let text: Arc<str> = match serde_json::to_string(&envelope) {
                Ok(json) => Arc::from(json),
                Err(e) => {
                    warn!(event_type, %session_id, error = %e, "failed to serialize event");
                    return None;
                }
            };
            let frame = Arc::new(Frame {
                seq,
                audience,
                text,
            });
            if sequenced {
                state.seq = seq;
                state.remember(Arc::clone(&frame), self.replay_capacity);
            }
            let evicted = state.fan_out(&frame, self.sync_capacity);
            (seq, evicted, state.connections.len())
        };
        debug!(event_type, %session_id, seq, recipients, "broadcast event to session");

        if !evicted.is_empty() {
            for conn in &evicted {
                warn!(conn_id = %conn.id, %session_id, "send queue full, disconnecting slow client");
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                counter!(WS_SLOW_DISCONNECTS_TOTAL).increment(1);
                self.on_removed(conn);
            }
            let _ = self.broadcast_observer_count(session_id);
        }
        Some(seq)
    }

    fn on_removed(&self, conn: &ClientConnection) {
        let _ = self.connections.fetch_sub(1, Ordering::Relaxed);
        conn.kill();
    }

    /// Close every connection of a session after its queued frames.
    pub fn close_session(&self, session_id: &SessionId) {
        let Some(channel) = self.channels.get(session_id).map(|c| Arc::clone(c.value())) else {
            return;
        };
        let state = channel.lock();
        for conn in state.connections.values() {
            conn.close();
        }
        debug!(%session_id, closed = state.connections.len(), "session connections closing");
    }

    /// Drop a session's channel if it has no connections.
    pub fn remove_idle(&self, session_id: &SessionId) -> bool {
        self.channels
            .remove_if(session_id, |_, ch| ch.lock().connections.is_empty())
            .is_some()
    }

    /// Total registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Connections watching a session.
    pub fn session_connections(&self, session_id: &SessionId) -> Vec<Arc<ClientConnection>> {
        self.channels
            .get(session_id)
            .map(|ch| ch.lock().connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Host/observer counts for a session.
    pub fn observer_count(&self, session_id: &SessionId) -> ObserverCount {
        self.channels
            .get(session_id)
            .map(|ch| ch.lock().observer_count())
            .unwrap_or_default()
    }

    /// Last sequence number stamped for a session.
    pub fn head_seq(&self, session_id: &SessionId) -> u64 {
        self.channels
            .get(session_id)
            .map_or(0, |ch| ch.lock().seq)
    }
}

impl EventSink for BroadcastManager {
    fn publish(&self, session_id: &SessionId, event: SessionEvent) {
        let audience = event.audience();
        match event.into_parts() {
            Ok((event_type, data)) => {
                let _ = self.broadcast(session_id, event_type, audience, data);
            }
            Err(e) => warn!(%session_id, error = %e, "failed to serialize session event"),
        }
    }

    fn session_closed(&self, session_id: &SessionId) {
        self.close_session(session_id);
    }

    fn session_released(&self, session_id: &SessionId) {
        if self.remove_idle(session_id) {
            debug!(%session_id, "session channel released");
        }
    }
}
