//! Process-wide map of live session actors.
//!
//! Entries are inserted on first connect and removed when the actor exits
//! (grace period after `stop`, or process shutdown). Removal is reported to
//! the event sink through [`EventSink::session_released`]. Nothing else is
//! shared between sessions.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use parking_lot::Mutex;
use rapport_core::ids::SessionId;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::actor::{SessionActor, SessionDeps, SessionHandle};
use crate::config::SessionConfig;
use crate::persistence::{SessionMetadata, SessionReader};
use crate::sink::EventSink;

/// A running actor and the task that unregisters it on exit.
struct Watched {
    actor: AbortHandle,
    watcher: JoinHandle<()>,
}

/// Registry of running sessions.
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
    config: SessionConfig,
    deps: SessionDeps,
    reader: Arc<dyn SessionReader>,
    watchers: Mutex<Vec<Watched>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new(config: SessionConfig, deps: SessionDeps, reader: Arc<dyn SessionReader>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            config,
            deps,
            reader,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Handle for a running session.
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .get(id)
            .map(|h| h.value().clone())
            .filter(|h| !h.is_closed())
    }

    /// Handle for `id`, spawning its actor when none is running.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn get_or_spawn(&self, id: &SessionId) -> SessionHandle {
        if let Some(existing) = self.get(id) {
            return existing;
        }

        let metadata = match self.reader.load_metadata(id).await {
            Ok(Some(m)) => m,
            Ok(None) => SessionMetadata::default(),
            Err(e) => {
                warn!(error = %e, "session metadata unavailable, starting without it");
                SessionMetadata::default()
            }
        };

        match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
            entry => {
                let (handle, join) = SessionActor::spawn(
                    id.clone(),
                    metadata,
                    self.config.clone(),
                    self.deps.clone(),
                );
                let _ = entry.insert(handle.clone());
                self.watch(handle.clone(), join);
                info!("session registered");
                handle
            }
        }
    }

    fn watch(&self, handle: SessionHandle, join: JoinHandle<()>) {
        let actor = join.abort_handle();
        let sessions = Arc::clone(&self.sessions);
        let sink = Arc::clone(&self.deps.sink);
        let watcher = tokio::spawn(async move {
            match join.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    debug!(session_id = %handle.id(), "session actor aborted");
                }
                Err(e) => warn!(session_id = %handle.id(), error = %e, "session actor panicked"),
            }
            let removed = sessions.remove_if(handle.id(), |_, h| h.same_actor(&handle));
            if removed.is_some() {
                debug!(session_id = %handle.id(), "session unregistered");
                sink.session_released(handle.id());
            }
        });
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| !w.watcher.is_finished());
        watchers.push(Watched { actor, watcher });
    }

    fn release_all(&self, sink: &dyn EventSink) {
        for id in self.ids() {
            if self.sessions.remove(&id).is_some() {
                sink.session_released(&id);
            }
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Registered session IDs.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Stop every actor and wait up to `timeout` for them to exit. Actors
    /// still running after that are aborted. Returns the number aborted.
    pub async fn shutdown_all(&self, timeout: Duration) -> usize {
        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
        let (actors, watchers): (Vec<AbortHandle>, Vec<JoinHandle<()>>) =
            std::mem::take(&mut *self.watchers.lock())
                .into_iter()
                .map(|w| (w.actor, w.watcher))
                .unzip();
        if tokio::time::timeout(timeout, join_all(watchers)).await.is_ok() {
            return 0;
        }
        let stuck: Vec<&AbortHandle> = actors.iter().filter(|a| !a.is_finished()).collect();
        warn!(pending = stuck.len(), "session shutdown timed out, aborting actors");
        for actor in &stuck {
            actor.abort();
        }
        self.release_all(&*self.deps.sink);
        stuck.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rapport_core::clock::ManualClock;
    use rapport_core::session::{Identity, SessionStatus};
    use rapport_core::topics::TopicStatus;

    use super::*;
    use crate::command::Command;
    use crate::persistence::MemoryPersistence;
    use crate::sink::testing::RecordingSink;

    fn registry_with(
        store: &MemoryPersistence,
        config: SessionConfig,
    ) -> (SessionRegistry, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let deps = SessionDeps {
            sink: sink.clone(),
            persistence: Arc::new(store.clone()),
            clock: Arc::new(ManualClock::new(Utc::now())),
        };
        (SessionRegistry::new(config, deps, Arc::new(store.clone())), sink)
    }

    fn registry(store: &MemoryPersistence, grace: Duration) -> SessionRegistry {
        let config = SessionConfig {
            grace_period: grace,
            ..SessionConfig::default()
        };
        registry_with(store, config).0
    }

    #[tokio::test]
    async fn same_session_same_actor() {
        let store = MemoryPersistence::new();
        let reg = registry(&store, Duration::from_secs(30));
        let id = SessionId::from_raw("sess_a");
        let a = reg.get_or_spawn(&id).await;
        let b = reg.get_or_spawn(&id).await;
        assert!(a.same_actor(&b));
        let other = reg.get_or_spawn(&SessionId::from_raw("sess_b")).await;
        assert!(!a.same_actor(&other));
        assert_eq!(reg.len(), 2);
    }

    #[tokio::test]
    async fn metadata_seeds_topics() {
        let store = MemoryPersistence::new();
        let id = SessionId::from_raw("sess_meta");
        store.insert_metadata(
            id.clone(),
            SessionMetadata {
                title: None,
                topics: vec![TopicStatus::new("Onboarding")],
                planned_duration_secs: Some(600),
            },
        );
        let reg = registry(&store, Duration::from_secs(30));
        let snap = reg.get_or_spawn(&id).await.snapshot().await.unwrap();
        assert_eq!(snap.topics.len(), 1);
        assert_eq!(snap.planned_duration_secs, Some(600));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_after_grace_period() {
        let store = MemoryPersistence::new();
        let reg = registry(&store, Duration::from_secs(5));
        let id = SessionId::from_raw("sess_grace");
        let handle = reg.get_or_spawn(&id).await;
        let _ = handle.dispatch(Command::Stop, Identity::host("h")).await.unwrap();
        assert!(reg.get(&id).is_some());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(reg.get(&id).is_none());
        assert!(reg.is_empty());

        let fresh = reg.get_or_spawn(&id).await;
        assert!(!fresh.same_actor(&handle));
        let snap = fresh.snapshot().await.unwrap();
        assert_eq!(snap.status.status, SessionStatus::Draft);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_all_stops_every_actor() {
        let store = MemoryPersistence::new();
        let reg = registry(&store, Duration::from_millis(10));
        let ids = [SessionId::from_raw("s1"), SessionId::from_raw("s2")];
        let mut handles = Vec::new();
        for id in &ids {
            let h = reg.get_or_spawn(id).await;
            let _ = h.dispatch(Command::Start, Identity::host("h")).await.unwrap();
            handles.push(h);
        }
        assert_eq!(reg.shutdown_all(Duration::from_secs(5)).await, 0);
        assert!(handles.iter().all(SessionHandle::is_closed));
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_after_grace_is_reported_to_sink() {
        let store = MemoryPersistence::new();
        let config = SessionConfig {
            grace_period: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let (reg, sink) = registry_with(&store, config);
        let id = SessionId::from_raw("sess_release");
        let handle = reg.get_or_spawn(&id).await;
        let _ = handle.dispatch(Command::Stop, Identity::host("h")).await.unwrap();
        assert!(sink.released.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(reg.is_empty());
        assert_eq!(*sink.released.lock(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_all_aborts_wedged_actor() {
        let store = MemoryPersistence::new();
        let config = SessionConfig {
            append_timeout: Duration::from_secs(3_600),
            flush_timeout: Duration::from_secs(3_600),
            ..SessionConfig::default()
        };
        let (reg, sink) = registry_with(&store, config);
        let id = SessionId::from_raw("sess_wedged");
        let handle = reg.get_or_spawn(&id).await;
        store.stall();
        let _ = handle.dispatch(Command::Start, Identity::host("h")).await.unwrap();

        assert_eq!(reg.shutdown_all(Duration::from_secs(1)).await, 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_closed());
        assert!(reg.is_empty());
        assert_eq!(*sink.released.lock(), vec![id]);
    }
}
