//! Where a session actor sends its broadcasts.

use rapport_core::ids::SessionId;

use crate::event::SessionEvent;

/// Receives every event a session publishes, in publish order.
///
/// Implementations must not block: the caller is the session actor.
pub trait EventSink: Send + Sync {
    /// Fan an event out to the session's connections.
    fn publish(&self, session_id: &SessionId, event: SessionEvent);

    /// The session ended; close its connections.
    fn session_closed(&self, session_id: &SessionId);

    /// The session's actor has exited and it is no longer registered.
    /// Per-session fan-out state can be dropped.
    fn session_released(&self, session_id: &SessionId);
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Records published events.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<(SessionId, SessionEvent)>>,
        pub closed: Mutex<Vec<SessionId>>,
        pub released: Mutex<Vec<SessionId>>,
    }

    impl RecordingSink {
        pub(crate) fn types(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(|(_, e)| e.event_type()).collect()
        }

        pub(crate) fn take(&self) -> Vec<SessionEvent> {
            std::mem::take(&mut *self.events.lock())
                .into_iter()
                .map(|(_, e)| e)
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, session_id: &SessionId, event: SessionEvent) {
            self.events.lock().push((session_id.clone(), event));
        }

        fn session_closed(&self, session_id: &SessionId) {
            self.closed.lock().push(session_id.clone());
        }

        fn session_released(&self, session_id: &SessionId) {
            self.released.lock().push(session_id.clone());
        }
    }
}
