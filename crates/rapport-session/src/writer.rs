//! Per-session persistence writer.
//!
//! Records from the session actor are queued to one worker task, which
//! appends them in order with bounded retry and exponential backoff. Each
//! attempt has its own deadline, so a backend that never answers costs a
//! bounded amount of time per record. The actor never waits on a write; when
//! a record exhausts its retries the worker reports a [`SessionWarning`] back
//! to the actor and moves on.

use std::sync::Arc;
use std::time::Duration;

use rapport_core::errors::codes;
use rapport_core::ids::SessionId;
use rapport_core::metrics::PERSISTENCE_FAILURES_TOTAL;
use rapport_core::retry::RetryConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::PersistenceError;
use crate::event::SessionWarning;
use crate::persistence::{PersistenceRecord, PersistenceSink};

/// Retry and deadline policy for appends.
#[derive(Clone, Debug)]
pub struct WritePolicy {
    /// Backoff between failed attempts.
    pub retry: RetryConfig,
    /// Deadline for one attempt.
    pub append_timeout: Duration,
}

enum WriteRequest {
    Append(Box<PersistenceRecord>),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget writer for one session.
pub struct PersistenceWriter {
    tx: mpsc::Sender<WriteRequest>,
    worker_handle: tokio::task::JoinHandle<()>,
}

impl PersistenceWriter {
    /// Spawn the worker.
    pub fn spawn(
        session_id: SessionId,
        sink: Arc<dyn PersistenceSink>,
        policy: WritePolicy,
        capacity: usize,
        warnings: mpsc::Sender<SessionWarning>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker_handle = tokio::spawn(write_worker(rx, session_id, sink, policy, warnings));
        Self { tx, worker_handle }
    }

    /// Queue a record without waiting.
    pub fn append(&self, record: PersistenceRecord) {
        if let Err(e) = self.tx.try_send(WriteRequest::Append(Box::new(record))) {
            warn!(error = %e, "persist dropped: writer queue full or closed");
            metrics::counter!(PERSISTENCE_FAILURES_TOTAL).increment(1);
        }
    }

    /// Wait until every record queued before this call has been handled.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Flush(reply_tx))
            .await
            .map_err(|_| PersistenceError::Closed)?;
        reply_rx.await.map_err(|_| PersistenceError::Closed)
    }

    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker_handle.is_finished()
    }
}

async fn write_worker(
    mut rx: mpsc::Receiver<WriteRequest>,
    session_id: SessionId,
    sink: Arc<dyn PersistenceSink>,
    policy: WritePolicy,
    warnings: mpsc::Sender<SessionWarning>,
) {
    while let Some(req) = rx.recv().await {
        match req {
            WriteRequest::Flush(reply) => {
                let _ = reply.send(());
            }
            WriteRequest::Append(record) => {
                if let Err(e) = append_with_retry(&*sink, &session_id, &record, &policy).await {
                    warn!(session_id = %session_id, error = %e, "persist failed after retries");
                    metrics::counter!(PERSISTENCE_FAILURES_TOTAL).increment(1);
                    let _ = warnings.try_send(SessionWarning {
                        code: codes::PERSISTENCE_FAILURE.to_string(),
                        message: format!("session data may not be saved: {e}"),
                    });
                }
            }
        }
    }
    debug!(session_id = %session_id, "persistence writer stopped");
}

async fn append_with_retry(
    sink: &dyn PersistenceSink,
    session_id: &SessionId,
    record: &PersistenceRecord,
    policy: &WritePolicy,
) -> Result<(), PersistenceError> {
    let mut attempt = 0;
    loop {
        let result = tokio::time::timeout(policy.append_timeout, sink.append(session_id, record))
            .await
            .unwrap_or_else(|_| Err(PersistenceError::TimedOut(policy.append_timeout)));
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= policy.retry.max_retries => return Err(e),
            Err(e) => {
                let delay = policy.retry.delay_for(attempt, rand::random::<f64>());
                debug!(
                    session_id = %session_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "persist failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
