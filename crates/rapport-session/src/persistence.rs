//! Persistence collaborators.
//!
//! The session treats persistence as a sink: records are appended in
//! session order and never read back during a live session. The only read is
//! [`SessionReader::load_metadata`] when a session actor is spawned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rapport_core::coaching::CoachingPromptEvent;
use rapport_core::ids::SessionId;
use rapport_core::pii::PiiDetection;
use rapport_core::session::{Comment, Insight};
use rapport_core::topics::TopicStatus;
use rapport_core::transcript::Utterance;
use rapport_redaction::{ConsentRecord, RedactionDecision};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::PersistenceError;
use crate::state::StatusView;

/// Session setup owned by the external session store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Planned topics.
    #[serde(default)]
    pub topics: Vec<TopicStatus>,
    /// Planned length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_duration_secs: Option<u64>,
}

/// What a record holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordKind {
    /// Lifecycle change.
    Status(StatusView),
    /// Ingested utterance with annotations.
    Utterance(Utterance),
    /// PII found in an utterance.
    Detections(Vec<PiiDetection>),
    /// A prompt was displayed or answered.
    CoachingEvent(CoachingPromptEvent),
    /// A topic changed coverage.
    TopicStatus(TopicStatus),
    /// A comment.
    Comment(Comment),
    /// An insight.
    Insight(Insight),
    /// A redaction decision.
    RedactionDecision(RedactionDecision),
    /// A consent answer.
    Consent(ConsentRecord),
}

/// One appended record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceRecord {
    /// When the session produced it.
    pub recorded_at: DateTime<Utc>,
    /// Payload.
    #[serde(flatten)]
    pub kind: RecordKind,
}

impl PersistenceRecord {
    /// Record stamped at `recorded_at`.
    pub fn new(recorded_at: DateTime<Utc>, kind: RecordKind) -> Self {
        Self { recorded_at, kind }
    }
}

/// Append-only writer keyed by session.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Append one record.
    async fn append(
        &self,
        session_id: &SessionId,
        record: &PersistenceRecord,
    ) -> Result<(), PersistenceError>;
}

/// Reads session setup on connect.
#[async_trait]
pub trait SessionReader: Send + Sync {
    /// Metadata for a session, `None` when the store has none.
    async fn load_metadata(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionMetadata>, PersistenceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<SessionId, Vec<PersistenceRecord>>,
    metadata: HashMap<SessionId, SessionMetadata>,
    fail_next: u32,
    stalled: bool,
    attempts: u64,
}

/// In-memory store for tests and development.
#[derive(Clone, Debug, Default)]
pub struct MemoryPersistence {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed metadata for a session.
    pub fn insert_metadata(&self, session_id: SessionId, metadata: SessionMetadata) {
        let _ = self.inner.lock().metadata.insert(session_id, metadata);
    }

    /// Make the next `n` appends fail.
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().fail_next = n;
    }

    /// Make every later append hang without completing.
    pub fn stall(&self) {
        self.inner.lock().stalled = true;
    }

    /// Records appended for a session.
    pub fn records(&self, session_id: &SessionId) -> Vec<PersistenceRecord> {
        self.inner
            .lock()
            .records
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append attempts, including failed ones.
    pub fn attempts(&self) -> u64 {
        self.inner.lock().attempts
    }
}

#[async_trait]
impl PersistenceSink for MemoryPersistence {
    async fn append(
        &self,
        session_id: &SessionId,
        record: &PersistenceRecord,
    ) -> Result<(), PersistenceError> {
        let stalled = {
            let mut inner = self.inner.lock();
            inner.attempts += 1;
            inner.stalled
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut inner = self.inner.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(PersistenceError::Unavailable("injected failure".into()));
        }
        inner
            .records
            .entry(session_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionReader for MemoryPersistence {
    async fn load_metadata(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionMetadata>, PersistenceError> {
        Ok(self.inner.lock().metadata.get(session_id).cloned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON lines
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only JSON-lines files: `<dir>/<session>.jsonl` for records and
/// `<dir>/<session>.meta.json` for metadata.
#[derive(Clone, Debug)]
pub struct JsonlPersistence {
    dir: PathBuf,
}

impl JsonlPersistence {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(session_id: &SessionId, suffix: &str) -> String {
        let safe: String = session_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{safe}{suffix}")
    }

    /// Path of a session's record log.
    pub fn records_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(Self::file_name(session_id, ".jsonl"))
    }

    /// Path of a session's metadata file.
    pub fn metadata_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(Self::file_name(session_id, ".meta.json"))
    }

    /// Write metadata for a session.
    pub async fn write_metadata(
        &self,
        session_id: &SessionId,
        metadata: &SessionMetadata,
    ) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(self.metadata_path(session_id), json).await?;
        Ok(())
    }

    /// Read back every record of a session, in append order.
    pub async fn read_records(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<PersistenceRecord>, PersistenceError> {
        let content = match tokio::fs::read_to_string(self.records_path(session_id)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(PersistenceError::from))
            .collect()
    }
}

#[async_trait]
impl PersistenceSink for JsonlPersistence {
    async fn append(
        &self,
        session_id: &SessionId,
        record: &PersistenceRecord,
    ) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path(session_id))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionReader for JsonlPersistence {
    async fn load_metadata(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionMetadata>, PersistenceError> {
        match tokio::fs::read(self.metadata_path(session_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session_id = %session_id, "no session metadata on disk");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rapport_core::session::SessionStatus;
    use rapport_core::transcript::Speaker;

    use super::*;

    fn record(text: &str) -> PersistenceRecord {
        PersistenceRecord::new(
            Utc::now(),
            RecordKind::Utterance(Utterance::new(Speaker::Participant, text, 1.0)),
        )
    }

    #[test]
    fn record_wire_shape() {
        let v = serde_json::to_value(record("hi")).unwrap();
        assert_eq!(v["kind"], "utterance");
        assert_eq!(v["data"]["text"], "hi");
        assert!(v["recordedAt"].is_string());
    }

    #[tokio::test]
    async fn memory_append_and_fail_injection() {
        let store = MemoryPersistence::new();
        let sid = SessionId::from_raw("sess_mem");
        store.fail_next(1);
        assert_matches!(
            store.append(&sid, &record("a")).await,
            Err(PersistenceError::Unavailable(_))
        );
        store.append(&sid, &record("b")).await.unwrap();
        assert_eq!(store.records(&sid).len(), 1);
        assert_eq!(store.attempts(), 2);
    }

    #[tokio::test]
    async fn memory_metadata() {
        let store = MemoryPersistence::new();
        let sid = SessionId::from_raw("sess_meta");
        assert_eq!(store.load_metadata(&sid).await.unwrap(), None);
        store.insert_metadata(
            sid.clone(),
            SessionMetadata {
                planned_duration_secs: Some(1800),
                ..SessionMetadata::default()
            },
        );
        let meta = store.load_metadata(&sid).await.unwrap().unwrap();
        assert_eq!(meta.planned_duration_secs, Some(1800));
    }

    #[tokio::test]
    async fn jsonl_appends_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPersistence::new(dir.path().join("sessions"));
        let sid = SessionId::from_raw("sess_disk");
        store.append(&sid, &record("first")).await.unwrap();
        let status = StatusView {
            status: SessionStatus::Running,
            started_at: Some(Utc::now()),
            ended_at: None,
            paused_at: None,
            effective_secs: 0.0,
            active_speaker: Speaker::Interviewer,
        };
        store
            .append(&sid, &PersistenceRecord::new(Utc::now(), RecordKind::Status(status)))
            .await
            .unwrap();
        let back = store.read_records(&sid).await.unwrap();
        assert_eq!(back.len(), 2);
        assert_matches!(&back[0].kind, RecordKind::Utterance(u) if u.text == "first");
        assert_matches!(&back[1].kind, RecordKind::Status(_));
    }

    #[tokio::test]
    async fn jsonl_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPersistence::new(dir.path());
        let sid = SessionId::from_raw("sess/../odd");
        assert_eq!(store.load_metadata(&sid).await.unwrap(), None);
        let meta = SessionMetadata {
            title: Some("Checkout study".into()),
            topics: vec![TopicStatus::new("Pricing").with_keywords(["cost"])],
            planned_duration_secs: Some(2700),
        };
        store.write_metadata(&sid, &meta).await.unwrap();
        assert!(store.metadata_path(&sid).starts_with(dir.path()));
        assert_eq!(store.load_metadata(&sid).await.unwrap(), Some(meta));
    }

    #[tokio::test]
    async fn jsonl_missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPersistence::new(dir.path());
        assert!(store.read_records(&SessionId::from_raw("none")).await.unwrap().is_empty());
    }
}
