//! The per-session actor.
//!
//! One task owns all mutable state of a session. Commands, transcript
//! utterances, timer firings and writer warnings are serialized through its
//! queue, so no lock guards session state and every broadcast leaves in the
//! order its mutation happened.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant as StdInstant;

use chrono::{DateTime, Utc};
use rapport_analysis::AnalyzerPipeline;
use rapport_coaching::{CoachingEngine, PromptCandidate, signals};
use rapport_core::clock::Clock;
use rapport_core::errors::LiveError;
use rapport_core::ids::{CommentId, InsightId, PromptEventId, SessionId, UtteranceId};
use rapport_core::metrics::{
    ANALYZER_FAILURES_TOTAL, COACHING_PROMPTS_TOTAL, SESSIONS_ACTIVE, UTTERANCE_PIPELINE_SECONDS,
    UTTERANCES_PROCESSED_TOTAL,
};
use rapport_core::session::{Comment, Identity, Insight, SessionStatus};
use rapport_core::transcript::{Speaker, Utterance};
use rapport_redaction::{RedactionDecision, RedactionService};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::command::Command;
use crate::config::SessionConfig;
use crate::event::{
    AnalyzedUtterance, DisplayUpdate, RedactionUpdate, SessionEvent, SessionSnapshot,
    SessionWarning, TranscriptLine,
};
use crate::persistence::{PersistenceRecord, PersistenceSink, RecordKind, SessionMetadata};
use crate::sink::EventSink;
use crate::state::Session;
use crate::writer::{PersistenceWriter, WritePolicy};

/// Reply to an accepted command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    /// Wire name of the command.
    pub command: &'static str,
    /// ID of the entity the command created, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

enum ActorMessage {
    Command {
        command: Command,
        identity: Identity,
        reply: oneshot::Sender<Result<CommandAck, LiveError>>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    AutoDismiss(PromptEventId),
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    /// Broadcast target.
    pub sink: Arc<dyn EventSink>,
    /// Persistence target.
    pub persistence: Arc<dyn PersistenceSink>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable address of a running session actor.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<ActorMessage>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Session this handle addresses.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Queue a command and wait for its outcome.
    #[instrument(skip(self, command), fields(session_id = %self.id, command = command.name(), user_id = %identity.user_id))]
    pub async fn dispatch(
        &self,
        command: Command,
        identity: Identity,
    ) -> Result<CommandAck, LiveError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::Command {
                command,
                identity,
                reply,
            })
            .await
            .map_err(|_| LiveError::Internal("session actor stopped".into()))?;
        rx.await
            .map_err(|_| LiveError::Internal("session actor dropped the reply".into()))?
    }

    /// Full state for a connecting or resyncing client.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, LiveError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::Snapshot(reply))
            .await
            .map_err(|_| LiveError::Internal("session actor stopped".into()))?;
        rx.await
            .map_err(|_| LiveError::Internal("session actor dropped the reply".into()))
    }

    /// Stop the actor. A live session is ended first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles address the same actor instance.
    pub fn same_actor(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of one session's state.
pub struct SessionActor {
    session: Session,
    pipeline: AnalyzerPipeline,
    coaching: CoachingEngine,
    redaction: RedactionService,
    utterances: Vec<Utterance>,
    utterance_index: HashMap<UtteranceId, usize>,
    comments: Vec<Comment>,
    insights: Vec<Insight>,
    config: SessionConfig,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    writer: PersistenceWriter,
    warnings: mpsc::Receiver<SessionWarning>,
    self_tx: mpsc::WeakSender<ActorMessage>,
    timers: CancellationToken,
    cancel: CancellationToken,
    closing_at: Option<Instant>,
}

impl SessionActor {
    /// Spawn the actor for `id` and return its handle.
    pub fn spawn(
        id: SessionId,
        metadata: SessionMetadata,
        config: SessionConfig,
        deps: SessionDeps,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (warn_tx, warn_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let writer = PersistenceWriter::spawn(
            id.clone(),
            deps.persistence,
            WritePolicy {
                retry: config.retry.clone(),
                append_timeout: config.append_timeout,
            },
            config.persistence_queue,
            warn_tx,
        );
        let planned = metadata
            .planned_duration_secs
            .or(config.default_planned_duration_secs);
        let session = Session::new(id.clone(), deps.clock.now())
            .with_topics(metadata.topics)
            .with_planned_duration(planned);

        let actor = Self {
            session,
            pipeline: AnalyzerPipeline::new(config.pipeline.clone()),
            coaching: CoachingEngine::from_settings(&config.coaching, config.cultural_context),
            redaction: RedactionService::new(),
            utterances: Vec::new(),
            utterance_index: HashMap::new(),
            comments: Vec::new(),
            insights: Vec::new(),
            sink: deps.sink,
            clock: deps.clock,
            writer,
            warnings: warn_rx,
            self_tx: tx.downgrade(),
            timers: cancel.child_token(),
            cancel: cancel.clone(),
            closing_at: None,
            config,
        };
        let handle = SessionHandle { id, tx, cancel };
        let join = tokio::spawn(actor.run(rx));
        (handle, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ActorMessage>) {
        info!(session_id = %self.session.id, "session actor started");
        metrics::gauge!(SESSIONS_ACTIVE).increment(1.0);

        let period = self.config.tick_interval.max(std::time::Duration::from_millis(10));
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        loop {
            let closing_at = self.closing_at;
            tokio::select! {
                () = cancel.cancelled() => {
                    self.shut_down().await;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => {
                        self.shut_down().await;
                        break;
                    }
                },
                _ = tick.tick() => self.on_tick(),
                Some(warning) = self.warnings.recv() => {
                    self.publish(SessionEvent::Warning(warning));
                }
                () = tokio::time::sleep_until(closing_at.unwrap_or_else(Instant::now)), if closing_at.is_some() => {
                    debug!(session_id = %self.session.id, "grace period over");
                    break;
                }
            }
        }

        metrics::gauge!(SESSIONS_ACTIVE).decrement(1.0);
        info!(session_id = %self.session.id, "session actor stopped");
    }

    async fn handle(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::Command {
                command,
                identity,
                reply,
            } => {
                let result = self.execute(command, &identity).await;
                if let Err(e) = &result {
                    debug!(session_id = %self.session.id, code = e.code(), error = %e, "command rejected");
                }
                let _ = reply.send(result);
            }
            ActorMessage::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            ActorMessage::AutoDismiss(id) => {
                let now = self.clock.now();
                if let Some(event) = self.coaching.auto_dismiss(&id, now) {
                    debug!(session_id = %self.session.id, prompt_id = %id, "prompt auto-snoozed");
                    self.persist(now, RecordKind::CoachingEvent(event.clone()));
                    self.publish(SessionEvent::CoachingResponse(event));
                }
            }
        }
    }

    #[instrument(skip_all, fields(session_id = %self.session.id, command = command.name()))]
    async fn execute(
        &mut self,
        command: Command,
        identity: &Identity,
    ) -> Result<CommandAck, LiveError> {
        let name = command.name();
        if command.requires_host() && !identity.is_host() {
            return Err(LiveError::PermissionDenied {
                command: name.to_string(),
            });
        }
        command.validate()?;
        self.session.ensure_open(name)?;

        let now = self.clock.now();
        let id = match command {
            Command::Utterance {
                speaker,
                text,
                start_time,
                end_time,
                confidence,
            } => {
                let id = self.ingest(speaker, text, start_time, end_time, confidence, now)?;
                Some(id.to_string())
            }
            Command::Start => {
                self.session.start(now)?;
                self.status_changed(now);
                None
            }
            Command::Pause => {
                self.session.pause(now)?;
                self.status_changed(now);
                None
            }
            Command::Resume => {
                self.session.resume(now)?;
                self.status_changed(now);
                None
            }
            Command::Stop => {
                self.session.stop(now)?;
                self.status_changed(now);
                self.close().await;
                None
            }
            Command::FlagInsight { timestamp } => {
                Some(self.flag_insight(identity, timestamp, now)?.to_string())
            }
            Command::ToggleSpeaker => {
                let active_speaker = self.session.toggle_speaker();
                self.publish(SessionEvent::SpeakerToggled { active_speaker });
                None
            }
            Command::RespondToCoaching { event_id, response } => {
                let event = self.coaching.respond(&event_id, response, now)?.clone();
                self.persist(now, RecordKind::CoachingEvent(event.clone()));
                self.publish(SessionEvent::CoachingResponse(event));
                None
            }
            Command::UpdateTopic { topic_name, status } => {
                if let Some(topic) = self.session.update_topic(&topic_name, status, now)? {
                    self.persist(now, RecordKind::TopicStatus(topic.clone()));
                    self.publish(SessionEvent::TopicStatus(topic));
                }
                None
            }
            Command::Comment {
                text,
                utterance_id,
                timestamp,
            } => Some(self.comment(identity, text, utterance_id, timestamp, now)?.to_string()),
            Command::ApplyRedaction {
                detection_id,
                action,
                replacement,
            } => {
                let decision = self
                    .redaction
                    .apply_redaction(action, &detection_id, replacement, identity.user_id.clone(), now)?
                    .clone();
                let affected = self
                    .redaction
                    .detection(&detection_id)
                    .map(|d| d.utterance_id.clone());
                self.persist(now, RecordKind::RedactionDecision(decision.clone()));
                self.redaction_changed(affected, vec![decision]);
                None
            }
            Command::BatchRedact { pii_type } => {
                let ids = self.redaction.batch_redact(pii_type, &identity.user_id, now);
                let decisions: Vec<_> = ids
                    .iter()
                    .filter_map(|id| self.redaction.decision(id).cloned())
                    .collect();
                let affected: BTreeSet<UtteranceId> = ids
                    .iter()
                    .filter_map(|id| self.redaction.detection(id))
                    .map(|d| d.utterance_id.clone())
                    .collect();
                for d in &decisions {
                    self.persist(now, RecordKind::RedactionDecision(d.clone()));
                }
                self.redaction_changed(affected, decisions);
                None
            }
            Command::RecordConsent {
                subject,
                kind,
                granted,
            } => {
                let record = self
                    .redaction
                    .record_consent(subject, kind, granted, identity.user_id.clone(), now)
                    .clone();
                self.persist(now, RecordKind::Consent(record));
                self.redaction_changed(None, Vec::new());
                None
            }
        };
        Ok(CommandAck { command: name, id })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transcript
    // ─────────────────────────────────────────────────────────────────────

    fn ingest(
        &mut self,
        speaker: Option<Speaker>,
        text: String,
        start_time: f64,
        end_time: Option<f64>,
        confidence: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<UtteranceId, LiveError> {
        self.session.ensure_running("utterance")?;
        if let Some(last) = self.utterances.last() {
            if start_time < last.start_time {
                return Err(LiveError::validation(format!(
                    "startTime {start_time} precedes the previous utterance at {}",
                    last.start_time
                )));
            }
        }
        let started = StdInstant::now();

        let speaker = speaker.unwrap_or(self.session.active_speaker);
        let mut utterance = Utterance::new(speaker, text, start_time);
        if let Some(end) = end_time {
            utterance = utterance.with_end(end);
        }
        utterance.confidence = confidence;

        let analysis = self.pipeline.process(&utterance, &self.session.topics);
        analysis.annotate(&mut utterance);
        for failure in &analysis.failures {
            metrics::counter!(ANALYZER_FAILURES_TOTAL, "analyzer" => failure.analyzer.as_str())
                .increment(1);
        }

        let _ = self.redaction.add_detections(analysis.pii.iter().cloned());
        let covered = self.session.cover_inferred(&analysis.newly_covered_topics, now);
        let display_text = self
            .redaction
            .apply_redactions_to_text(&utterance.text, &utterance.id);
        let id = utterance.id.clone();

        self.persist(now, RecordKind::Utterance(utterance.clone()));
        if !analysis.pii.is_empty() {
            self.persist(now, RecordKind::Detections(analysis.pii.clone()));
        }
        let _ = self.utterance_index.insert(id.clone(), self.utterances.len());
        self.utterances.push(utterance.clone());

        let candidates = signals::from_analysis(&analysis, &self.config.signals);
        let alerts = analysis.bias_alerts.clone();
        self.publish(SessionEvent::UtteranceAnalyzed(Box::new(AnalyzedUtterance {
            line: TranscriptLine {
                utterance,
                display_text,
            },
            analysis,
        })));
        for alert in alerts {
            self.publish(SessionEvent::BiasAlert(alert));
        }
        for topic in covered {
            self.persist(now, RecordKind::TopicStatus(topic.clone()));
            self.publish(SessionEvent::TopicStatus(topic));
        }
        self.offer_prompts(candidates, now);

        metrics::counter!(UTTERANCES_PROCESSED_TOTAL).increment(1);
        metrics::histogram!(UTTERANCE_PIPELINE_SECONDS).record(started.elapsed().as_secs_f64());
        Ok(id)
    }

    fn utterance_at(&self, timestamp: f64) -> Option<UtteranceId> {
        self.utterances
            .iter()
            .rev()
            .find(|u| u.start_time <= timestamp && u.end_time.is_none_or(|end| timestamp <= end))
            .map(|u| u.id.clone())
    }

    fn flag_insight(
        &mut self,
        identity: &Identity,
        timestamp: f64,
        now: DateTime<Utc>,
    ) -> Result<InsightId, LiveError> {
        if self.session.status == SessionStatus::Draft {
            return Err(LiveError::state("flagInsight", self.session.status));
        }
        let insight = Insight {
            id: InsightId::new(),
            flagged_by: identity.user_id.clone(),
            timestamp,
            utterance_id: self.utterance_at(timestamp),
            created_at: now,
        };
        let id = insight.id.clone();
        self.insights.push(insight.clone());
        self.persist(now, RecordKind::Insight(insight.clone()));
        self.publish(SessionEvent::InsightFlagged(insight));
        Ok(id)
    }

    fn comment(
        &mut self,
        identity: &Identity,
        text: String,
        utterance_id: Option<UtteranceId>,
        timestamp: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<CommentId, LiveError> {
        if let Some(uid) = &utterance_id {
            if !self.utterance_index.contains_key(uid) {
                return Err(LiveError::NotFound {
                    kind: "utterance",
                    id: uid.to_string(),
                });
            }
        }
        let comment = Comment {
            id: CommentId::new(),
            author: identity.user_id.clone(),
            text,
            utterance_id,
            timestamp,
            created_at: now,
        };
        let id = comment.id.clone();
        self.comments.push(comment.clone());
        self.persist(now, RecordKind::Comment(comment.clone()));
        self.publish(SessionEvent::CommentAdded(comment));
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Coaching
    // ─────────────────────────────────────────────────────────────────────

    fn offer_prompts(&mut self, candidates: Vec<PromptCandidate>, now: DateTime<Utc>) {
        if candidates.is_empty() {
            return;
        }
        let visible = self.coaching.delivery().is_visible();
        for event in self.coaching.evaluate_all(candidates, now) {
            metrics::counter!(COACHING_PROMPTS_TOTAL, "prompt_type" => event.prompt_type.as_str())
                .increment(1);
            self.persist(now, RecordKind::CoachingEvent(event.clone()));
            if visible {
                self.schedule_auto_dismiss(event.id.clone());
                self.publish(SessionEvent::CoachingPrompt(event));
            }
        }
    }

    fn schedule_auto_dismiss(&self, id: PromptEventId) {
        let Some(after) = self.coaching.delivery().auto_dismiss else {
            return;
        };
        let token = self.timers.clone();
        let tx = self.self_tx.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(ActorMessage::AutoDismiss(id)).await;
                    }
                }
            }
        });
    }

    #[allow(clippy::cast_precision_loss)]
    fn on_tick(&mut self) {
        if self.session.status != SessionStatus::Running {
            return;
        }
        let Some(planned) = self.session.planned_duration_secs else {
            return;
        };
        let now = self.clock.now();
        let uncovered = self.session.uncovered_topics();
        let elapsed = self.session.effective_secs(now);
        if let Some(candidate) =
            signals::topic_reminder(elapsed, planned as f64, &uncovered, &self.config.signals)
        {
            self.offer_prompts(vec![candidate], now);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Redaction
    // ─────────────────────────────────────────────────────────────────────

    fn redaction_changed(
        &self,
        affected: impl IntoIterator<Item = UtteranceId>,
        decisions: Vec<RedactionDecision>,
    ) {
        let updates = affected
            .into_iter()
            .filter_map(|uid| {
                let utterance = self.utterances.get(*self.utterance_index.get(&uid)?)?;
                Some(DisplayUpdate {
                    display_text: self.redaction.apply_redactions_to_text(&utterance.text, &uid),
                    utterance_id: uid,
                })
            })
            .collect();
        self.publish(SessionEvent::RedactionUpdated(RedactionUpdate {
            updates,
            decisions,
            summary: self.redaction.summary(),
        }));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    fn status_changed(&mut self, now: DateTime<Utc>) {
        let view = self.session.view(now);
        info!(session_id = %self.session.id, status = %view.status, "session status changed");
        self.persist(now, RecordKind::Status(view.clone()));
        self.publish(SessionEvent::Status(view));
    }

    /// Cancel timers, flush persistence (bounded by `flush_timeout`), close
    /// connections, start the grace period.
    async fn close(&mut self) {
        if self.closing_at.is_some() {
            return;
        }
        self.timers.cancel();
        match tokio::time::timeout(self.config.flush_timeout, self.writer.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %self.session.id, error = %e, "final persistence flush failed");
            }
            Err(_) => warn!(
                session_id = %self.session.id,
                timeout_ms = u64::try_from(self.config.flush_timeout.as_millis()).unwrap_or(u64::MAX),
                "final persistence flush timed out, closing anyway"
            ),
        }
        self.sink.session_closed(&self.session.id);
        self.closing_at = Some(Instant::now() + self.config.grace_period);
    }

    async fn shut_down(&mut self) {
        if !self.session.status.is_terminal() {
            let now = self.clock.now();
            if self.session.stop(now).is_ok() {
                self.status_changed(now);
            }
        }
        self.close().await;
    }

    fn persist(&self, now: DateTime<Utc>, kind: RecordKind) {
        self.writer.append(PersistenceRecord::new(now, kind));
    }

    fn publish(&self, event: SessionEvent) {
        self.sink.publish(&self.session.id, event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        let now = self.clock.now();
        SessionSnapshot {
            session_id: self.session.id.clone(),
            status: self.session.view(now),
            topics: self.session.topics.clone(),
            planned_duration_secs: self.session.planned_duration_secs,
            transcript: self
                .utterances
                .iter()
                .map(|u| TranscriptLine {
                    display_text: self.redaction.apply_redactions_to_text(&u.text, &u.id),
                    utterance: u.clone(),
                })
                .collect(),
            prompts: self.coaching.prompts().to_vec(),
            coaching: self.coaching.stats(),
            comments: self.comments.clone(),
            insights: self.insights.clone(),
            aggregates: self.pipeline.snapshot(),
            redaction: self.redaction.summary(),
        }
    }
}
