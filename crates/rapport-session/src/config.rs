//! Per-session runtime configuration.

use std::time::Duration;

use rapport_analysis::PipelineConfig;
use rapport_coaching::SignalConfig;
use rapport_core::retry::RetryConfig;
use rapport_settings::{CoachingSettings, CulturalContext, RapportSettings};

/// Everything a session actor needs from settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Session queue capacity.
    pub queue_capacity: usize,
    /// Period of the topic-reminder tick.
    pub tick_interval: Duration,
    /// How long an ended session stays registered.
    pub grace_period: Duration,
    /// Planned length when metadata has none.
    pub default_planned_duration_secs: Option<u64>,
    /// Analyzer pipeline tuning.
    pub pipeline: PipelineConfig,
    /// Coaching signal tuning.
    pub signals: SignalConfig,
    /// Coaching thresholds and delivery.
    pub coaching: CoachingSettings,
    /// Cultural context for coaching thresholds.
    pub cultural_context: CulturalContext,
    /// Persistence writer queue capacity.
    pub persistence_queue: usize,
    /// Persistence retry policy.
    pub retry: RetryConfig,
    /// Deadline for one append attempt.
    pub append_timeout: Duration,
    /// Deadline for the final flush on close.
    pub flush_timeout: Duration,
}

impl SessionConfig {
    /// Assemble from loaded settings.
    pub fn from_settings(settings: &RapportSettings) -> Self {
        Self {
            queue_capacity: settings.session.queue_capacity,
            tick_interval: Duration::from_millis(settings.session.tick_interval_ms),
            grace_period: Duration::from_millis(settings.session.grace_period_ms),
            default_planned_duration_secs: settings.session.default_planned_duration_secs,
            pipeline: PipelineConfig::from(&settings.analysis),
            signals: SignalConfig::new(&settings.analysis, &settings.session),
            coaching: settings.coaching.clone(),
            cultural_context: settings.analysis.cultural_context,
            persistence_queue: settings.persistence.queue_capacity,
            retry: settings.persistence.retry.clone(),
            append_timeout: Duration::from_millis(settings.persistence.append_timeout_ms),
            flush_timeout: Duration::from_millis(settings.persistence.flush_timeout_ms),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&RapportSettings::default())
    }
}
