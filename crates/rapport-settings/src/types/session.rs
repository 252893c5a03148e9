//! Session actor and persistence settings.

use rapport_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};

/// Session actor behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Bounded command queue per session.
    pub queue_capacity: usize,
    /// Periodic timer tick in milliseconds (topic reminders).
    pub tick_interval_ms: u64,
    /// How long an ended session stays registered, in milliseconds.
    pub grace_period_ms: u64,
    /// Broadcasts retained for reconnect gap-fill.
    pub replay_buffer: usize,
    /// Planned duration for sessions whose metadata has none, in seconds.
    pub default_planned_duration_secs: Option<u64>,
    /// Fraction of planned duration after which uncovered topics trigger reminders.
    pub topic_reminder_fraction: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            tick_interval_ms: 5_000,
            grace_period_ms: 30_000,
            replay_buffer: 512,
            default_planned_duration_secs: None,
            topic_reminder_fraction: 0.8,
        }
    }
}

/// Persistence writer behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    /// Directory for JSON-lines session logs. Relative paths resolve
    /// against `~/.rapport`.
    pub directory: String,
    /// Bounded writer queue per session.
    pub queue_capacity: usize,
    /// Retry policy for failed appends.
    pub retry: RetryConfig,
    /// Deadline for one append attempt; an expired attempt counts as a
    /// failure.
    pub append_timeout_ms: u64,
    /// Deadline for the final flush when a session closes.
    pub flush_timeout_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            directory: "sessions".to_string(),
            queue_capacity: 1024,
            retry: RetryConfig::default(),
            append_timeout_ms: 5_000,
            flush_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_persistence_retry() {
        let p: PersistenceSettings =
            serde_json::from_str(r#"{"retry": {"maxRetries": 9}}"#).unwrap();
        assert_eq!(p.retry.max_retries, 9);
        assert_eq!(p.directory, "sessions");
        assert_eq!(p.append_timeout_ms, 5_000);
    }

    #[test]
    fn persistence_deadlines_from_json() {
        let p: PersistenceSettings =
            serde_json::from_str(r#"{"appendTimeoutMs": 250, "flushTimeoutMs": 1000}"#).unwrap();
        assert_eq!(p.append_timeout_ms, 250);
        assert_eq!(p.flush_timeout_ms, 1_000);
    }
}
