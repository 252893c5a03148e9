//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs the fields it changes.

mod analysis;
mod coaching;
mod server;
mod session;

pub use analysis::*;
pub use coaching::*;
pub use server::*;
pub use session::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RapportSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Coaching prompt policy.
    pub coaching: CoachingSettings,
    /// Analyzer tuning.
    pub analysis: AnalysisSettings,
    /// Session actor behavior.
    pub session: SessionSettings,
    /// Persistence writer behavior.
    pub persistence: PersistenceSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for RapportSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "rapport".to_string(),
            server: ServerSettings::default(),
            coaching: CoachingSettings::default(),
            analysis: AnalysisSettings::default(),
            session: SessionSettings::default(),
            persistence: PersistenceSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RapportSettings {
    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.server.heartbeat_timeout_ms <= self.server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutMs ({}) must exceed heartbeatIntervalMs ({})",
                self.server.heartbeat_timeout_ms, self.server.heartbeat_interval_ms
            )));
        }
        if self.server.latency_degraded_ms < self.server.latency_good_ms {
            return Err(SettingsError::InvalidValue(
                "server.latencyDegradedMs must be >= latencyGoodMs".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 || self.session.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "queue capacities must be positive".into(),
            ));
        }
        let threshold = self.coaching.custom.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SettingsError::InvalidValue(format!(
                "coaching.custom.confidenceThreshold {threshold} outside [0, 1]"
            )));
        }
        if !(0.0..=1.0).contains(&self.session.topic_reminder_fraction) {
            return Err(SettingsError::InvalidValue(
                "session.topicReminderFraction outside [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        assert!(RapportSettings::default().validate().is_ok());
    }

    #[test]
    fn heartbeat_timeout_must_exceed_interval() {
        let mut s = RapportSettings::default();
        s.server.heartbeat_timeout_ms = s.server.heartbeat_interval_ms;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn threshold_range_checked() {
        let mut s = RapportSettings::default();
        s.coaching.custom.confidence_threshold = 1.5;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("confidenceThreshold"));
    }

    #[test]
    fn zero_queue_rejected() {
        let mut s = RapportSettings::default();
        s.session.queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn json_shape_is_camel_case() {
        let json = serde_json::to_value(RapportSettings::default()).unwrap();
        assert!(json["server"]["wsPort"].is_u64());
        assert!(json["coaching"]["autoDismissSecs"].is_u64());
        assert!(json["session"]["gracePeriodMs"].is_u64());
    }
}
