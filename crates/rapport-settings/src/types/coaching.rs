//! Coaching policy settings.

use std::collections::BTreeMap;

use rapport_core::coaching::PromptType;
use serde::{Deserialize, Serialize};

/// Named threshold/cooldown bundles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingPreset {
    /// Few, high-confidence prompts.
    Minimal,
    /// The default.
    #[default]
    Balanced,
    /// Frequent prompts.
    Active,
    /// Use [`CustomThresholds`].
    Custom,
}

impl CoachingPreset {
    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "balanced" => Some(Self::Balanced),
            "active" => Some(Self::Active),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Where prompts appear in the moderator's UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Transient popup.
    #[default]
    Toast,
    /// Persistent side panel.
    Sidebar,
    /// Logged only; nothing displayed.
    Silent,
}

/// Thresholds used when the preset is `custom`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomThresholds {
    /// Minimum confidence for any prompt.
    pub confidence_threshold: f64,
    /// Cooldown applied to every prompt type, in seconds. `<= 0` disables throttling.
    pub cooldown_secs: f64,
    /// Per-type threshold overrides.
    pub type_thresholds: BTreeMap<PromptType, f64>,
    /// Per-type cooldown overrides in seconds.
    pub type_cooldown_secs: BTreeMap<PromptType, f64>,
}

impl Default for CustomThresholds {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            cooldown_secs: 60.0,
            type_thresholds: BTreeMap::new(),
            type_cooldown_secs: BTreeMap::new(),
        }
    }
}

/// Coaching prompt policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoachingSettings {
    /// Master switch.
    pub enabled: bool,
    /// Threshold/cooldown preset.
    pub preset: CoachingPreset,
    /// Values for the `custom` preset.
    pub custom: CustomThresholds,
    /// Delivery mode.
    pub delivery_mode: DeliveryMode,
    /// Seconds before an unanswered prompt auto-snoozes. `None` disables.
    pub auto_dismiss_secs: Option<u64>,
}

impl Default for CoachingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: CoachingPreset::Balanced,
            custom: CustomThresholds::default(),
            delivery_mode: DeliveryMode::Toast,
            auto_dismiss_secs: Some(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_parse() {
        assert_eq!(CoachingPreset::parse("ACTIVE"), Some(CoachingPreset::Active));
        assert_eq!(CoachingPreset::parse("loud"), None);
    }

    #[test]
    fn custom_type_maps_use_snake_case_keys() {
        let c: CustomThresholds = serde_json::from_str(
            r#"{"typeCooldownSecs": {"bias_alert": 10.0}, "typeThresholds": {"sentiment_dip": 0.3}}"#,
        )
        .unwrap();
        assert_eq!(c.type_cooldown_secs.get(&PromptType::BiasAlert), Some(&10.0));
        assert_eq!(c.type_thresholds.get(&PromptType::SentimentDip), Some(&0.3));
        assert!((c.cooldown_secs - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn auto_dismiss_null_disables() {
        let c: CoachingSettings = serde_json::from_str(r#"{"autoDismissSecs": null}"#).unwrap();
        assert_eq!(c.auto_dismiss_secs, None);
    }
}
