//! Thresholds and delivery policy.

use std::collections::BTreeMap;
use std::time::Duration;

use rapport_core::coaching::PromptType;
use rapport_settings::{CoachingPreset, CoachingSettings, CulturalContext, DeliveryMode};

/// Confidence threshold and cooldown per prompt type.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdsPolicy {
    confidence_threshold: f64,
    cooldown_secs: f64,
    type_thresholds: BTreeMap<PromptType, f64>,
    type_cooldown_secs: BTreeMap<PromptType, f64>,
    cultural_context: CulturalContext,
}

impl Default for ThresholdsPolicy {
    fn default() -> Self {
        Self::preset(CoachingPreset::Balanced)
    }
}

/// Threshold shift a cultural context applies to one prompt type.
///
/// High-context speakers understate negative feeling and leave longer turns
/// to the interviewer, so dips are surfaced earlier and talk-time nudges later.
/// Low-context speakers are explicit, so the reverse holds.
#[must_use]
pub const fn cultural_adjustment(context: CulturalContext, prompt_type: PromptType) -> f64 {
    match (context, prompt_type) {
        (CulturalContext::HighContext, PromptType::SentimentDip) => -0.1,
        (CulturalContext::HighContext, PromptType::TalkTimeBalance) => 0.1,
        (CulturalContext::HighContext, PromptType::LeadingQuestion) => -0.05,
        (CulturalContext::LowContext, PromptType::SentimentDip) => 0.1,
        (CulturalContext::LowContext, PromptType::TalkTimeBalance) => -0.05,
        _ => 0.0,
    }
}

impl ThresholdsPolicy {
    /// Policy for a named preset. `Custom` without settings falls back to
    /// the balanced values.
    #[must_use]
    pub fn preset(preset: CoachingPreset) -> Self {
        let (threshold, cooldown) = match preset {
            CoachingPreset::Minimal => (0.8, 180.0),
            CoachingPreset::Balanced | CoachingPreset::Custom => (0.6, 60.0),
            CoachingPreset::Active => (0.4, 20.0),
        };
        Self::uniform(threshold, cooldown)
    }

    /// Same threshold and cooldown for every type.
    #[must_use]
    pub fn uniform(confidence_threshold: f64, cooldown_secs: f64) -> Self {
        Self {
            confidence_threshold,
            cooldown_secs,
            type_thresholds: BTreeMap::new(),
            type_cooldown_secs: BTreeMap::new(),
            cultural_context: CulturalContext::General,
        }
    }

    /// Policy from coaching settings and the analysis cultural context.
    #[must_use]
    pub fn from_settings(settings: &CoachingSettings, cultural_context: CulturalContext) -> Self {
        let policy = if settings.preset == CoachingPreset::Custom {
            Self {
                confidence_threshold: settings.custom.confidence_threshold,
                cooldown_secs: settings.custom.cooldown_secs,
                type_thresholds: settings.custom.type_thresholds.clone(),
                type_cooldown_secs: settings.custom.type_cooldown_secs.clone(),
                cultural_context: CulturalContext::General,
            }
        } else {
            Self::preset(settings.preset)
        };
        policy.with_cultural_context(cultural_context)
    }

    /// Replace the cultural context.
    #[must_use]
    pub fn with_cultural_context(mut self, context: CulturalContext) -> Self {
        self.cultural_context = context;
        self
    }

    /// Override one type's cooldown.
    #[must_use]
    pub fn with_type_cooldown(mut self, prompt_type: PromptType, secs: f64) -> Self {
        let _ = self.type_cooldown_secs.insert(prompt_type, secs);
        self
    }

    /// Override one type's threshold.
    #[must_use]
    pub fn with_type_threshold(mut self, prompt_type: PromptType, threshold: f64) -> Self {
        let _ = self.type_thresholds.insert(prompt_type, threshold);
        self
    }

    /// Cultural context in effect.
    pub fn cultural_context(&self) -> CulturalContext {
        self.cultural_context
    }

    /// Shift applied to `prompt_type` by the cultural context.
    pub fn adjustment(&self, prompt_type: PromptType) -> f64 {
        cultural_adjustment(self.cultural_context, prompt_type)
    }

    /// Effective confidence threshold, clamped to `[0, 1]`.
    pub fn threshold(&self, prompt_type: PromptType) -> f64 {
        let base = self
            .type_thresholds
            .get(&prompt_type)
            .copied()
            .unwrap_or(self.confidence_threshold);
        (base + self.adjustment(prompt_type)).clamp(0.0, 1.0)
    }

    /// Cooldown for `prompt_type`, or `None` when throttling is disabled.
    pub fn cooldown(&self, prompt_type: PromptType) -> Option<chrono::Duration> {
        let secs = self
            .type_cooldown_secs
            .get(&prompt_type)
            .copied()
            .unwrap_or(self.cooldown_secs);
        if !secs.is_finite() || secs <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let millis = (secs * 1000.0).round() as i64;
        Some(chrono::Duration::milliseconds(millis))
    }
}

/// How prompts reach the moderator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Delivery mode.
    pub mode: DeliveryMode,
    /// Unanswered prompts auto-snooze after this long.
    pub auto_dismiss: Option<Duration>,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from(&CoachingSettings::default())
    }
}

impl From<&CoachingSettings> for DeliveryPolicy {
    fn from(s: &CoachingSettings) -> Self {
        Self {
            mode: s.delivery_mode,
            auto_dismiss: s.auto_dismiss_secs.filter(|&n| n > 0).map(Duration::from_secs),
        }
    }
}

impl DeliveryPolicy {
    /// Whether displayed prompts are pushed to clients.
    pub fn is_visible(&self) -> bool {
        self.mode != DeliveryMode::Silent
    }
}
