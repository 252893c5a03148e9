//! Retry configuration and backoff calculation.
//!
//! Sync-only building blocks. The async retry loop lives in the session
//! crate's persistence writer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 4;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 250;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry logic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero-based), with `random` in `[0, 1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (2r - 1) * jitter)`.
/// `random` maps `[0, 1)` onto `[-jitter, +jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.max_delay_ms, 10_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_config_partial_json_uses_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"maxRetries": 2}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay_ms, DEFAULT_BASE_DELAY_MS);
    }

    #[test]
    fn midpoint_random_has_no_jitter() {
        assert_eq!(calculate_backoff_delay_with_random(0, 100, 10_000, 0.2, 0.5), 100);
        assert_eq!(calculate_backoff_delay_with_random(3, 100, 10_000, 0.2, 0.5), 800);
    }

    #[test]
    fn delay_is_capped() {
        assert_eq!(calculate_backoff_delay_with_random(20, 100, 5_000, 0.0, 0.9), 5_000);
    }

    #[test]
    fn jitter_bounds() {
        let low = calculate_backoff_delay_with_random(0, 1000, 10_000, 0.2, 0.0);
        let high = calculate_backoff_delay_with_random(0, 1000, 10_000, 0.2, 0.999_999);
        assert_eq!(low, 800);
        assert!(high <= 1200 && high >= 1199);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let d = calculate_backoff_delay_with_random(u32::MAX, u64::MAX, u64::MAX, 0.0, 0.5);
        assert!(d > 0);
    }

    #[test]
    fn delay_for_uses_config() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_for(2, 0.3), Duration::from_millis(40));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn delay_stays_within_jitter_band(
                attempt in 0u32..40,
                base in 1u64..5_000,
                max in 1u64..120_000,
                jitter in 0.0f64..1.0,
                random in 0.0f64..1.0,
            ) {
                let d = calculate_backoff_delay_with_random(attempt, base, max, jitter, random);
                let capped = base.saturating_mul(1u64 << attempt.min(31)).min(max);
                #[allow(clippy::cast_precision_loss)]
                let upper = (capped as f64 * (1.0 + jitter)).ceil();
                #[allow(clippy::cast_precision_loss)]
                let lower = (capped as f64 * (1.0 - jitter)).floor();
                #[allow(clippy::cast_precision_loss)]
                let d = d as f64;
                prop_assert!(d <= upper && d >= lower);
            }
        }
    }
}
