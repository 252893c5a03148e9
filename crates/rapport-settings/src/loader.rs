//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RapportSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `RAPPORT_*` environment variable overrides
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use rapport_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{CoachingPreset, CulturalContext, RapportSettings};

/// Root directory for user configuration and data (`~/.rapport`).
pub fn rapport_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rapport")
}

/// Resolve the path to the settings file (`~/.rapport/settings.json`).
pub fn settings_path() -> PathBuf {
    rapport_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RapportSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RapportSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file, without env overrides.
fn load_file_layer(path: &Path) -> Result<RapportSettings> {
    let defaults = serde_json::to_value(RapportSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Resolve the persistence directory against `~/.rapport` when relative.
pub fn resolve_persistence_dir(settings: &RapportSettings) -> PathBuf {
    let dir = PathBuf::from(&settings.persistence.directory);
    if dir.is_absolute() {
        dir
    } else {
        rapport_home().join(dir)
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut RapportSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup. Separated from the process
/// environment so tests stay hermetic.
pub fn apply_overrides<F>(settings: &mut RapportSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RAPPORT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("RAPPORT_WS_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.ws_port = v;
    }
    if let Some(v) = env.parsed("RAPPORT_MAX_CONNECTIONS", |s| {
        parse_usize_range(s, 1, 100_000)
    }) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("RAPPORT_HEARTBEAT_INTERVAL_MS", |s| {
        parse_u64_range(s, 1000, 600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.parsed("RAPPORT_HEARTBEAT_TIMEOUT_MS", |s| {
        parse_u64_range(s, 2000, 1_800_000)
    }) {
        settings.server.heartbeat_timeout_ms = v;
    }

    // ── Coaching ────────────────────────────────────────────────────
    if let Some(v) = env.parsed("RAPPORT_COACHING_ENABLED", parse_bool) {
        settings.coaching.enabled = v;
    }
    if let Some(v) = env.parsed("RAPPORT_COACHING_PRESET", CoachingPreset::parse) {
        settings.coaching.preset = v;
    }
    if let Some(v) = env.parsed("RAPPORT_AUTO_DISMISS_SECS", |s| parse_u64_range(s, 0, 3600)) {
        settings.coaching.auto_dismiss_secs = (v > 0).then_some(v);
    }

    // ── Analysis ────────────────────────────────────────────────────
    if let Some(v) = env.parsed("RAPPORT_CULTURAL_CONTEXT", CulturalContext::parse) {
        settings.analysis.cultural_context = v;
    }
    if let Some(v) = env.parsed("RAPPORT_ANALYZER_BUDGET_MS", |s| parse_u64_range(s, 1, 10_000)) {
        settings.analysis.analyzer_budget_ms = v;
    }

    // ── Session / persistence ───────────────────────────────────────
    if let Some(v) = env.parsed("RAPPORT_GRACE_PERIOD_MS", |s| parse_u64_range(s, 0, 3_600_000)) {
        settings.session.grace_period_ms = v;
    }
    if let Some(v) = env.string("RAPPORT_SESSIONS_DIR") {
        settings.persistence.directory = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RAPPORT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("RAPPORT_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `compact` or `json`.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env reader ──────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, RapportSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"wsPort": 9090}, "coaching": {"preset": "active", "custom": {"cooldownSecs": 5}}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.ws_port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.coaching.preset, CoachingPreset::Active);
        assert!((settings.coaching.custom.cooldown_secs - 5.0).abs() < f64::EPSILON);
        assert!((settings.coaching.custom.confidence_threshold - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn load_array_replaces_token_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"auth": {"tokens": [{"token": "t", "userId": "u", "role": "observer"}]}}}"#,
        )
        .unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.auth.tokens.len(), 1);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"heartbeatIntervalMs": 60000, "heartbeatTimeoutMs": 30000}}"#,
        )
        .unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_valid_values() {
        let mut s = RapportSettings::default();
        apply_overrides(
            &mut s,
            env_from(&[
                ("RAPPORT_WS_PORT", "9100"),
                ("RAPPORT_COACHING_PRESET", "minimal"),
                ("RAPPORT_CULTURAL_CONTEXT", "high_context"),
                ("RAPPORT_LOG_FORMAT", "json"),
                ("RAPPORT_SESSIONS_DIR", "/var/lib/rapport"),
            ]),
        );
        assert_eq!(s.server.ws_port, 9100);
        assert_eq!(s.coaching.preset, CoachingPreset::Minimal);
        assert_eq!(s.analysis.cultural_context, CulturalContext::HighContext);
        assert_eq!(s.logging.format, LogFormat::Json);
        assert_eq!(s.persistence.directory, "/var/lib/rapport");
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut s = RapportSettings::default();
        apply_overrides(
            &mut s,
            env_from(&[
                ("RAPPORT_WS_PORT", "0"),
                ("RAPPORT_COACHING_PRESET", "chatty"),
                ("RAPPORT_COACHING_ENABLED", "maybe"),
            ]),
        );
        assert_eq!(s, RapportSettings::default());
    }

    #[test]
    fn auto_dismiss_zero_disables() {
        let mut s = RapportSettings::default();
        apply_overrides(&mut s, env_from(&[("RAPPORT_AUTO_DISMISS_SECS", "0")]));
        assert_eq!(s.coaching.auto_dismiss_secs, None);
    }

    #[test]
    fn empty_env_value_is_ignored() {
        let mut s = RapportSettings::default();
        apply_overrides(&mut s, env_from(&[("RAPPORT_HOST", "")]));
        assert_eq!(s.server.host, "127.0.0.1");
    }

    #[test]
    fn relative_persistence_dir_resolves_under_home() {
        let s = RapportSettings::default();
        let dir = resolve_persistence_dir(&s);
        assert!(dir.ends_with(".rapport/sessions"));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("abc", 1, 10_000), None);
    }
}
