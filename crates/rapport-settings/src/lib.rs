//! # rapport-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RapportSettings::default()`]
//! 2. **User file**: `~/.rapport/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RAPPORT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    rapport_home, resolve_persistence_dir, settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = RapportSettings::default();
        assert_eq!(settings.name, "rapport");
        assert_eq!(settings.server.ws_port, 8787);
        assert_eq!(settings.coaching.preset, CoachingPreset::Balanced);
        assert_eq!(settings.coaching.auto_dismiss_secs, Some(30));
        assert_eq!(settings.analysis.cultural_context, CulturalContext::General);
        assert_eq!(settings.session.grace_period_ms, 30_000);
        assert!(settings.validate().is_ok());
    }
}
