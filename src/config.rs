use crate::core::SyncMode;
use crate::playback::LagLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persistent playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub sync_mode: SyncMode,
    /// Fixed frames per second, only used when `use_frame_rate_override` is set
    pub frame_rate_override: Option<f32>,
    pub use_frame_rate_override: bool,
    pub loop_playback: bool,
    /// Live lag that triggers a jump towards the newest frame
    pub max_lag_frames: usize,
    /// Lag left behind the newest frame after such a jump
    pub min_lag_frames: usize,
    /// Largest forward stage step applied incrementally
    pub stage_drift_tolerance: usize,
    pub fallback_frame_time_secs: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            frame_rate_override: None,
            use_frame_rate_override: false,
            loop_playback: false,
            max_lag_frames: 50,
            min_lag_frames: 5,
            stage_drift_tolerance: 1,
            fallback_frame_time_secs: 1.0 / 60.0,
        }
    }
}

impl PlaybackSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tracksync").join("settings.json"))
    }

    /// Load from the user config directory, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(settings) => return settings,
                    Err(err) => warn!("Ignoring settings at {}: {:#}", path.display(), err),
                }
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(settings.sanitized())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("No config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Frame rate in effect, if the override is switched on and usable
    pub fn active_frame_rate(&self) -> Option<f32> {
        self.frame_rate_override
            .filter(|fps| self.use_frame_rate_override && fps.is_finite() && *fps > 0.0)
    }

    pub fn lag_limits(&self) -> LagLimits {
        LagLimits::new(self.max_lag_frames, self.min_lag_frames)
    }

    /// Replace values that would stall or break playback
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let limits = self.lag_limits();
        self.max_lag_frames = limits.max_frames;
        self.min_lag_frames = limits.min_frames;
        if !(self.fallback_frame_time_secs.is_finite() && self.fallback_frame_time_secs > 0.0) {
            self.fallback_frame_time_secs = defaults.fallback_frame_time_secs;
        }
        if self.frame_rate_override.is_some_and(|fps| !fps.is_finite() || fps <= 0.0) {
            self.frame_rate_override = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = PlaybackSettings {
            sync_mode: SyncMode::NetworkTick,
            frame_rate_override: Some(30.0),
            use_frame_rate_override: true,
            loop_playback: true,
            ..Default::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(PlaybackSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "loop_playback": true }"#).unwrap();

        let settings = PlaybackSettings::load_from(&path).unwrap();
        assert!(settings.loop_playback);
        assert_eq!(settings.max_lag_frames, 50);
        assert_eq!(settings.sync_mode, SyncMode::RecordedTimestamp);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert!(PlaybackSettings::load_from(&path).is_err());
    }

    #[test]
    fn test_active_frame_rate_needs_toggle() {
        let mut settings = PlaybackSettings {
            frame_rate_override: Some(24.0),
            ..Default::default()
        };
        assert_eq!(settings.active_frame_rate(), None);
        settings.use_frame_rate_override = true;
        assert_eq!(settings.active_frame_rate(), Some(24.0));
    }

    #[test]
    fn test_sanitized_fixes_bad_values() {
        let settings = PlaybackSettings {
            min_lag_frames: 0,
            max_lag_frames: 0,
            fallback_frame_time_secs: -1.0,
            frame_rate_override: Some(0.0),
            ..Default::default()
        }
        .sanitized();

        assert_eq!(settings.min_lag_frames, 1);
        assert_eq!(settings.max_lag_frames, 1);
        assert!(settings.fallback_frame_time_secs > 0.0);
        assert_eq!(settings.frame_rate_override, None);
    }
}
