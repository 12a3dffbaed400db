//! Engine configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use padboard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::output::OutputConfig;

/// File name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Playback engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine-wide volume at startup (0.0 to 1.0).
    pub default_volume: f32,
    /// Progress poll rate.
    pub refresh_rate_hz: u32,
    /// Layout of the offline destination built by `PlaybackEngine::offline`.
    /// A device destination uses the device's own layout.
    pub output: OutputConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            refresh_rate_hz: 60,
            output: OutputConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!("Loaded engine config from {}", path.display());
        config.validated()
    }

    /// Read `config.json` from the platform config directory, or fall back to
    /// defaults when there is none.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                info!("No engine config found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Location of the default config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "padboard", "Padboard")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Clamp the volume and reject layouts the engine cannot use.
    pub fn validated(mut self) -> Result<Self> {
        if self.default_volume.is_nan() {
            return Err(Error::InvalidArgument("default_volume is NaN".into()));
        }
        self.default_volume = self.default_volume.clamp(0.0, 1.0);

        if self.refresh_rate_hz == 0 {
            return Err(Error::InvalidArgument(
                "refresh_rate_hz must be greater than zero".into(),
            ));
        }
        if self.output.sample_rate == 0 || self.output.channels == 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid output layout: {} channels at {} Hz",
                self.output.channels, self.output.sample_rate
            )));
        }

        Ok(self)
    }

    /// Interval between progress polls.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_rate_hz.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!((config.default_volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.refresh_rate_hz, 60);
        assert_eq!(config.output, OutputConfig::default());
        assert_eq!(config.progress_interval(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_volume": 0.5, "output": {{"sample_rate": 44100}}}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert!((config.default_volume - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.refresh_rate_hz, 60);
        assert_eq!(config.output.sample_rate, 44100);
        assert_eq!(config.output.channels, 2);
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_volume": 3.0}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert!((config.default_volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = EngineConfig {
            refresh_rate_hz: 0,
            ..EngineConfig::default()
        };
        assert!(config.validated().is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"output": {{"channels": 0}}}}"#).unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path().join("absent.json")),
            Err(Error::Io(_))
        ));
    }
}
