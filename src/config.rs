use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Placeholder substituted with the source path in launch templates
pub const TEMPLATE_PLACEHOLDER: &str = "%s";

/// Main configuration for the splash sequencer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pipeline launch templates
    pub templates: TemplateConfig,

    /// Duration and watchdog timing
    pub timing: TimingConfig,

    /// Where clip files and media live
    pub clips: ClipsConfig,

    /// Output surface settings
    pub render: RenderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.templates.validate()?;
        self.timing.validate()?;
        Ok(())
    }
}

/// Launch templates, one per branch flavour. `%s` is replaced by the source
/// path (or, for `cover`, by the ARGB colour).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Program that runs a template
    pub launcher: String,

    /// Program that lists the streams of a media file
    pub discoverer: String,

    /// Video file branch
    pub video: String,

    /// Video file branch that also feeds the audio sink
    pub movie: String,

    /// Still image branch, holding the decoded frame
    pub still: String,

    /// Audio file branch
    pub audio: String,

    /// Muted tone generator
    pub silence: String,

    /// Single solid frame painted before exit
    pub cover: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            launcher: "gst-launch-1.0".to_string(),
            discoverer: "gst-discoverer-1.0".to_string(),
            video: " filesrc location=%s ! decodebin ! videoconvert ! autovideosink ".to_string(),
            movie: " filesrc location=%s ! decodebin name=dec dec. ! queue ! videoconvert ! autovideosink dec. ! queue ! audioconvert ! audioresample ! autoaudiosink "
                .to_string(),
            still: " filesrc location=%s ! decodebin ! imagefreeze ! videoconvert ! autovideosink "
                .to_string(),
            audio: " filesrc location=%s ! decodebin ! audioconvert ! autoaudiosink ".to_string(),
            silence: " audiotestsrc ! volume volume=0 ! autoaudiosink ".to_string(),
            cover: " videotestsrc pattern=solid-color foreground-color=%s num-buffers=1 ! videoconvert ! autovideosink "
                .to_string(),
        }
    }
}

impl TemplateConfig {
    fn validate(&self) -> Result<()> {
        for (key, program) in [
            ("templates.launcher", &self.launcher),
            ("templates.discoverer", &self.discoverer),
        ] {
            if program.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: program.clone(),
                }
                .into());
            }
        }

        for (key, template) in [
            ("templates.video", &self.video),
            ("templates.movie", &self.movie),
            ("templates.still", &self.still),
            ("templates.audio", &self.audio),
            ("templates.cover", &self.cover),
        ] {
            if template.matches(TEMPLATE_PLACEHOLDER).count() != 1 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: template.clone(),
                }
                .into());
            }
        }

        if self.silence.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "templates.silence".to_string(),
                value: self.silence.clone(),
            }
            .into());
        }

        Ok(())
    }
}

/// Per-clip timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Clips at or below this duration (ms) get no duration timer and run to end-of-stream
    pub min_timed_duration_ms: u64,

    /// Absolute per-clip ceiling (ms); exceeding it terminates the process
    pub watchdog_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_timed_duration_ms: 500,
            watchdog_ms: 60_000,
        }
    }
}

impl TimingConfig {
    pub fn min_timed_duration(&self) -> Duration {
        Duration::from_millis(self.min_timed_duration_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.watchdog_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.watchdog_ms".to_string(),
                value: self.watchdog_ms.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Clip file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipsConfig {
    /// Directory of clip files (`default.conf` first)
    pub conf_dir: PathBuf,

    /// Base directory for relative media paths
    pub media_dir: PathBuf,
}

impl Default for ClipsConfig {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from("/etc/splash-sequencer.d"),
            media_dir: PathBuf::from("/usr/share/splash-sequencer/media"),
        }
    }
}

/// Output surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Display to open; `DISPLAY` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// RGB colour of the final cover frame
    pub cover_color: [u8; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            display: None,
            cover_color: [0, 0, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("splash.toml");

        let mut original = Config::default();
        original.timing.watchdog_ms = 30_000;
        original.save_to_file(&file_path).unwrap();
        let loaded = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded.timing.watchdog_ms, 30_000);
        assert_eq!(loaded.templates.video, original.templates.video);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[timing]\nwatchdog_ms = 45000\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.timing.watchdog_ms, 45_000);
        assert_eq!(config.timing.min_timed_duration_ms, 500);
        assert_eq!(config.templates.launcher, "gst-launch-1.0");
    }

    #[test]
    fn test_template_needs_one_placeholder() {
        let mut config = Config::default();
        config.templates.audio = " filesrc ! decodebin ! autoaudiosink ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cover_template_needs_colour_placeholder() {
        let mut config = Config::default();
        config.templates.cover = " videotestsrc num-buffers=1 ! autovideosink ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("templates.cover"));

        config.templates.cover = " videotestsrc foreground-color=%s ! %s ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_discoverer_rejected() {
        let mut config = Config::default();
        config.templates.discoverer = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_watchdog_rejected() {
        let mut config = Config::default();
        config.timing.watchdog_ms = 0;
        assert!(config.validate().is_err());
    }
}
