//! Configuration types and defaults

use mirrorcam_core::{CoreError, CoreResult};
use mirrorcam_media::{
    CapabilityCeiling, NegotiationConfig, RecorderConfig, VideoResolution, DEFAULT_MIME_PREFERENCE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl From<Dimensions> for VideoResolution {
    fn from(d: Dimensions) -> Self {
        VideoResolution::new(d.width, d.height)
    }
}

/// Capability ceiling assumed when a device does not report one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CeilingConfig {
    /// Maximum width in pixels
    pub width: u32,
    /// Maximum height in pixels
    pub height: u32,
    /// Maximum frame rate
    pub frame_rate: f64,
}

/// Camera controller configuration
///
/// Every field has a default, so a JSON file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Wait between closing a probe stream and reopening the device
    pub probe_release_delay_ms: u64,
    /// Wait after stopping the old session when switching devices
    pub switch_grace_delay_ms: u64,
    /// Pause between resolution scan candidates
    pub scan_delay_ms: u64,
    /// Ceiling used when capabilities are not exposed
    pub default_ceiling: CeilingConfig,
    /// Upper bound applied to a reported maximum frame rate
    pub max_frame_rate_cap: f64,
    /// Sampling rate of recordings
    pub record_fps: u32,
    /// Redraw cadence of the recording surface
    pub display_refresh_hz: u32,
    /// Interval between encoder drains while recording
    pub timeslice_ms: u64,
    /// Recording surface size before preview dimensions are known
    pub fallback_surface: Dimensions,
    /// Delay before a saved recording's download handle is released
    pub download_release_delay_ms: u64,
    /// Where photos and recordings are written
    pub output_dir: PathBuf,
    /// Where the theme preference is persisted
    pub preferences_path: PathBuf,
    /// Container preference for recordings, most preferred first
    pub mime_preference: Vec<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            probe_release_delay_ms: 200,
            switch_grace_delay_ms: 200,
            scan_delay_ms: 200,
            default_ceiling: CeilingConfig {
                width: 1920,
                height: 1080,
                frame_rate: 30.0,
            },
            max_frame_rate_cap: 60.0,
            record_fps: 30,
            display_refresh_hz: 60,
            timeslice_ms: 500,
            fallback_surface: Dimensions {
                width: 1920,
                height: 1080,
            },
            download_release_delay_ms: 1000,
            output_dir: PathBuf::from("captures"),
            preferences_path: PathBuf::from("mirrorcam-preferences.json"),
            mime_preference: DEFAULT_MIME_PREFERENCE.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl CameraConfig {
    /// Load from a JSON file and validate
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |message: &str| {
            Err(CoreError::InvalidConfiguration {
                message: message.to_string(),
            })
        };

        if self.default_ceiling.width == 0 || self.default_ceiling.height == 0 {
            return invalid("Default ceiling dimensions must be greater than 0");
        }
        if self.default_ceiling.frame_rate <= 0.0 || self.max_frame_rate_cap <= 0.0 {
            return invalid("Frame rates must be greater than 0");
        }
        if self.record_fps == 0 || self.record_fps > 120 {
            return invalid("Recording frame rate must be between 1 and 120");
        }
        if self.display_refresh_hz == 0 {
            return invalid("Display refresh rate must be greater than 0");
        }
        if self.timeslice_ms == 0 {
            return invalid("Recorder timeslice must be greater than 0");
        }
        if self.fallback_surface.width == 0 || self.fallback_surface.height == 0 {
            return invalid("Fallback surface dimensions must be greater than 0");
        }
        if self.mime_preference.is_empty() {
            return invalid("At least one recording MIME type is required");
        }
        Ok(())
    }

    /// Negotiation settings
    pub fn negotiation(&self) -> NegotiationConfig {
        NegotiationConfig {
            probe_release_delay: Duration::from_millis(self.probe_release_delay_ms),
            default_ceiling: CapabilityCeiling {
                resolution: VideoResolution::new(
                    self.default_ceiling.width,
                    self.default_ceiling.height,
                ),
                frame_rate: self.default_ceiling.frame_rate,
            },
            frame_rate_cap: self.max_frame_rate_cap,
        }
    }

    /// Recorder settings
    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            record_fps: self.record_fps,
            display_refresh_hz: self.display_refresh_hz,
            timeslice: Duration::from_millis(self.timeslice_ms),
            fallback_surface: self.fallback_surface.into(),
            download_release_delay: Duration::from_millis(self.download_release_delay_ms),
            mime_preference: self.mime_preference.clone(),
        }
    }

    /// Grace delay applied on device switch
    pub fn switch_grace_delay(&self) -> Duration {
        Duration::from_millis(self.switch_grace_delay_ms)
    }

    /// Pause between scan candidates
    pub fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CameraConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.negotiation().probe_release_delay, Duration::from_millis(200));
        assert_eq!(config.recorder().timeslice, Duration::from_millis(500));
        assert_eq!(config.recorder().fallback_surface, VideoResolution::FULL_HD);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CameraConfig =
            serde_json::from_str(r#"{ "record_fps": 24, "output_dir": "/tmp/cam" }"#).unwrap();
        assert_eq!(config.record_fps, 24);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/cam"));
        assert_eq!(config.scan_delay_ms, 200);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = CameraConfig {
            record_fps: 0,
            ..CameraConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfiguration { .. })
        ));

        let config = CameraConfig {
            mime_preference: Vec::new(),
            ..CameraConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        std::fs::write(&path, r#"{ "timeslice_ms": 250 }"#).unwrap();
        assert_eq!(CameraConfig::from_file(&path).unwrap().timeslice_ms, 250);

        std::fs::write(&path, r#"{ "timeslice_ms": 0 }"#).unwrap();
        assert!(CameraConfig::from_file(&path).is_err());
    }
}
