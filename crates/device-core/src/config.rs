//! Configuration for the device registry
//!
//! ```toml
//! property_namespace = "net.example.phone"
//! disable_video = true
//! video_rescan_delay_ms = 1000
//! preferences_path = "/var/lib/phone/devices.json"
//!
//! [logging]
//! level = "warn"
//! device_changes = "debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, DeviceResult};
use crate::logging::{parse_log_level, LoggingConfig};

/// Default delay before the video rescan triggered by an audio hotplug. A
/// webcam's camera usually shows up a moment after its microphone.
pub const DEFAULT_VIDEO_RESCAN_DELAY_MS: u64 = 1000;

/// Default capacity of each device system's event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Device registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Prefix of every preference key; empty for none
    pub property_namespace: String,
    /// Skip registering audio systems
    pub disable_audio: bool,
    /// Skip registering video systems
    pub disable_video: bool,
    pub video_rescan_delay_ms: u64,
    pub event_channel_capacity: usize,
    /// JSON preference file; preferences are kept in memory when unset
    pub preferences_path: Option<PathBuf>,
    pub logging: LoggingSettings,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            property_namespace: String::new(),
            disable_audio: false,
            disable_video: false,
            video_rescan_delay_ms: DEFAULT_VIDEO_RESCAN_DELAY_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            preferences_path: None,
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Level of the `device_changes` target; follows `level` when unset
    pub device_changes: Option<String>,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            device_changes: None,
            json: false,
            file_info: false,
        }
    }
}

impl LoggingSettings {
    pub fn to_logging_config(&self) -> DeviceResult<LoggingConfig> {
        let mut config = LoggingConfig::new(parse_log_level(&self.level)?);
        if let Some(level) = &self.device_changes {
            config = config.with_device_changes(parse_log_level(level)?);
        }
        if self.json {
            config = config.with_json();
        }
        if self.file_info {
            config = config.with_file_info();
        }
        Ok(config)
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> DeviceResult<Self> {
        let config: DeviceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> DeviceResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> DeviceResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(DeviceError::config("event_channel_capacity must be greater than zero"));
        }
        if self.property_namespace.starts_with('.') || self.property_namespace.ends_with('.') {
            return Err(DeviceError::config(format!(
                "property_namespace must not start or end with '.': {}",
                self.property_namespace
            )));
        }
        self.logging.to_logging_config()?;
        Ok(())
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.property_namespace = namespace.into();
        self
    }

    pub fn with_video_rescan_delay(mut self, delay: Duration) -> Self {
        self.video_rescan_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_preferences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences_path = Some(path.into());
        self
    }

    pub fn without_video(mut self) -> Self {
        self.disable_video = true;
        self
    }

    pub fn video_rescan_delay(&self) -> Duration {
        Duration::from_millis(self.video_rescan_delay_ms)
    }
}
