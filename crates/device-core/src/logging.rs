//! Logging setup
//!
//! Device-change traces are emitted under the `device_changes` target. Their
//! level is configured on its own, so a deployment can keep a full record of
//! plugged and selected devices while everything else stays at `warn`.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{DeviceError, DeviceResult};

/// Target of the device-change trace
pub const DEVICE_CHANGES_TARGET: &str = "device_changes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level of everything without a more specific directive
    pub level: Level,
    /// Level of the device-change trace; follows `level` when unset
    pub device_changes: Option<Level>,
    /// JSON lines on stdout instead of the human-readable format
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            device_changes: None,
            json: false,
            file_info: false,
        }
    }

    pub fn with_device_changes(mut self, level: Level) -> Self {
        self.device_changes = Some(level);
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Filter directives added on top of `RUST_LOG`
    pub fn directives(&self) -> Vec<String> {
        let mut directives = vec![self.level.as_str().to_ascii_lowercase()];
        if let Some(level) = self.device_changes {
            directives.push(format!(
                "{}={}",
                DEVICE_CHANGES_TARGET,
                level.as_str().to_ascii_lowercase()
            ));
        }
        directives
    }
}

/// Install a global fmt subscriber. Fails if a global subscriber is
/// already set.
pub fn setup_logging(config: LoggingConfig) -> DeviceResult<()> {
    let mut filter = EnvFilter::from_default_env();
    for directive in config.directives() {
        let parsed: Directive = directive
            .parse()
            .map_err(|e| DeviceError::config(format!("Invalid log directive {}: {}", directive, e)))?;
        filter = filter.add_directive(parsed);
    }

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| DeviceError::config(format!("Failed to install log subscriber: {}", e)))?;
    tracing::debug!("Logging initialized with {:?}", config.directives());
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> DeviceResult<Level> {
    Level::from_str(level).map_err(|_| DeviceError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_device_changes_directive() {
        let config = LoggingConfig::new(Level::WARN);
        assert_eq!(config.directives(), vec!["warn"]);

        let config = config.with_device_changes(Level::DEBUG);
        assert_eq!(config.directives(), vec!["warn", "device_changes=debug"]);
        for directive in config.directives() {
            assert!(directive.parse::<Directive>().is_ok(), "{}", directive);
        }
    }

    #[test]
    fn test_config_builders() {
        let config = LoggingConfig::default().with_json().with_file_info();
        assert_eq!(config.level, Level::INFO);
        assert!(config.json && config.file_info);
        assert!(config.device_changes.is_none());
    }
}
