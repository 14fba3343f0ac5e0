//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::listener::BackoffPolicy;
use crate::sink::DEFAULT_MEMORY_CAPACITY;

use super::sources::SourcesConfig;
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default capacity of the listener-to-sink channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default time a listener waits for channel space before dropping a signal.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default per-listener stop timeout (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_sink_timeout() -> Duration {
    DEFAULT_SINK_TIMEOUT
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

fn default_memory_capacity() -> usize {
    DEFAULT_MEMORY_CAPACITY
}

// =============================================================================
// Collector Settings
// =============================================================================

/// Settings shared by every listener the collector owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Listener-to-sink channel capacity (default: 1000).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Max wait for channel space per signal (default: 1s).
    #[serde(default = "default_sink_timeout", with = "humantime_serde")]
    pub sink_timeout: Duration,

    /// Per-listener stop timeout (default: 5s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Retry pacing after transient fetch errors.
    #[serde(default)]
    pub backoff: BackoffPolicy,

    /// Signals kept by the in-memory sink (default: 1000).
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            backoff: BackoffPolicy::default(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl CollectorSettings {
    /// Validate collector settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::validation(
                "collector channel_capacity must be positive",
            ));
        }
        if self.sink_timeout.is_zero() {
            return Err(ConfigError::validation(
                "collector sink_timeout must be positive",
            ));
        }
        if self.memory_capacity == 0 {
            return Err(ConfigError::validation(
                "collector memory_capacity must be positive",
            ));
        }
        if self.backoff.initial.is_zero() || self.backoff.max < self.backoff.initial {
            return Err(ConfigError::validation(format!(
                "collector backoff must satisfy 0 < initial <= max (initial {:?}, max {:?})",
                self.backoff.initial, self.backoff.max
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Collector-wide settings.
    #[serde(default)]
    pub collector: CollectorSettings,

    /// Source sections.
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    /// Only collector settings are validated here; source sections are checked
    /// per source so one bad section does not stop the others.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate collector settings.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collector.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalSource;
    use std::io::Write;

    #[test]
    fn test_collector_settings_default() {
        let settings = CollectorSettings::default();
        assert_eq!(settings.channel_capacity, 1000);
        assert_eq!(settings.sink_timeout, Duration::from_secs(1));
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(settings.backoff.initial, Duration::from_secs(1));
        assert_eq!(settings.backoff.max, Duration::from_secs(60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert!(config.sources.enabled_sources().is_empty());
        assert_eq!(config.collector.memory_capacity, DEFAULT_MEMORY_CAPACITY);
    }

    #[test]
    fn test_collector_settings_from_yaml() {
        let yaml = r#"
collector:
  channel_capacity: 64
  sink_timeout: 250ms
  shutdown_timeout: 2s
  backoff:
    initial: 500ms
    max: 10s
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.collector.channel_capacity, 64);
        assert_eq!(config.collector.sink_timeout, Duration::from_millis(250));
        assert_eq!(config.collector.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.collector.backoff.initial, Duration::from_millis(500));
        assert_eq!(config.collector.backoff.max, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_collector_settings_rejected() {
        let err = AppConfig::from_yaml("collector:\n  channel_capacity: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let yaml = "collector:\n  backoff:\n    initial: 10s\n    max: 1s\n";
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let err = AppConfig::from_yaml("collector: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_from_file_expands_env() {
        let yaml = r#"
sources:
  datadog:
    enabled: true
    api_key: ${SIGNALHUB_TEST_DD_API_KEY:-from-default}
    app_key: app
    monitors: [42]
  controlm:
    enabled: true
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.sources.datadog.api_key, "from-default");
        assert_eq!(config.sources.datadog.monitors, vec![42]);
        assert_eq!(
            config.sources.enabled_sources(),
            vec![SignalSource::Datadog, SignalSource::Controlm]
        );
        assert!(config.sources.validate_enabled().is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/signalhub.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
