//! Per-source configuration sections.

use serde::{Deserialize, Serialize};

use crate::signal::SignalSource;
use crate::source::{ControlmConfig, DatadogConfig, KafkaConfig, TeamsConfig};

use super::validation::ConfigError;

/// Configuration for every supported source, keyed by source name.
///
/// Each section defaults to disabled, so an empty `sources:` block is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub datadog: DatadogConfig,
    #[serde(default)]
    pub controlm: ControlmConfig,
}

impl SourcesConfig {
    /// Whether the section for `source` is enabled.
    pub fn is_enabled(&self, source: SignalSource) -> bool {
        match source {
            SignalSource::Teams => self.teams.enabled,
            SignalSource::Kafka => self.kafka.enabled,
            SignalSource::Datadog => self.datadog.enabled,
            SignalSource::Controlm => self.controlm.enabled,
        }
    }

    /// Enabled sources in canonical order.
    pub fn enabled_sources(&self) -> Vec<SignalSource> {
        SignalSource::ALL
            .into_iter()
            .filter(|source| self.is_enabled(*source))
            .collect()
    }

    /// Validate one section regardless of whether it is enabled.
    pub fn validate_source(&self, source: SignalSource) -> Result<(), ConfigError> {
        match source {
            SignalSource::Teams => self.teams.validate(),
            SignalSource::Kafka => self.kafka.validate(),
            SignalSource::Datadog => self.datadog.validate(),
            SignalSource::Controlm => self.controlm.validate(),
        }
    }

    /// Validate every enabled section, collecting all failures.
    pub fn validate_enabled(&self) -> Vec<(SignalSource, ConfigError)> {
        self.enabled_sources()
            .into_iter()
            .filter_map(|source| self.validate_source(source).err().map(|e| (source, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_default_all_disabled() {
        let config = SourcesConfig::default();
        assert!(config.enabled_sources().is_empty());
        assert!(config.validate_enabled().is_empty());
    }

    #[test]
    fn test_sources_validate_enabled_collects_errors() {
        let yaml = r#"
teams:
  enabled: true
  tenant_id: t
kafka:
  enabled: true
controlm:
  enabled: true
  poll_interval: 5s
"#;
        let config: SourcesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.enabled_sources(),
            vec![SignalSource::Teams, SignalSource::Kafka, SignalSource::Controlm]
        );
        assert_eq!(config.controlm.poll_interval, std::time::Duration::from_secs(5));

        let errors = config.validate_enabled();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, SignalSource::Teams);
        assert!(errors[0].1.to_string().contains("client_id is required"));
    }
}
