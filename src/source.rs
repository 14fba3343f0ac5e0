//! Source Adapters
//!
//! One [`Fetcher`] per upstream system. Each adapter owns its typed configuration,
//! validates it at construction, and reports failures as [`FetchError`] so the
//! listener driver can tell retryable conditions from fatal ones.
//!
//! | Source     | Mode      | Upstream                         |
//! |------------|-----------|----------------------------------|
//! | `teams`    | poll      | Microsoft Graph channel messages |
//! | `kafka`    | subscribe | Kafka REST Proxy v2 consumer     |
//! | `datadog`  | poll      | Datadog monitor and query API    |
//! | `controlm` | poll      | stub, no network I/O             |
//!
//! [`FetchError`]: crate::listener::FetchError

pub mod controlm;
pub mod datadog;
pub(crate) mod http;
pub mod kafka;
pub mod teams;

use crate::config::{ConfigError, SourcesConfig};
use crate::listener::Fetcher;
use crate::signal::SignalSource;

pub use controlm::{ControlmConfig, ControlmFetcher};
pub use datadog::{DatadogConfig, DatadogFetcher};
pub use kafka::{KafkaConfig, KafkaFetcher};
pub use teams::{TeamsConfig, TeamsFetcher};

/// Build the fetcher for one source from its configuration section.
pub fn build_fetcher(
    source: SignalSource,
    config: &SourcesConfig,
) -> Result<Box<dyn Fetcher>, ConfigError> {
    let fetcher: Box<dyn Fetcher> = match source {
        SignalSource::Teams => Box::new(TeamsFetcher::new(config.teams.clone())?),
        SignalSource::Kafka => Box::new(KafkaFetcher::new(config.kafka.clone())?),
        SignalSource::Datadog => Box::new(DatadogFetcher::new(config.datadog.clone())?),
        SignalSource::Controlm => Box::new(ControlmFetcher::new(config.controlm.clone())?),
    };
    Ok(fetcher)
}

/// Build fetchers for every enabled source.
///
/// Each entry carries its own result so one bad section does not prevent the
/// others from being registered.
pub fn build_fetchers(
    config: &SourcesConfig,
) -> Vec<(SignalSource, Result<Box<dyn Fetcher>, ConfigError>)> {
    config
        .enabled_sources()
        .into_iter()
        .map(|source| (source, build_fetcher(source, config)))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fetchers_only_enabled() {
        let mut config = SourcesConfig::default();
        assert!(build_fetchers(&config).is_empty());

        config.controlm.enabled = true;
        config.datadog.enabled = true;
        let built = build_fetchers(&config);
        assert_eq!(built.len(), 2);

        let (source, result) = &built[0];
        assert_eq!(*source, SignalSource::Datadog);
        // No keys configured.
        assert!(result.is_err());

        let (source, result) = &built[1];
        assert_eq!(*source, SignalSource::Controlm);
        let fetcher = result.as_ref().unwrap();
        assert_eq!(fetcher.source(), SignalSource::Controlm);
    }

    #[test]
    fn test_build_fetcher_kafka_defaults() {
        let config = SourcesConfig::default();
        let fetcher = build_fetcher(SignalSource::Kafka, &config).unwrap();
        assert_eq!(fetcher.mode(), crate::listener::FetchMode::Subscribe);
    }
}
