//! Configuration module for signalhub.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Collector settings (channel capacity, sink timeout, shutdown timeout, backoff)
//! - Source sections (teams, kafka, datadog, controlm)

mod app;
mod sources;
pub(crate) mod validation;

pub use app::{AppConfig, CollectorSettings};
pub use sources::SourcesConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_SINK_TIMEOUT};
