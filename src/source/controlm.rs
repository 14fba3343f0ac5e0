//! Job scheduler source: Control-M (stub).
//!
//! The Control-M automation API is not wired up. The fetcher keeps a synthetic
//! session and emits fixed job status and alert signals on its interval, which is
//! enough to exercise the listener lifecycle end to end without a scheduler.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::config::validation::{check_poll_interval, check_url};
use crate::listener::{FetchError, FetchMode, Fetcher};
use crate::signal::{Signal, SignalSource};

/// Default poll interval (60 seconds).
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api";

/// Lifetime of a stub session.
const SESSION_TTL: Duration = Duration::from_secs(3600);

/// Renew the session this long before it expires.
const SESSION_REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Configuration for the Control-M source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlmConfig {
    /// Enable this source (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Automation API endpoint (default: http://localhost:8080/api).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Alternative to username/password.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Poll interval (default: 60s).
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Field filters applied to job records, e.g. `folder: Finance`.
    #[serde(default)]
    pub job_filters: BTreeMap<String, String>,
}

impl Default for ControlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            username: None,
            password: None,
            api_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_filters: BTreeMap::new(),
        }
    }
}

impl ControlmConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.job_filters.insert(field.into(), value.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const CTX: &str = "controlm source";
        check_url(CTX, "endpoint", &self.endpoint)?;
        check_poll_interval(CTX, self.poll_interval)?;
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::validation(format!(
                "{CTX}: username and password must be set together"
            )));
        }
        Ok(())
    }
}

struct Session {
    token: String,
    expires_at: Instant,
}

/// Control-M job and alert fetcher (stub).
pub struct ControlmFetcher {
    config: ControlmConfig,
    session: Option<Session>,
    cycle: u64,
}

impl std::fmt::Debug for ControlmFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlmFetcher")
            .field("endpoint", &self.config.endpoint)
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl ControlmFetcher {
    pub fn new(config: ControlmConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            session: None,
            cycle: 0,
        })
    }

    fn session_token(&mut self) -> &str {
        let now = Instant::now();
        let stale = self
            .session
            .as_ref()
            .is_none_or(|s| now + SESSION_REFRESH_MARGIN >= s.expires_at);
        if stale {
            let auth = if self.config.api_key.is_some() {
                "api_key"
            } else {
                "password"
            };
            tracing::debug!(endpoint = %self.config.endpoint, auth, "Opened Control-M session (stub)");
            self.session = Some(Session {
                token: format!("stub-session-{}", uuid::Uuid::new_v4()),
                expires_at: now + SESSION_TTL,
            });
        }
        self.session.as_ref().map(|s| s.token.as_str()).unwrap_or_default()
    }

    fn matches_filters(&self, job: &Value) -> bool {
        self.config.job_filters.iter().all(|(field, expected)| {
            job.get(field)
                .and_then(Value::as_str)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
        })
    }
}

fn stub_jobs() -> Vec<Value> {
    vec![
        json!({
            "job_id": "job123",
            "name": "Daily Batch Process",
            "folder": "Finance",
            "status": "Completed",
            "start_time": "2025-05-14T10:00:00Z",
            "end_time": "2025-05-14T10:15:00Z",
            "output": "Process completed successfully",
        }),
        json!({
            "job_id": "job456",
            "name": "Weekly Report",
            "folder": "Reporting",
            "status": "Running",
            "start_time": "2025-05-14T11:00:00Z",
            "end_time": null,
            "output": null,
        }),
    ]
}

fn stub_alerts() -> Vec<Value> {
    vec![json!({
        "alert_id": "alert789",
        "severity": "Warning",
        "message": "Job taking longer than expected",
        "job_id": "job456",
        "timestamp": "2025-05-14T11:30:00Z",
    })]
}

#[async_trait::async_trait]
impl Fetcher for ControlmFetcher {
    fn source(&self) -> SignalSource {
        SignalSource::Controlm
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Poll(self.config.poll_interval)
    }

    async fn fetch(&mut self, _stop: &CancellationToken) -> Result<Vec<Signal>, FetchError> {
        if self.session_token().is_empty() {
            return Err(FetchError::transient("controlm session unavailable"));
        }
        self.cycle += 1;
        // Wall-clock millis keep ids unique across restarts; the cycle keeps
        // them unique within one millisecond.
        let poll = format!("{}-{}", Utc::now().timestamp_millis(), self.cycle);

        let jobs = stub_jobs()
            .into_iter()
            .filter(|job| self.matches_filters(job))
            .map(|job| {
                let id = job["job_id"].as_str().unwrap_or("unknown").to_string();
                Signal::new(
                    SignalSource::Controlm,
                    "job",
                    format!("controlm:job:{id}:{poll}"),
                    job,
                )
            });
        let alerts = stub_alerts().into_iter().map(|alert| {
            let id = alert["alert_id"].as_str().unwrap_or("unknown").to_string();
            Signal::new(
                SignalSource::Controlm,
                "alert",
                format!("controlm:alert:{id}:{poll}"),
                alert,
            )
        });

        let signals: Vec<Signal> = jobs.chain(alerts).collect();
        tracing::debug!(cycle = self.cycle, count = signals.len(), "Control-M poll complete (stub)");
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controlm_config_defaults() {
        let config = ControlmConfig::default();
        assert_eq!(config.endpoint, "http://localhost:8080/api");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_controlm_config_validation() {
        let config = ControlmConfig {
            endpoint: "nowhere".into(),
            ..ControlmConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ControlmConfig {
            username: Some("ops".into()),
            ..ControlmConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ControlmConfig::default().with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_controlm_emits_jobs_and_alerts_per_cycle() {
        let mut fetcher = ControlmFetcher::new(ControlmConfig::default()).unwrap();
        let stop = CancellationToken::new();

        let first = fetcher.fetch(&stop).await.unwrap();
        let ids: Vec<_> = first.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids[0].starts_with("controlm:job:job123:"));
        assert!(ids[1].starts_with("controlm:job:job456:"));
        assert!(ids[2].starts_with("controlm:alert:alert789:"));
        assert!(ids[0].ends_with("-1"));
        assert_eq!(first[2].kind(), "alert");

        let second = fetcher.fetch(&stop).await.unwrap();
        assert!(second[0].id().starts_with("controlm:job:job123:"));
        assert!(second[0].id().ends_with("-2"));
        assert_ne!(first[0].id(), second[0].id());
    }

    #[tokio::test]
    async fn test_controlm_ids_unique_across_restarts() {
        let stop = CancellationToken::new();
        let mut before = ControlmFetcher::new(ControlmConfig::default()).unwrap();
        let first = before.fetch(&stop).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        // A fresh process starts counting cycles from one again.
        let mut after = ControlmFetcher::new(ControlmConfig::default()).unwrap();
        let second = after.fetch(&stop).await.unwrap();

        for (old, new) in first.iter().zip(&second) {
            assert_ne!(old.id(), new.id());
        }
    }

    #[tokio::test]
    async fn test_controlm_job_filters() {
        let config = ControlmConfig::default().with_job_filter("folder", "finance");
        let mut fetcher = ControlmFetcher::new(config).unwrap();
        let signals = fetcher.fetch(&CancellationToken::new()).await.unwrap();

        let jobs: Vec<_> = signals.iter().filter(|s| s.kind() == "job").collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload()["job_id"], "job123");
    }

    #[test]
    fn test_controlm_session_reused() {
        let mut fetcher = ControlmFetcher::new(ControlmConfig::default()).unwrap();
        let first = fetcher.session_token().to_string();
        let second = fetcher.session_token().to_string();
        assert_eq!(first, second);
        assert!(first.starts_with("stub-session-"));
    }
}
