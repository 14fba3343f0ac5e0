//! Metrics platform source: Datadog monitors and metric queries.
//!
//! Poll-based. Each cycle reads the state of the configured monitors and runs an
//! `avg:{metric}{*}` query per metric over the last poll interval.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::config::validation::{check_poll_interval, check_required, check_url};
use crate::listener::{FetchError, FetchMode, Fetcher};
use crate::signal::{Signal, SignalSource};
use crate::source::http::{build_client, check_status};

/// Default poll interval (60 seconds).
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-request timeout (10 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_SITE: &str = "datadoghq.com";

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_site() -> String {
    DEFAULT_SITE.to_string()
}

/// Configuration for the Datadog source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatadogConfig {
    /// Enable this source (default: false).
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub app_key: String,
    /// Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`.
    #[serde(default = "default_site")]
    pub site: String,
    /// Override for the API base URL (default: `https://api.{site}`).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Poll interval (default: 60s).
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Metric names queried each cycle.
    #[serde(default)]
    pub metrics: Vec<String>,
    /// Monitor ids checked each cycle.
    #[serde(default)]
    pub monitors: Vec<u64>,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            app_key: String::new(),
            site: default_site(),
            api_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: Vec::new(),
            monitors: Vec::new(),
        }
    }
}

impl DatadogConfig {
    /// Create an enabled configuration with the given keys.
    pub fn new(api_key: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_key: api_key.into(),
            app_key: app_key.into(),
            ..Self::default()
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_monitors(mut self, monitors: Vec<u64>) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolved API base URL.
    pub fn base_url(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://api.{}", self.site),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const CTX: &str = "datadog source";
        check_required(CTX, "api_key", &self.api_key)?;
        check_required(CTX, "app_key", &self.app_key)?;
        check_required(CTX, "site", &self.site)?;
        check_poll_interval(CTX, self.poll_interval)?;
        check_url(CTX, "api_url", &self.base_url())?;
        if self.metrics.is_empty() && self.monitors.is_empty() {
            return Err(ConfigError::validation(format!(
                "{CTX}: at least one metric or monitor is required"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    series: Vec<serde_json::Value>,
}

/// Datadog monitor and metric poller.
pub struct DatadogFetcher {
    config: DatadogConfig,
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for DatadogFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatadogFetcher")
            .field("base_url", &self.base_url)
            .field("metrics", &self.config.metrics)
            .field("monitors", &self.config.monitors)
            .finish_non_exhaustive()
    }
}

impl DatadogFetcher {
    /// Validate the configuration and build the HTTP client.
    pub fn new(config: DatadogConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = build_client(config.request_timeout)?;
        Ok(Self {
            base_url: config.base_url(),
            config,
            client,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/api/v1/{path}", self.base_url))
            .header("DD-API-KEY", &self.config.api_key)
            .header("DD-APPLICATION-KEY", &self.config.app_key)
    }

    async fn check_monitors(&self, polled_at: i64) -> Result<Vec<Signal>, FetchError> {
        if self.config.monitors.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self
            .config
            .monitors
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .get("monitor")
            .query(&[("monitor_ids", ids)])
            .send()
            .await?;
        let monitors: Vec<serde_json::Value> = check_status(response, "datadog monitors")
            .await?
            .json()
            .await?;

        Ok(monitors
            .into_iter()
            .filter_map(|monitor| {
                let id = monitor.get("id").and_then(|v| v.as_u64())?;
                if !self.config.monitors.contains(&id) {
                    return None;
                }
                let payload = json!({
                    "id": id,
                    "name": monitor.get("name"),
                    "status": monitor.get("overall_state"),
                    "type": monitor.get("type"),
                    "message": monitor.get("message"),
                });
                Some(Signal::new(
                    SignalSource::Datadog,
                    "monitor",
                    format!("datadog:monitor:{id}:{polled_at}"),
                    payload,
                ))
            })
            .collect())
    }

    async fn query_metrics(&self, polled_at: i64) -> Result<Vec<Signal>, FetchError> {
        let from = polled_at - self.config.poll_interval.as_secs().max(1) as i64;
        let mut signals = Vec::new();

        for metric in &self.config.metrics {
            let query = format!("avg:{metric}{{*}}");
            let response = self
                .get("query")
                .query(&[("query", query.as_str())])
                .query(&[("from", from), ("to", polled_at)])
                .send()
                .await?;
            let result: QueryResponse = check_status(response, "datadog query")
                .await?
                .json()
                .await?;

            for (index, series) in result.series.into_iter().enumerate() {
                let payload = json!({
                    "metric": metric,
                    "scope": series.get("scope"),
                    "expression": series.get("expression"),
                    "points": series.get("pointlist"),
                });
                signals.push(Signal::new(
                    SignalSource::Datadog,
                    "metric",
                    format!("datadog:metric:{metric}:{index}:{polled_at}"),
                    payload,
                ));
            }
        }

        Ok(signals)
    }

    async fn poll(&self, polled_at: i64) -> Result<Vec<Signal>, FetchError> {
        let mut signals = self.check_monitors(polled_at).await?;
        signals.extend(self.query_metrics(polled_at).await?);
        tracing::debug!(count = signals.len(), "Datadog poll complete");
        Ok(signals)
    }
}

#[async_trait::async_trait]
impl Fetcher for DatadogFetcher {
    fn source(&self) -> SignalSource {
        SignalSource::Datadog
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Poll(self.config.poll_interval)
    }

    async fn fetch(&mut self, stop: &CancellationToken) -> Result<Vec<Signal>, FetchError> {
        tokio::select! {
            _ = stop.cancelled() => Ok(Vec::new()),
            signals = self.poll(Utc::now().timestamp()) => signals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testutil::{serve, stop_during_request};
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::collections::HashMap;

    #[test]
    fn test_datadog_config_defaults() {
        let config = DatadogConfig::default();
        assert_eq!(config.site, "datadoghq.com");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.base_url(), "https://api.datadoghq.com");
    }

    #[test]
    fn test_datadog_config_validation() {
        let config = DatadogConfig::new("api", "app");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one metric or monitor"));

        let config = DatadogConfig::new("", "app").with_monitors(vec![1]);
        assert!(config.validate().is_err());

        let config = DatadogConfig::new("api", "app").with_metrics(vec!["system.cpu.user".into()]);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_datadog_fetch_monitors_and_metrics() {
        let router = Router::new()
            .route(
                "/api/v1/monitor",
                get(|headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(headers.get("DD-API-KEY").unwrap(), "api");
                    assert_eq!(headers.get("DD-APPLICATION-KEY").unwrap(), "app");
                    assert_eq!(params.get("monitor_ids").map(String::as_str), Some("7,9"));
                    axum::Json(json!([
                        {"id": 7, "name": "cpu", "overall_state": "Alert", "type": "metric alert"},
                        {"id": 8, "name": "other", "overall_state": "OK"}
                    ]))
                }),
            )
            .route(
                "/api/v1/query",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(params.get("query").map(String::as_str), Some("avg:system.load.1{*}"));
                    axum::Json(json!({"series": [
                        {"scope": "host:a", "expression": "avg:system.load.1{*}", "pointlist": [[1.0, 0.5]]}
                    ]}))
                }),
            );
        let Some(base) = serve(router).await else {
            return;
        };

        let config = DatadogConfig::new("api", "app")
            .with_api_url(base)
            .with_monitors(vec![7, 9])
            .with_metrics(vec!["system.load.1".into()]);
        let mut fetcher = DatadogFetcher::new(config).unwrap();
        let signals = fetcher.fetch(&CancellationToken::new()).await.unwrap();

        let kinds: Vec<_> = signals.iter().map(|s| s.kind().to_string()).collect();
        assert_eq!(kinds, vec!["monitor", "metric"]);
        assert_eq!(signals[0].payload()["status"], "Alert");
        assert_eq!(signals[1].payload()["scope"], "host:a");
        assert!(signals[0].id().starts_with("datadog:monitor:7:"));
    }

    #[tokio::test]
    async fn test_datadog_forbidden_is_unrecoverable() {
        let router = Router::new().route("/api/v1/monitor", get(|| async { StatusCode::FORBIDDEN }));
        let Some(base) = serve(router).await else {
            return;
        };

        let config = DatadogConfig::new("api", "bad")
            .with_api_url(base)
            .with_monitors(vec![1]);
        let mut fetcher = DatadogFetcher::new(config).unwrap();
        let err = fetcher.fetch(&CancellationToken::new()).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_datadog_server_error_is_transient() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let Some(base) = serve(router).await else {
            return;
        };

        let config = DatadogConfig::new("api", "app")
            .with_api_url(base)
            .with_metrics(vec!["m".into()]);
        let mut fetcher = DatadogFetcher::new(config).unwrap();
        let err = fetcher.fetch(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_datadog_stop_interrupts_slow_request() {
        let router = Router::new().route(
            "/api/v1/monitor",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                axum::Json(json!([]))
            }),
        );
        let Some(base) = serve(router).await else {
            return;
        };

        let mut config = DatadogConfig::new("api", "app")
            .with_api_url(base)
            .with_monitors(vec![1]);
        config.request_timeout = Duration::from_secs(30);
        let fetcher = DatadogFetcher::new(config).unwrap();

        let elapsed = stop_during_request(Box::new(fetcher)).await;
        assert!(elapsed < Duration::from_secs(1), "stop took {elapsed:?}");
    }
}
