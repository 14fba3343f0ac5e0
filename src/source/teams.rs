//! Chat platform source: Microsoft Teams channel messages via Microsoft Graph.
//!
//! Poll-based. Each cycle obtains (or reuses) an OAuth2 client-credentials token
//! and lists the configured channel's messages, emitting those newer than the last
//! one seen.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::config::validation::{check_poll_interval, check_required, check_url};
use crate::listener::{FetchError, FetchMode, Fetcher};
use crate::signal::{Signal, SignalSource};
use crate::source::http::{build_client, check_status};

/// Default poll interval (30 seconds).
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-request timeout (10 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh the token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Token lifetime assumed when the response omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Upper bound on how long a token is cached, whatever the server claims.
const MAX_TOKEN_TTL: Duration = Duration::from_secs(86_400);

const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

fn default_graph_url() -> String {
    DEFAULT_GRAPH_URL.to_string()
}

/// Configuration for the Teams source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsConfig {
    /// Enable this source (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Azure AD tenant id.
    #[serde(default)]
    pub tenant_id: String,
    /// App registration client id.
    #[serde(default)]
    pub client_id: String,
    /// App registration client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Team to read from.
    #[serde(default)]
    pub team_id: String,
    /// Channel within the team.
    #[serde(default)]
    pub channel_id: String,
    /// Poll interval (default: 30s).
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Per-request timeout (default: 10s).
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// OAuth2 authority base URL.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Microsoft Graph base URL.
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            team_id: String::new(),
            channel_id: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            login_url: default_login_url(),
            graph_url: default_graph_url(),
        }
    }
}

impl TeamsConfig {
    /// Create an enabled configuration for one channel.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        team_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            team_id: team_id.into(),
            channel_id: channel_id.into(),
            ..Self::default()
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Point the adapter at different login/Graph endpoints.
    pub fn with_endpoints(mut self, login_url: impl Into<String>, graph_url: impl Into<String>) -> Self {
        self.login_url = login_url.into();
        self.graph_url = graph_url.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const CTX: &str = "teams source";
        check_required(CTX, "tenant_id", &self.tenant_id)?;
        check_required(CTX, "client_id", &self.client_id)?;
        check_required(CTX, "client_secret", &self.client_secret)?;
        check_required(CTX, "team_id", &self.team_id)?;
        check_required(CTX, "channel_id", &self.channel_id)?;
        check_poll_interval(CTX, self.poll_interval)?;
        check_url(CTX, "login_url", &self.login_url)?;
        check_url(CTX, "graph_url", &self.graph_url)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<serde_json::Value>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Teams channel message fetcher.
pub struct TeamsFetcher {
    config: TeamsConfig,
    client: Client,
    token: Option<AccessToken>,
    last_seen: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TeamsFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamsFetcher")
            .field("tenant_id", &self.config.tenant_id)
            .field("team_id", &self.config.team_id)
            .field("channel_id", &self.config.channel_id)
            .field("last_seen", &self.last_seen)
            .finish_non_exhaustive()
    }
}

impl TeamsFetcher {
    /// Validate the configuration and build the HTTP client.
    pub fn new(config: TeamsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = build_client(config.request_timeout)?;
        Ok(Self {
            config,
            client,
            token: None,
            last_seen: None,
        })
    }

    async fn access_token(&mut self) -> Result<String, FetchError> {
        if let Some(token) = &self.token {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.login_url.trim_end_matches('/'),
            self.config.tenant_id
        );
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self.client.post(&url).form(&form).send().await?;
        let token: TokenResponse = check_status(response, "teams token request")
            .await?
            .json()
            .await?;

        let ttl = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS))
            .min(MAX_TOKEN_TTL);
        tracing::debug!(ttl = ?ttl, "Obtained Teams access token");
        self.token = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token.access_token)
    }

    /// Fetch the channel page and emit messages newer than the last seen.
    async fn poll_messages(&mut self) -> Result<Vec<Signal>, FetchError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.messages_url())
            .bearer_auth(token)
            .send()
            .await?;

        // Expired or revoked token: drop it and fetch a fresh one next cycle.
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.token = None;
            return Err(FetchError::transient("teams messages: access token rejected"));
        }

        let page: MessagePage = check_status(response, "teams messages")
            .await?
            .json()
            .await?;
        Ok(self.new_signals(page.value))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/teams/{}/channels/{}/messages",
            self.config.graph_url.trim_end_matches('/'),
            self.config.team_id,
            self.config.channel_id
        )
    }

    /// Turn a page of messages into signals, oldest first, skipping seen ones.
    fn new_signals(&mut self, messages: Vec<serde_json::Value>) -> Vec<Signal> {
        let mut dated: Vec<(DateTime<Utc>, serde_json::Value)> = messages
            .into_iter()
            .filter_map(|message| {
                let created = message
                    .get("createdDateTime")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
                    .with_timezone(&Utc);
                Some((created, message))
            })
            .filter(|(created, _)| self.last_seen.is_none_or(|seen| *created > seen))
            .collect();
        dated.sort_by_key(|(created, _)| *created);

        if let Some((newest, _)) = dated.last() {
            self.last_seen = Some(*newest);
        }

        dated
            .into_iter()
            .map(|(created, message)| {
                let id = message
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| created.timestamp_millis().to_string());
                Signal::new(SignalSource::Teams, "message", format!("teams:{id}"), message)
                    .with_observed_at(created)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Fetcher for TeamsFetcher {
    fn source(&self) -> SignalSource {
        SignalSource::Teams
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Poll(self.config.poll_interval)
    }

    async fn fetch(&mut self, stop: &CancellationToken) -> Result<Vec<Signal>, FetchError> {
        tokio::select! {
            _ = stop.cancelled() => Ok(Vec::new()),
            signals = self.poll_messages() => signals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testutil::{serve, stop_during_request};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(base: &str) -> TeamsConfig {
        TeamsConfig::new("tenant-1", "client-1", "secret-1", "team-1", "channel-1")
            .with_endpoints(base, base)
    }

    #[test]
    fn test_teams_config_defaults() {
        let config = TeamsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.graph_url, DEFAULT_GRAPH_URL);
    }

    #[test]
    fn test_teams_config_requires_credentials() {
        let mut config = TeamsConfig::new("t", "c", "", "team", "chan");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_secret is required"));

        config.client_secret = "s".into();
        assert!(config.validate().is_ok());

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_teams_fetch_emits_new_messages_once() {
        let token_calls = Arc::new(AtomicU32::new(0));
        let counter = token_calls.clone();
        let router = Router::new()
            .route(
                "/tenant-1/oauth2/v2.0/token",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        axum::Json(json!({"access_token": "tok", "expires_in": 3600}))
                    }
                }),
            )
            .route(
                "/teams/team-1/channels/channel-1/messages",
                get(|| async {
                    axum::Json(json!({"value": [
                        {"id": "m2", "createdDateTime": "2025-05-14T10:05:00Z"},
                        {"id": "m1", "createdDateTime": "2025-05-14T10:00:00Z"}
                    ]}))
                }),
            );
        let Some(base) = serve(router).await else {
            return;
        };

        let mut fetcher = TeamsFetcher::new(config(&base)).unwrap();
        let stop = CancellationToken::new();

        let first = fetcher.fetch(&stop).await.unwrap();
        let ids: Vec<_> = first.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["teams:m1", "teams:m2"]);
        assert_eq!(first[0].kind(), "message");

        // Same page again: nothing new, token reused.
        let second = fetcher.fetch(&stop).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teams_rejected_credentials_unrecoverable() {
        let router = Router::new().route(
            "/tenant-1/oauth2/v2.0/token",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid_client") }),
        );
        let Some(base) = serve(router).await else {
            return;
        };

        let mut fetcher = TeamsFetcher::new(config(&base)).unwrap();
        let err = fetcher.fetch(&CancellationToken::new()).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_teams_throttling_is_transient() {
        let router = Router::new()
            .route(
                "/tenant-1/oauth2/v2.0/token",
                post(|| async { axum::Json(json!({"access_token": "tok"})) }),
            )
            .route(
                "/teams/team-1/channels/channel-1/messages",
                get(|| async { StatusCode::TOO_MANY_REQUESTS }),
            );
        let Some(base) = serve(router).await else {
            return;
        };

        let mut fetcher = TeamsFetcher::new(config(&base)).unwrap();
        let err = fetcher.fetch(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_teams_oversized_token_lifetime_is_capped() {
        let token_calls = Arc::new(AtomicU32::new(0));
        let counter = token_calls.clone();
        let router = Router::new()
            .route(
                "/tenant-1/oauth2/v2.0/token",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        axum::Json(json!({"access_token": "tok", "expires_in": u64::MAX}))
                    }
                }),
            )
            .route(
                "/teams/team-1/channels/channel-1/messages",
                get(|| async { axum::Json(json!({"value": []})) }),
            );
        let Some(base) = serve(router).await else {
            return;
        };

        let mut fetcher = TeamsFetcher::new(config(&base)).unwrap();
        let stop = CancellationToken::new();
        assert!(fetcher.fetch(&stop).await.unwrap().is_empty());
        assert!(fetcher.fetch(&stop).await.unwrap().is_empty());
        assert_eq!(token_calls.load(Ordering::SeqCst), 1);

        let cached = fetcher.token.as_ref().unwrap();
        assert!(cached.expires_at <= Instant::now() + MAX_TOKEN_TTL);
    }

    #[tokio::test]
    async fn test_teams_stop_interrupts_slow_request() {
        let router = Router::new()
            .route(
                "/tenant-1/oauth2/v2.0/token",
                post(|| async { axum::Json(json!({"access_token": "tok"})) }),
            )
            .route(
                "/teams/team-1/channels/channel-1/messages",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    axum::Json(json!({"value": []}))
                }),
            );
        let Some(base) = serve(router).await else {
            return;
        };

        let mut config = config(&base);
        config.request_timeout = Duration::from_secs(30);
        let fetcher = TeamsFetcher::new(config).unwrap();

        let elapsed = stop_during_request(Box::new(fetcher)).await;
        assert!(elapsed < Duration::from_secs(1), "stop took {elapsed:?}");
    }
}
