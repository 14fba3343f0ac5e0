//! Message broker source: Kafka topics through a Kafka REST Proxy (v2 API).
//!
//! Subscribe-based. The first fetch creates a consumer instance in the configured
//! group and subscribes it to the topics; every fetch then long-polls for records,
//! racing the stop token so a stop request never waits out the poll timeout.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::config::validation::{check_required, check_url};
use crate::listener::{FetchError, FetchMode, Fetcher};
use crate::signal::{Signal, SignalSource};
use crate::source::http::{build_client, check_status};

/// Default REST proxy address.
const DEFAULT_REST_URL: &str = "http://localhost:8082";

/// Default consumer group.
const DEFAULT_GROUP_ID: &str = "signal_collector";

/// Default offset reset policy for a new group.
const DEFAULT_OFFSET_RESET: &str = "latest";

/// Default long-poll timeout (1 second).
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Slack added on top of the poll timeout for the HTTP request itself.
const REQUEST_SLACK: Duration = Duration::from_secs(10);

const KAFKA_V2: &str = "application/vnd.kafka.v2+json";
const KAFKA_JSON_V2: &str = "application/vnd.kafka.json.v2+json";

fn default_rest_url() -> String {
    DEFAULT_REST_URL.to_string()
}

fn default_topics() -> Vec<String> {
    vec!["signals".to_string()]
}

fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}

fn default_offset_reset() -> String {
    DEFAULT_OFFSET_RESET.to_string()
}

fn default_poll_timeout() -> Duration {
    DEFAULT_POLL_TIMEOUT
}

/// Configuration for the Kafka source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Enable this source (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// REST proxy base URL (default: http://localhost:8082).
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Topics to subscribe to (default: ["signals"]).
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// Consumer group (default: signal_collector).
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// `earliest` or `latest` (default: latest).
    #[serde(default = "default_offset_reset")]
    pub auto_offset_reset: String,
    /// Long-poll timeout for one records request (default: 1s).
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rest_url: default_rest_url(),
            topics: default_topics(),
            group_id: default_group_id(),
            auto_offset_reset: default_offset_reset(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl KafkaConfig {
    /// Create an enabled configuration for the given proxy and topics.
    pub fn new(rest_url: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            enabled: true,
            rest_url: rest_url.into(),
            topics,
            ..Self::default()
        }
    }

    /// Set the consumer group.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Set the long-poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const CTX: &str = "kafka source";
        check_url(CTX, "rest_url", &self.rest_url)?;
        check_required(CTX, "group_id", &self.group_id)?;
        if self.topics.is_empty() {
            return Err(ConfigError::validation(format!(
                "{CTX}: at least one topic is required"
            )));
        }
        for topic in &self.topics {
            check_required(CTX, "topic name", topic)?;
        }
        if !matches!(self.auto_offset_reset.as_str(), "earliest" | "latest") {
            return Err(ConfigError::validation(format!(
                "{CTX}: auto_offset_reset must be 'earliest' or 'latest', got '{}'",
                self.auto_offset_reset
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::validation(format!(
                "{CTX}: poll_timeout must be positive"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Record {
    topic: String,
    partition: i64,
    offset: i64,
    #[serde(default)]
    key: serde_json::Value,
    #[serde(default)]
    value: serde_json::Value,
}

/// Kafka REST proxy consumer.
#[derive(Debug)]
pub struct KafkaFetcher {
    config: KafkaConfig,
    client: Client,
    /// URL of the live consumer instance, if one has been created.
    instance: Option<String>,
    /// Whether `instance` has an active topic subscription.
    subscribed: bool,
}

impl KafkaFetcher {
    /// Validate the configuration and build the HTTP client.
    pub fn new(config: KafkaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = build_client(config.poll_timeout + REQUEST_SLACK)?;
        Ok(Self {
            config,
            client,
            instance: None,
            subscribed: false,
        })
    }

    fn base(&self) -> &str {
        self.config.rest_url.trim_end_matches('/')
    }

    /// Make sure a subscribed consumer instance exists; returns its URL.
    ///
    /// The instance is recorded as soon as the proxy creates it, so a failed
    /// subscription retries against the same instance and `close` can delete it.
    async fn connect(&mut self) -> Result<String, FetchError> {
        let instance = match self.instance.clone() {
            Some(instance) => instance,
            None => self.create_instance().await?,
        };
        if self.subscribed {
            return Ok(instance);
        }

        let body = json!({ "topics": self.config.topics });
        let response = self
            .client
            .post(format!("{instance}/subscription"))
            .header(CONTENT_TYPE, KAFKA_V2)
            .body(body.to_string())
            .send()
            .await?;
        check_status(response, "kafka subscribe").await?;

        tracing::info!(
            group = %self.config.group_id,
            topics = ?self.config.topics,
            instance = %instance,
            "Kafka consumer subscribed"
        );
        self.subscribed = true;
        Ok(instance)
    }

    async fn create_instance(&mut self) -> Result<String, FetchError> {
        let name = format!("signalhub-{}", uuid::Uuid::new_v4());
        let group_url = format!("{}/consumers/{}", self.base(), self.config.group_id);

        let body = json!({
            "name": name,
            "format": "json",
            "auto.offset.reset": self.config.auto_offset_reset,
            "auto.commit.enable": "true",
        });
        let response = self
            .client
            .post(&group_url)
            .header(CONTENT_TYPE, KAFKA_V2)
            .body(body.to_string())
            .send()
            .await?;
        check_status(response, "kafka consumer create").await?;

        let instance = format!("{group_url}/instances/{name}");
        tracing::debug!(instance = %instance, "Kafka consumer instance created");
        self.instance = Some(instance.clone());
        self.subscribed = false;
        Ok(instance)
    }

    async fn poll_records(&mut self) -> Result<Vec<Signal>, FetchError> {
        let instance = self.connect().await?;
        let response = self
            .client
            .get(format!("{instance}/records"))
            .query(&[("timeout", self.config.poll_timeout.as_millis() as u64)])
            .header(ACCEPT, KAFKA_JSON_V2)
            .send()
            .await?;

        // The proxy expires idle instances; recreate on the next fetch.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            self.instance = None;
            self.subscribed = false;
            return Err(FetchError::transient("kafka consumer instance expired"));
        }

        let records: Vec<Record> = check_status(response, "kafka records")
            .await?
            .json()
            .await?;
        Ok(records.into_iter().map(record_signal).collect())
    }
}

fn record_signal(record: Record) -> Signal {
    let id = format!(
        "kafka:{}:{}:{}",
        record.topic, record.partition, record.offset
    );
    let payload = json!({
        "topic": record.topic,
        "partition": record.partition,
        "offset": record.offset,
        "key": record.key,
        "data": record.value,
    });
    Signal::new(SignalSource::Kafka, "message", id, payload)
}

#[async_trait::async_trait]
impl Fetcher for KafkaFetcher {
    fn source(&self) -> SignalSource {
        SignalSource::Kafka
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Subscribe
    }

    async fn fetch(&mut self, stop: &CancellationToken) -> Result<Vec<Signal>, FetchError> {
        tokio::select! {
            _ = stop.cancelled() => Ok(Vec::new()),
            records = self.poll_records() => records,
        }
    }

    async fn close(&mut self) {
        self.subscribed = false;
        let Some(instance) = self.instance.take() else {
            return;
        };
        let result = self
            .client
            .delete(&instance)
            .header(CONTENT_TYPE, KAFKA_V2)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(instance = %instance, "Kafka consumer closed");
            }
            Ok(response) => {
                tracing::warn!(instance = %instance, status = %response.status(), "Kafka consumer delete rejected");
            }
            Err(e) => {
                tracing::warn!(instance = %instance, error = %e, "Kafka consumer delete failed");
            }
        }
    }
}
