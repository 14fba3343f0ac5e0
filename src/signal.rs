//! Signal data model.
//!
//! A [`Signal`] is one discrete event observed from an upstream source. Signals are
//! immutable once built: fields are private and only readable through accessors, so a
//! signal travels from a listener to the sink exactly as its fetcher produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Known upstream sources.
///
/// Doubles as the registry key: a collector holds at most one listener per source.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SignalSource {
    /// Chat platform (Microsoft Teams channel messages).
    Teams,
    /// Message broker (Kafka topics via REST proxy).
    Kafka,
    /// Metrics and alerting platform (Datadog monitors and metrics).
    Datadog,
    /// Job scheduler (Control-M, simulated).
    Controlm,
}

impl SignalSource {
    /// All known sources in registry order.
    pub const ALL: [SignalSource; 4] = [
        SignalSource::Teams,
        SignalSource::Kafka,
        SignalSource::Datadog,
        SignalSource::Controlm,
    ];
}

/// One observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    source: SignalSource,
    kind: String,
    payload: serde_json::Value,
    observed_at: DateTime<Utc>,
    id: String,
}

impl Signal {
    /// Create a signal observed now.
    ///
    /// `id` must be unique per (source, occurrence); re-fetching the same occurrence
    /// should reproduce the same id so downstream consumers can de-duplicate.
    pub fn new(
        source: SignalSource,
        kind: impl Into<String>,
        id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            source,
            kind: kind.into(),
            payload,
            observed_at: Utc::now(),
            id: id.into(),
        }
    }

    /// Override the observation timestamp (e.g. with the upstream event time).
    #[must_use]
    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }

    pub fn source(&self) -> SignalSource {
        self.source
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A signal tagged with the source of the listener that forwarded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedSignal {
    pub source: SignalSource,
    pub signal: Signal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_source_from_str() {
        assert_eq!(SignalSource::from_str("teams").unwrap(), SignalSource::Teams);
        assert_eq!(SignalSource::from_str("KAFKA").unwrap(), SignalSource::Kafka);
        assert_eq!(
            SignalSource::from_str("ControlM").unwrap(),
            SignalSource::Controlm
        );
        assert!(SignalSource::from_str("slack").is_err());
    }

    #[test]
    fn test_source_display() {
        assert_eq!(SignalSource::Datadog.to_string(), "datadog");
        assert_eq!(SignalSource::Controlm.as_ref(), "controlm");
    }

    #[test]
    fn test_signal_accessors() {
        let ts = DateTime::parse_from_rfc3339("2025-05-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let signal = Signal::new(
            SignalSource::Kafka,
            "message",
            "kafka:signals:0:42",
            json!({"topic": "signals"}),
        )
        .with_observed_at(ts);

        assert_eq!(signal.source(), SignalSource::Kafka);
        assert_eq!(signal.kind(), "message");
        assert_eq!(signal.id(), "kafka:signals:0:42");
        assert_eq!(signal.payload()["topic"], "signals");
        assert_eq!(signal.observed_at(), ts);
    }

    #[test]
    fn test_signal_serializes_lowercase_source() {
        let signal = Signal::new(SignalSource::Teams, "message", "teams:1", json!(null));
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["source"], "teams");
        assert_eq!(value["id"], "teams:1");
    }
}
