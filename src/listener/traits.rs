//! Core listener traits and types.

use std::time::Duration;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::signal::{Signal, SignalSource};

/// Errors a fetcher reports from one `fetch()` step.
///
/// The driver loop branches on the variant: transient errors are retried with
/// backoff, unrecoverable errors move the listener to [`ListenerState::Failed`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network timeout, rate limit, temporary auth failure, upstream 5xx.
    #[error("transient source error: {0}")]
    Transient(String),

    /// Rejected credentials, malformed parameters, unsupported upstream behaviour.
    #[error("unrecoverable source error: {0}")]
    Unrecoverable(String),
}

impl FetchError {
    pub fn transient(msg: impl std::fmt::Display) -> Self {
        Self::Transient(msg.to_string())
    }

    pub fn unrecoverable(msg: impl std::fmt::Display) -> Self {
        Self::Unrecoverable(msg.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors from listener lifecycle calls.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The requested transition is not allowed from the current state.
    #[error("listener '{listener}' cannot start while {state}")]
    InvalidState {
        listener: SignalSource,
        state: ListenerState,
    },
}

/// Lifecycle state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ListenerState {
    /// Constructed, never started.
    Idle,
    /// Loop task is live.
    Running,
    /// Stop requested, waiting for the loop to exit.
    Stopping,
    /// Loop exited after a stop request.
    Stopped,
    /// Loop exited on an unrecoverable source error.
    Failed,
}

impl ListenerState {
    /// Whether `start()` may launch a new loop from this state.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Failed)
    }
}

/// How the driver paces successive `fetch()` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Sleep the interval after each successful fetch.
    Poll(Duration),
    /// Call `fetch()` again immediately; the fetcher itself blocks awaiting data.
    Subscribe,
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poll(d) => write!(f, "poll every {:?}", d),
            Self::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// Source-specific half of a listener.
///
/// A fetcher only knows how to pull one batch of signals from its upstream. The
/// shared driver owns the loop around it: pacing, backoff, forwarding, state
/// transitions and shutdown.
///
/// # Stop responsiveness
///
/// Stop is cooperative. The driver never drops an in-flight `fetch()`, so each call
/// must be bounded (request timeouts, long-poll timeouts). Subscribe-mode fetchers
/// should also race their wait against `stop` and return `Ok(vec![])` once it fires.
#[async_trait::async_trait]
pub trait Fetcher: Send + 'static {
    /// Source this fetcher reads from. Used as the registry key.
    fn source(&self) -> SignalSource;

    /// Pacing mode for the driver loop.
    fn mode(&self) -> FetchMode;

    /// Perform one fetch step.
    ///
    /// # Returns
    ///
    /// - `Ok(signals)`: zero or more signals, forwarded in order
    /// - `Err(FetchError::Transient)`: retried after backoff
    /// - `Err(FetchError::Unrecoverable)`: the listener fails and its loop exits
    async fn fetch(&mut self, stop: &CancellationToken) -> Result<Vec<Signal>, FetchError>;

    /// Release upstream resources. Called once each time the loop exits.
    async fn close(&mut self) {}
}
