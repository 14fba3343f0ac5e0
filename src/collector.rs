//! Collector Layer
//!
//! Orchestrates every configured listener and owns the aggregated signal feed.
//! Each listener runs in its own Tokio task; the collector itself performs no
//! source I/O. One listener failing never moves the collector out of `Running`.
//!
//! # Architecture
//!
//! - [`Collector`]: Configure, start, stop, and inspect all listeners
//! - [`ListenerRegistry`]: At most one listener per source
//! - [`CollectorState`]: `Stopped -> Starting -> Running -> Stopping -> Stopped`
//! - [`ShutdownReport`]: Which listeners stopped and which did not
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use signalhub::collector::Collector;
//! use signalhub::config::AppConfig;
//! use signalhub::sink::MemorySink;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("configs/config.yaml")?;
//! let mut collector = Collector::new(config.collector.clone());
//! let report = collector.configure(&config.sources)?;
//! for (source, err) in &report.rejected {
//!     eprintln!("{source} rejected: {err}");
//! }
//!
//! let sink = Arc::new(MemorySink::default());
//! let _forwarder = collector.spawn_forwarder(sink.clone())?;
//! collector.start_all().await?;
//! // ...
//! let shutdown = collector.stop_all(Duration::from_secs(5)).await;
//! assert!(shutdown.is_clean());
//! # Ok(())
//! # }
//! ```

mod orchestrator;
mod registry;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::signal::SignalSource;

pub use orchestrator::{Collector, ConfigureReport, ShutdownReport, SignalStats, StartReport};
pub use registry::{ListenerInfo, ListenerRegistry};

/// Lifecycle state of the collector as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CollectorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Collector error types.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The operation is not allowed in the current collector state.
    #[error("cannot {operation} while collector is {state}")]
    InvalidState {
        operation: &'static str,
        state: CollectorState,
    },

    /// A listener for this source is already registered.
    #[error("a listener for source '{0}' is already registered")]
    DuplicateSource(SignalSource),

    /// The aggregated signal stream was already handed out.
    #[error("signal stream already taken")]
    NoSignalStream,
}
