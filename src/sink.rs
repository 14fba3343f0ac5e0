//! Sink Layer
//!
//! The aggregated signal feed leaves the collector through a narrow append-only
//! interface. Listeners write into a bounded channel via [`SignalWriter`]; a
//! forwarder task drains the matching [`SignalStream`] into any [`Sink`].
//!
//! # Components
//!
//! - [`Sink`]: Append interface for `(source, signal)` pairs
//! - [`LogSink`]: Logs each signal and prints it as JSON
//! - [`MemorySink`]: Bounded in-memory ring of the newest signals
//! - [`FanoutSink`]: Appends to several sinks in order
//! - [`run_forwarder`]: Drains a stream into a sink until the stream closes

mod log;
mod memory;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::signal::{Signal, SignalSource};

pub use log::LogSink;
pub use memory::{DEFAULT_MEMORY_CAPACITY, MemorySink};
pub use writer::{SignalStream, SignalWriter, signal_channel};

/// Errors from appending to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The receiving side is gone.
    #[error("sink closed")]
    Closed,

    /// No capacity became available within the bounded wait.
    #[error("sink busy for {0:?}, signal dropped")]
    Timeout(Duration),

    /// The sink refused the signal.
    #[error("sink rejected signal: {0}")]
    Rejected(String),
}

/// External consumer of the aggregated signal feed.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Append one signal observed from `source`.
    async fn append(&self, source: SignalSource, signal: Signal) -> Result<(), SinkError>;
}

/// Appends every signal to each inner sink in order.
///
/// A failing sink is logged and skipped; it never prevents the others from
/// receiving the signal.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl Sink for FanoutSink {
    async fn append(&self, source: SignalSource, signal: Signal) -> Result<(), SinkError> {
        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(e) = sink.append(source, signal.clone()).await {
                tracing::warn!(sink = index, source = %source, error = %e, "Sink append failed");
            }
        }
        Ok(())
    }
}

/// Drain `stream` into `sink` until every writer has been dropped.
///
/// Returns the number of signals the sink accepted.
pub async fn run_forwarder(mut stream: SignalStream, sink: Arc<dyn Sink>) -> u64 {
    let mut appended = 0u64;
    while let Some(tagged) = stream.recv().await {
        let id = tagged.signal.id().to_owned();
        match sink.append(tagged.source, tagged.signal).await {
            Ok(()) => appended += 1,
            Err(e) => {
                tracing::warn!(source = %tagged.source, signal_id = %id, error = %e, "Failed to append signal");
            }
        }
    }
    tracing::debug!(appended, "Signal forwarder finished");
    appended
}
