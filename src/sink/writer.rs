//! Collector-side signal channel.
//!
//! Every listener holds a clone of one [`SignalWriter`]; the collector hands the
//! single [`SignalStream`] to whoever consumes the aggregated feed. A bounded tokio
//! mpsc channel keeps per-source order and applies back-pressure: a send waits at
//! most `send_timeout` before the signal is dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::signal::{Signal, SignalSource, TaggedSignal};
use crate::sink::SinkError;

/// Create a connected writer/stream pair.
pub fn signal_channel(capacity: usize, send_timeout: Duration) -> (SignalWriter, SignalStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let writer = SignalWriter {
        tx,
        send_timeout,
        forwarded: Arc::new(AtomicU64::new(0)),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (writer, SignalStream { rx })
}

/// Multi-producer handle onto the aggregated signal channel.
#[derive(Clone)]
pub struct SignalWriter {
    tx: mpsc::Sender<TaggedSignal>,
    send_timeout: Duration,
    forwarded: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for SignalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalWriter")
            .field("send_timeout", &self.send_timeout)
            .field("forwarded", &self.forwarded())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl SignalWriter {
    /// Forward one signal tagged with `source`.
    ///
    /// Waits for channel capacity up to the configured send timeout.
    ///
    /// # Errors
    /// Returns `SinkError::Timeout` when the consumer is stuck and
    /// `SinkError::Closed` when the stream has been dropped.
    pub async fn forward(&self, source: SignalSource, signal: Signal) -> Result<(), SinkError> {
        let tagged = TaggedSignal { source, signal };
        match self.tx.send_timeout(tagged, self.send_timeout).await {
            Ok(()) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(tagged)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    source = %source,
                    signal_id = %tagged.signal.id(),
                    dropped_total = total,
                    "Signal stream full, dropping signal"
                );
                Err(SinkError::Timeout(self.send_timeout))
            }
            Err(SendTimeoutError::Closed(tagged)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    source = %source,
                    signal_id = %tagged.signal.id(),
                    "Signal stream closed, dropping signal"
                );
                Err(SinkError::Closed)
            }
        }
    }

    /// Signals accepted by the channel so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Signals dropped on timeout or closed stream.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of the aggregated signal channel.
#[derive(Debug)]
pub struct SignalStream {
    rx: mpsc::Receiver<TaggedSignal>,
}

impl SignalStream {
    /// Wait for the next signal. Returns `None` once every writer is gone.
    pub async fn recv(&mut self) -> Option<TaggedSignal> {
        self.rx.recv().await
    }

    /// Take a signal if one is immediately available.
    pub fn try_recv(&mut self) -> Option<TaggedSignal> {
        self.rx.try_recv().ok()
    }

    /// Drain every signal currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<TaggedSignal> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
