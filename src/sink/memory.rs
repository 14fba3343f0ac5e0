//! Bounded in-memory sink.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::signal::{Signal, SignalSource, TaggedSignal};
use crate::sink::{Sink, SinkError};

/// Default number of signals retained (1000).
pub const DEFAULT_MEMORY_CAPACITY: usize = 1_000;

/// Keeps the newest `capacity` signals; older ones are evicted first.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    signals: Mutex<VecDeque<TaggedSignal>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            signals: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Copy of the retained signals, oldest first.
    pub async fn snapshot(&self) -> Vec<TaggedSignal> {
        self.signals.lock().await.iter().cloned().collect()
    }

    /// Retained signals from one source, oldest first.
    pub async fn from_source(&self, source: SignalSource) -> Vec<TaggedSignal> {
        self.signals
            .lock()
            .await
            .iter()
            .filter(|t| t.source == source)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.signals.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.signals.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl Sink for MemorySink {
    async fn append(&self, source: SignalSource, signal: Signal) -> Result<(), SinkError> {
        let mut signals = self.signals.lock().await;
        if signals.len() == self.capacity {
            signals.pop_front();
        }
        signals.push_back(TaggedSignal { source, signal });
        Ok(())
    }
}
