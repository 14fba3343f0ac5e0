//! Listener registry keyed by source.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use serde::Serialize;

use crate::collector::CollectorError;
use crate::listener::{Listener, ListenerState};
use crate::signal::SignalSource;

/// Metadata about a registered listener.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerInfo {
    pub source: SignalSource,
    /// Fetch mode description, e.g. `poll every 30s`.
    pub mode: String,
    pub state: ListenerState,
}

/// Registered listeners, at most one per source.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: BTreeMap<SignalSource, Arc<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener under its source.
    ///
    /// # Errors
    /// Returns `CollectorError::DuplicateSource` if the source is taken.
    pub fn insert(&mut self, listener: Listener) -> Result<Arc<Listener>, CollectorError> {
        match self.listeners.entry(listener.source()) {
            Entry::Occupied(entry) => Err(CollectorError::DuplicateSource(*entry.key())),
            Entry::Vacant(entry) => Ok(Arc::clone(entry.insert(Arc::new(listener)))),
        }
    }

    pub fn get(&self, source: SignalSource) -> Option<&Arc<Listener>> {
        self.listeners.get(&source)
    }

    pub fn contains(&self, source: SignalSource) -> bool {
        self.listeners.contains_key(&source)
    }

    /// Listeners in source order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Listener>> {
        self.listeners.values()
    }

    pub fn sources(&self) -> Vec<SignalSource> {
        self.listeners.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Snapshot of every listener's source, mode, and state.
    pub fn list(&self) -> Vec<ListenerInfo> {
        self.iter()
            .map(|listener| ListenerInfo {
                source: listener.source(),
                mode: listener.mode().to_string(),
                state: listener.state(),
            })
            .collect()
    }
}
