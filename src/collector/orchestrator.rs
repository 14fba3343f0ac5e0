//! Collector orchestration: configure, start, stop, supervise.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collector::{CollectorError, CollectorState, ListenerInfo, ListenerRegistry};
use crate::config::{CollectorSettings, ConfigError, SourcesConfig};
use crate::listener::{Fetcher, Listener, ListenerError, ListenerState, StopOutcome};
use crate::signal::SignalSource;
use crate::sink::{Sink, SignalStream, SignalWriter, run_forwarder, signal_channel};
use crate::source::build_fetchers;

/// Outcome of [`Collector::configure`].
#[derive(Debug, Default)]
pub struct ConfigureReport {
    /// Sources whose listener was registered.
    pub registered: Vec<SignalSource>,
    /// Enabled sources left out because their configuration is invalid.
    pub rejected: Vec<(SignalSource, ConfigError)>,
}

/// Outcome of [`Collector::start_all`].
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<SignalSource>,
    /// Listeners that refused to start (still stopping from an earlier run).
    pub rejected: Vec<(SignalSource, ListenerError)>,
}

/// Outcome of [`Collector::stop_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Listeners whose loop exited within the timeout.
    pub stopped: Vec<SignalSource>,
    /// Listeners that had no live loop (never started, already stopped, or failed).
    pub not_running: Vec<SignalSource>,
    /// Listeners that did not stop cleanly within the timeout.
    pub unstopped: Vec<SignalSource>,
}

impl ShutdownReport {
    /// Whether every listener is down.
    pub fn is_clean(&self) -> bool {
        self.unstopped.is_empty()
    }
}

/// Sink path counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalStats {
    pub forwarded: u64,
    pub dropped: u64,
}

/// Owns every configured listener and the aggregated signal feed.
pub struct Collector {
    settings: CollectorSettings,
    registry: ListenerRegistry,
    writer: SignalWriter,
    stream: Option<SignalStream>,
    state: watch::Sender<CollectorState>,
    supervisors: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("state", &self.state())
            .field("listeners", &self.registry.sources())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Create an empty collector in `Stopped` state.
    pub fn new(settings: CollectorSettings) -> Self {
        let (writer, stream) = signal_channel(settings.channel_capacity, settings.sink_timeout);
        let (state, _) = watch::channel(CollectorState::Stopped);
        Self {
            settings,
            registry: ListenerRegistry::new(),
            writer,
            stream: Some(stream),
            state,
            supervisors: Vec::new(),
        }
    }

    pub fn state(&self) -> CollectorState {
        *self.state.borrow()
    }

    /// Watch collector state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CollectorState> {
        self.state.subscribe()
    }

    fn require_stopped(&self, operation: &'static str) -> Result<(), CollectorError> {
        match self.state() {
            CollectorState::Stopped => Ok(()),
            state => Err(CollectorError::InvalidState { operation, state }),
        }
    }

    /// Register one fetcher as a listener.
    ///
    /// # Errors
    /// Returns `CollectorError::DuplicateSource` if the source is already
    /// registered, or `InvalidState` unless the collector is `Stopped`.
    pub fn register(&mut self, fetcher: Box<dyn Fetcher>) -> Result<SignalSource, CollectorError> {
        self.require_stopped("register a listener")?;

        let source = fetcher.source();
        if self.registry.contains(source) {
            return Err(CollectorError::DuplicateSource(source));
        }
        let listener = Listener::new(fetcher, self.writer.clone(), self.settings.backoff);
        let mode = listener.mode();
        self.registry.insert(listener)?;

        tracing::info!(source = %source, mode = %mode, "Listener registered");
        Ok(source)
    }

    /// Build and register a listener for every enabled source.
    ///
    /// Sources with invalid configuration are logged, left out, and returned in
    /// the report; the remaining sources are still registered.
    pub fn configure(&mut self, sources: &SourcesConfig) -> Result<ConfigureReport, CollectorError> {
        self.require_stopped("configure")?;

        let mut report = ConfigureReport::default();
        for (source, built) in build_fetchers(sources) {
            match built {
                Ok(fetcher) => {
                    self.register(fetcher)?;
                    report.registered.push(source);
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Source configuration rejected");
                    report.rejected.push((source, e));
                }
            }
        }

        tracing::info!(
            registered = report.registered.len(),
            rejected = report.rejected.len(),
            "Collector configured"
        );
        Ok(report)
    }

    /// Hand out the aggregated stream of source-tagged signals.
    ///
    /// Per-source order is preserved; cross-source order is not.
    ///
    /// # Errors
    /// Returns `CollectorError::NoSignalStream` if it was already taken.
    pub fn signals(&mut self) -> Result<SignalStream, CollectorError> {
        self.stream.take().ok_or(CollectorError::NoSignalStream)
    }

    /// Relay the aggregated stream into `sink` on a dedicated task.
    ///
    /// The task ends once the collector and every listener have been dropped,
    /// returning the number of signals the sink accepted.
    pub fn spawn_forwarder(&mut self, sink: Arc<dyn Sink>) -> Result<JoinHandle<u64>, CollectorError> {
        let stream = self.signals()?;
        Ok(tokio::spawn(run_forwarder(stream, sink)))
    }

    /// Start every registered listener concurrently.
    ///
    /// No-op when already `Running`.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidState` while starting or stopping.
    pub async fn start_all(&mut self) -> Result<StartReport, CollectorError> {
        match self.state() {
            CollectorState::Running => {
                tracing::debug!("Collector already running");
                return Ok(StartReport::default());
            }
            CollectorState::Stopped => {}
            state => {
                return Err(CollectorError::InvalidState {
                    operation: "start",
                    state,
                });
            }
        }

        self.state.send_replace(CollectorState::Starting);
        let results = join_all(self.registry.iter().map(|listener| async move {
            (listener.source(), listener.start().await)
        }))
        .await;

        let mut report = StartReport::default();
        for (source, result) in results {
            match result {
                Ok(()) => report.started.push(source),
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Listener did not start");
                    report.rejected.push((source, e));
                }
            }
        }

        self.spawn_supervisors();
        self.state.send_replace(CollectorState::Running);
        tracing::info!(
            started = report.started.len(),
            rejected = report.rejected.len(),
            "Collector running"
        );
        Ok(report)
    }

    /// One task per listener that reports transitions into `Failed`.
    fn spawn_supervisors(&mut self) {
        for listener in self.registry.iter() {
            let source = listener.source();
            let mut states = listener.subscribe();
            self.supervisors.push(tokio::spawn(async move {
                loop {
                    if states.wait_for(|s| *s == ListenerState::Failed).await.is_err() {
                        break;
                    }
                    tracing::error!(source = %source, "Listener failed; other listeners unaffected");
                    if states.wait_for(|s| *s != ListenerState::Failed).await.is_err() {
                        break;
                    }
                }
            }));
        }
    }

    /// Stop every listener concurrently, each bounded by `timeout`.
    ///
    /// Listeners still not stopped when their timeout expires are reported in
    /// [`ShutdownReport::unstopped`] and left to exit on their own.
    pub async fn stop_all(&mut self, timeout: Duration) -> ShutdownReport {
        self.state.send_replace(CollectorState::Stopping);
        for supervisor in self.supervisors.drain(..) {
            supervisor.abort();
        }

        let outcomes = join_all(self.registry.iter().map(|listener| async move {
            (listener.source(), listener.stop(timeout).await)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (source, outcome) in outcomes {
            match outcome {
                StopOutcome::Stopped => report.stopped.push(source),
                StopOutcome::NotRunning => report.not_running.push(source),
                StopOutcome::TimedOut => report.unstopped.push(source),
            }
        }

        self.state.send_replace(CollectorState::Stopped);
        if report.is_clean() {
            tracing::info!(stopped = report.stopped.len(), "Collector stopped");
        } else {
            tracing::warn!(unstopped = ?report.unstopped, "Listeners did not stop cleanly");
        }
        report
    }

    /// Current state of every registered listener, in source order.
    pub fn states(&self) -> Vec<(SignalSource, ListenerState)> {
        self.registry
            .iter()
            .map(|listener| (listener.source(), listener.state()))
            .collect()
    }

    /// State of one listener, if registered.
    pub fn listener_state(&self, source: SignalSource) -> Option<ListenerState> {
        self.registry.get(source).map(|listener| listener.state())
    }

    /// Sources whose listener is currently `Failed`.
    pub fn failed_sources(&self) -> Vec<SignalSource> {
        self.states()
            .into_iter()
            .filter(|(_, state)| *state == ListenerState::Failed)
            .map(|(source, _)| source)
            .collect()
    }

    /// Registered listeners with mode and state.
    pub fn list_listeners(&self) -> Vec<ListenerInfo> {
        self.registry.list()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Forwarded and dropped signal counts on the sink path.
    pub fn stats(&self) -> SignalStats {
        SignalStats {
            forwarded: self.writer.forwarded(),
            dropped: self.writer.dropped(),
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        for supervisor in self.supervisors.drain(..) {
            supervisor.abort();
        }
    }
}
