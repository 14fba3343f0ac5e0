//! Listener lifecycle handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::listener::backoff::BackoffPolicy;
use crate::listener::driver::{DriverContext, drive};
use crate::listener::{FetchMode, Fetcher, ListenerError, ListenerState};
use crate::signal::SignalSource;
use crate::sink::SignalWriter;

/// Result of a [`Listener::stop`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop exited within the timeout; the listener is `Stopped`.
    Stopped,
    /// There was no loop to stop (idle, already stopped, or failed earlier).
    NotRunning,
    /// The loop did not exit within the timeout; the listener stays `Stopping`.
    TimedOut,
}

/// The live loop of a started listener.
struct Run {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// A fetcher wrapped with the shared lifecycle: start, stop, state.
///
/// All methods take `&self`; a listener is usually held in an `Arc` and driven
/// concurrently by the collector. Start and stop calls are serialized internally,
/// so at most one loop task exists per listener.
pub struct Listener {
    source: SignalSource,
    mode: FetchMode,
    fetcher: Arc<Mutex<Box<dyn Fetcher>>>,
    writer: SignalWriter,
    backoff: BackoffPolicy,
    state: Arc<watch::Sender<ListenerState>>,
    run: Mutex<Option<Run>>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Listener {
    /// Wrap a fetcher. The listener starts `Idle`.
    pub fn new(fetcher: Box<dyn Fetcher>, writer: SignalWriter, backoff: BackoffPolicy) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            source: fetcher.source(),
            mode: fetcher.mode(),
            fetcher: Arc::new(Mutex::new(fetcher)),
            writer,
            backoff,
            state: Arc::new(state),
            run: Mutex::new(None),
        }
    }

    pub fn source(&self) -> SignalSource {
        self.source
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Launch the loop task.
    ///
    /// No-op when already `Running`. The state is `Running` before the task
    /// performs its first fetch.
    ///
    /// # Errors
    /// Returns `ListenerError::InvalidState` while a previous stop is still
    /// waiting on its loop (`Stopping`).
    pub async fn start(&self) -> Result<(), ListenerError> {
        let mut run = self.run.lock().await;

        let current = self.state();
        if current == ListenerState::Running {
            tracing::debug!(source = %self.source, "Listener already running");
            return Ok(());
        }
        if !current.can_start() {
            return Err(ListenerError::InvalidState {
                listener: self.source,
                state: current,
            });
        }

        // Left over from a run that failed on its own; that task has exited or is closing.
        if let Some(previous) = run.take() {
            previous.token.cancel();
        }

        let token = CancellationToken::new();
        self.state.send_replace(ListenerState::Running);

        let handle = tokio::spawn(drive(DriverContext {
            source: self.source,
            mode: self.mode,
            fetcher: Arc::clone(&self.fetcher),
            writer: self.writer.clone(),
            backoff: self.backoff,
            state: Arc::clone(&self.state),
            token: token.clone(),
        }));
        *run = Some(Run { token, handle });

        tracing::info!(source = %self.source, from = %current, "Listener started");
        Ok(())
    }

    /// Request the loop to stop and wait up to `timeout` for it to exit.
    ///
    /// Safe to call in any state and any number of times. The whole call,
    /// including waiting behind a concurrent start or stop, is bounded by
    /// `timeout`.
    pub async fn stop(&self, timeout: Duration) -> StopOutcome {
        let deadline = Instant::now() + timeout;

        let Ok(mut run) = tokio::time::timeout_at(deadline, self.run.lock()).await else {
            tracing::warn!(source = %self.source, "Listener busy, stop timed out");
            return StopOutcome::TimedOut;
        };

        let Some(mut current) = run.take() else {
            return StopOutcome::NotRunning;
        };

        current.token.cancel();
        self.state.send_if_modified(|s| {
            if *s == ListenerState::Running {
                *s = ListenerState::Stopping;
                true
            } else {
                false
            }
        });

        match tokio::time::timeout_at(deadline, &mut current.handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    tracing::error!(source = %self.source, error = %e, "Listener task aborted");
                }
                let stopped = self.state.send_if_modified(|s| {
                    if *s == ListenerState::Stopping {
                        *s = ListenerState::Stopped;
                        true
                    } else {
                        false
                    }
                });
                if stopped {
                    tracing::info!(source = %self.source, "Listener stopped");
                    StopOutcome::Stopped
                } else {
                    StopOutcome::NotRunning
                }
            }
            Err(_) => {
                tracing::warn!(source = %self.source, timeout = ?timeout, "Listener did not stop cleanly");
                *run = Some(current);
                StopOutcome::TimedOut
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.token.cancel();
        }
    }
}
