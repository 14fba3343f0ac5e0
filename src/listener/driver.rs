//! Shared driver loop run by every listener task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::listener::backoff::{Backoff, BackoffPolicy};
use crate::listener::{FetchError, FetchMode, Fetcher, ListenerState};
use crate::signal::{Signal, SignalSource};
use crate::sink::SignalWriter;

/// Everything one loop run needs, moved into the spawned task.
pub(crate) struct DriverContext {
    pub source: SignalSource,
    pub mode: FetchMode,
    pub fetcher: Arc<Mutex<Box<dyn Fetcher>>>,
    pub writer: SignalWriter,
    pub backoff: BackoffPolicy,
    pub state: Arc<watch::Sender<ListenerState>>,
    pub token: CancellationToken,
}

/// Run fetch cycles until the token is cancelled or the fetcher fails hard.
///
/// The only state transition made here is `Running -> Failed`; the move to
/// `Stopped` belongs to the caller of `stop()`.
///
/// `Fetcher::close` runs once per run that acquired the fetcher, after its
/// last fetch.
pub(crate) async fn drive(ctx: DriverContext) {
    let DriverContext {
        source,
        mode,
        fetcher,
        writer,
        backoff,
        state,
        token,
    } = ctx;

    // A previous run may still be closing its fetcher. A run cancelled before
    // it gets the lock never fetched, so it skips `close()` as well.
    let mut fetcher = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        guard = fetcher.lock_owned() => guard,
    };

    tracing::info!(source = %source, mode = %mode, "Listener loop started");
    let mut backoff = Backoff::new(backoff);
    let mut cycles = 0u64;

    while !token.is_cancelled() {
        cycles += 1;
        let result = AssertUnwindSafe(fetcher.fetch(&token))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FetchError::unrecoverable("fetch panicked")));

        match result {
            Ok(signals) => {
                backoff.reset();
                tracing::debug!(source = %source, cycle = cycles, count = signals.len(), "Fetch completed");
                if !forward_all(source, signals, &writer, &token).await {
                    break;
                }
                if let FetchMode::Poll(interval) = mode {
                    if !sleep_or_cancel(interval, &token).await {
                        break;
                    }
                }
            }
            Err(e) if e.is_transient() => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    source = %source,
                    error = %e,
                    attempt = backoff.attempt(),
                    retry_in = ?delay,
                    "Fetch failed, backing off"
                );
                if !sleep_or_cancel(delay, &token).await {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(source = %source, error = %e, "Listener failed");
                state.send_if_modified(|s| {
                    if *s == ListenerState::Running {
                        *s = ListenerState::Failed;
                        true
                    } else {
                        false
                    }
                });
                break;
            }
        }
    }

    fetcher.close().await;
    tracing::debug!(source = %source, cycles, "Listener loop exited");
}

/// Forward signals in order. Returns `false` if cancelled mid-batch.
async fn forward_all(
    source: SignalSource,
    signals: Vec<Signal>,
    writer: &SignalWriter,
    token: &CancellationToken,
) -> bool {
    let total = signals.len();
    for (sent, signal) in signals.into_iter().enumerate() {
        tokio::select! {
            biased;
            // Errors are counted and logged by the writer; the loop keeps going.
            _ = writer.forward(source, signal) => {}
            _ = token.cancelled() => {
                tracing::warn!(source = %source, unsent = total - sent, "Stopped while forwarding");
                return false;
            }
        }
    }
    true
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
