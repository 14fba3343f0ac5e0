//! Listener Layer
//!
//! Lifecycle framework shared by every source. A source only implements
//! [`Fetcher`]; wrapping it in a [`Listener`] gives it a dedicated Tokio task,
//! interval pacing or subscribe-style looping, bounded exponential backoff on
//! transient errors, failure isolation, and cooperative, time-bounded stop.
//!
//! # Architecture
//!
//! - [`Fetcher`]: Source-specific fetch step (`source`, `mode`, `fetch`, `close`)
//! - [`Listener`]: Start/stop/state handle around one fetcher
//! - [`ListenerState`]: `Idle -> Running -> Stopping -> Stopped`, or `Running -> Failed`
//! - [`BackoffPolicy`]: Retry pacing for transient errors
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use signalhub::listener::{BackoffPolicy, Listener};
//! use signalhub::sink::signal_channel;
//! use signalhub::source::controlm::{ControlmConfig, ControlmFetcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (writer, mut stream) = signal_channel(100, Duration::from_secs(1));
//! let fetcher = ControlmFetcher::new(ControlmConfig::default())?;
//! let listener = Listener::new(Box::new(fetcher), writer, BackoffPolicy::default());
//!
//! listener.start().await?;
//! if let Some(tagged) = stream.recv().await {
//!     println!("{} {}", tagged.source, tagged.signal.id());
//! }
//! listener.stop(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod driver;
mod handle;
mod traits;

pub use backoff::{Backoff, BackoffPolicy, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
pub use handle::{Listener, StopOutcome};
pub use traits::{FetchError, FetchMode, Fetcher, ListenerError, ListenerState};
