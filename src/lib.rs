//! signalhub - Unified Signal Collector
//!
//! This crate gathers discrete events ("signals") from heterogeneous upstream
//! systems into one aggregated feed. It can be used as a library by other Rust
//! projects, or run as a standalone binary with the `signalhub` executable.
//!
//! # Architecture
//!
//! - **Listener**: Shared lifecycle (start, stop, state, backoff) around a source-specific [`Fetcher`]
//! - **Sources**: Teams (chat), Kafka (broker), Datadog (metrics), Control-M (scheduler stub)
//! - **Collector**: Configures, starts, supervises, and stops all listeners
//! - **Sink**: Append-only consumer of the aggregated feed
//! - **Config**: YAML configuration with environment expansion
//! - **Logging**: `tracing` subscriber with an optional log file
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use signalhub::{AppConfig, Collector, LogSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("configs/config.yaml")?;
//!     let mut collector = Collector::new(config.collector.clone());
//!     collector.configure(&config.sources)?;
//!     collector.spawn_forwarder(Arc::new(LogSink::new()))?;
//!
//!     collector.start_all().await?;
//!     tokio::signal::ctrl_c().await?;
//!     collector.stop_all(Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod listener;
pub mod logging;
pub mod signal;
pub mod sink;
pub mod source;

pub use collector::{Collector, CollectorError, CollectorState, ShutdownReport};
pub use config::{AppConfig, CollectorSettings, ConfigError, SourcesConfig};
pub use listener::{FetchError, FetchMode, Fetcher, Listener, ListenerState};
pub use signal::{Signal, SignalSource, TaggedSignal};
pub use sink::{FanoutSink, LogSink, MemorySink, Sink, SinkError};
