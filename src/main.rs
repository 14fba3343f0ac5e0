//! signalhub Binary Entry Point
//!
//! Runs the signal collector in the foreground, or validates a configuration.
//! Core functionality is provided by the `signalhub` library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use signalhub::{
    collector::Collector,
    config::{AppConfig, parse_duration},
    logging,
    sink::{FanoutSink, LogSink, MemorySink, Sink},
};

/// Extra time the forwarder gets to flush after listeners stop.
const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// signalhub - Unified Signal Collector
#[derive(Parser, Debug)]
#[command(name = "signalhub", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "configs/config.yaml",
        env = "SIGNALHUB_CONFIG"
    )]
    config: String,

    /// Per-listener stop timeout, e.g. `5s` (overrides config file)
    #[arg(long, global = true, env = "SIGNALHUB_SHUTDOWN_TIMEOUT", value_parser = parse_duration)]
    shutdown_timeout: Option<Duration>,

    /// Also write logs to this file, without ANSI colors
    #[arg(long, global = true, env = "SIGNALHUB_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Run the collector in the foreground until Ctrl+C or SIGTERM
    #[default]
    Run,
    /// Validate the configuration and list enabled sources
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; the guard flushes the log file on exit.
    let _log_guard = logging::init(cli.log_file.as_deref())?;

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // CLI > ENV > config file
    if let Some(timeout) = cli.shutdown_timeout {
        config.collector.shutdown_timeout = timeout;
    }

    match cli.command.unwrap_or_default() {
        Command::Check => Ok(check(&config)),
        Command::Run => {
            run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Validate every enabled source and print the result.
fn check(config: &AppConfig) -> ExitCode {
    let enabled = config.sources.enabled_sources();
    let errors = config.sources.validate_enabled();

    if enabled.is_empty() {
        println!("no sources enabled");
    }
    for source in &enabled {
        match errors.iter().find(|(s, _)| s == source) {
            Some((_, e)) => println!("{source}: invalid: {e}"),
            None => println!("{source}: ok"),
        }
    }

    if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run the collector until a shutdown signal arrives.
async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("signalhub - Unified Signal Collector");

    let mut collector = Collector::new(config.collector.clone());
    let report = collector.configure(&config.sources)?;
    for (source, e) in &report.rejected {
        tracing::error!(source = %source, error = %e, "Source disabled for this run");
    }
    if report.registered.is_empty() {
        tracing::warn!("No sources registered; waiting for shutdown signal anyway");
    }

    let memory = Arc::new(MemorySink::new(config.collector.memory_capacity));
    let sinks: Vec<Arc<dyn Sink>> = vec![
        Arc::new(LogSink::new().with_json_output(true)),
        memory.clone(),
    ];
    let forwarder = collector.spawn_forwarder(Arc::new(FanoutSink::new(sinks)))?;

    collector.start_all().await?;
    tracing::info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;

    tracing::info!("Shutting down listeners...");
    let shutdown = collector
        .stop_all(config.collector.shutdown_timeout)
        .await;
    for source in &shutdown.unstopped {
        tracing::warn!(source = %source, "Listener did not stop cleanly");
    }
    let stats = collector.stats();
    drop(collector);

    match tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, forwarder).await {
        Ok(Ok(appended)) => tracing::debug!(appended, "Signal forwarder drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Signal forwarder task failed"),
        Err(_) => tracing::warn!("Signal forwarder did not drain in time"),
    }

    tracing::info!(
        forwarded = stats.forwarded,
        dropped = stats.dropped,
        retained = memory.len().await,
        "Shutdown complete"
    );
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
