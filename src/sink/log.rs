//! Logging sink.

use crate::signal::{Signal, SignalSource};
use crate::sink::{Sink, SinkError};

/// Logs every signal at `info` and optionally prints it as one JSON line on stdout.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    print_json: bool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write each signal to stdout as a JSON line.
    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.print_json = enabled;
        self
    }
}

#[async_trait::async_trait]
impl Sink for LogSink {
    async fn append(&self, source: SignalSource, signal: Signal) -> Result<(), SinkError> {
        tracing::info!(
            source = %source,
            kind = %signal.kind(),
            signal_id = %signal.id(),
            "Received signal"
        );

        if self.print_json {
            let line = serde_json::to_string(&signal)
                .map_err(|e| SinkError::Rejected(format!("serialize signal: {e}")))?;
            println!("{line}");
        }
        Ok(())
    }
}
