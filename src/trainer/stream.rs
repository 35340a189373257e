//! Stream reader for trainer stdout.
//!
//! The reader is the only writer of the [`ProgressStore`]. It consumes the
//! trainer's output line by line until end of input and never stops on a bad
//! line.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use crate::display;
use crate::supervisor::{ProgressSample, ProgressStore};
use crate::trainer::{decode_line, DecodedEvent};

/// Counters collected while reading a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReaderSummary {
    pub lines: u64,
    pub samples: u64,
    pub completions: u64,
    pub malformed: u64,
    pub unrecognized: u64,
    /// Set when reading stopped on an I/O error rather than end of input.
    pub io_error: Option<String>,
}

impl ReaderSummary {
    /// Number of lines that produced a diagnostic instead of data.
    #[must_use]
    pub fn diagnostics(&self) -> u64 {
        self.malformed + self.unrecognized
    }
}

/// Consumes trainer output and feeds the progress store.
#[derive(Debug, Clone)]
pub struct StreamReader {
    store: ProgressStore,
    echo: bool,
    summary: ReaderSummary,
}

impl StreamReader {
    #[must_use]
    pub fn new(store: ProgressStore) -> Self {
        Self {
            store,
            echo: false,
            summary: ReaderSummary::default(),
        }
    }

    /// Also echo every line to stdout through the display module.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub fn summary(&self) -> &ReaderSummary {
        &self.summary
    }

    /// Decode one line and apply it to the store.
    ///
    /// Surrounding whitespace (including a trailing `\r`) is stripped first.
    pub fn handle_line(&mut self, raw: &str) -> DecodedEvent {
        let line = raw.trim();
        self.summary.lines += 1;
        let event = decode_line(line);

        match &event {
            DecodedEvent::MetricUpdate { epoch, metric } => {
                self.store.append(ProgressSample::new(*epoch, *metric));
                self.summary.samples += 1;
                tracing::info!(
                    epoch = *epoch,
                    mse = %display::format_metric(*metric),
                    "Parsed metric update"
                );
                if self.echo {
                    display::print_trainer_line(line);
                    display::print_sample(*epoch, *metric);
                }
            }
            DecodedEvent::Completion => {
                self.store.mark_finished();
                self.summary.completions += 1;
                if self.summary.completions > 1 {
                    tracing::warn!(
                        count = self.summary.completions,
                        "Repeated completion signal"
                    );
                }
                tracing::info!("Trainer reported training done");
                if self.echo {
                    display::print_trainer_line(line);
                    display::print_training_done();
                }
            }
            DecodedEvent::Malformed { raw, reason } => {
                self.summary.malformed += 1;
                tracing::warn!(%reason, line = %raw, "Malformed metric line");
                if self.echo {
                    display::print_parse_error(reason, raw);
                }
            }
            DecodedEvent::Unrecognized(raw) => {
                self.summary.unrecognized += 1;
                tracing::debug!(line = %raw, "Trainer output");
                if self.echo {
                    display::print_trainer_line(raw);
                }
            }
        }

        event
    }

    /// Read the source to the end, returning the collected counters.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. An I/O error ends the
    /// read the same way end of input does and is recorded in the summary.
    pub async fn run<R>(mut self, source: R) -> ReaderSummary
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    self.handle_line(&line);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Trainer stream read failed");
                    self.summary.io_error = Some(e.to_string());
                    break;
                }
            }
        }

        tracing::debug!(
            lines = self.summary.lines,
            samples = self.summary.samples,
            "Trainer stream closed"
        );
        if !self.store.is_finished() {
            tracing::warn!(
                samples = self.summary.samples,
                "Trainer stream closed without a completion signal"
            );
        }
        self.summary
    }

    /// Run the reader on its own task.
    pub fn spawn<R>(self, source: R) -> JoinHandle<ReaderSummary>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(source))
    }
}

/// Echo every line of a secondary stream (trainer stderr) until it closes.
pub fn spawn_echo<R>(source: R, echo: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(source).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::warn!(line = %line, "Trainer stderr");
                    if echo {
                        display::print_trainer_stderr(&line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Trainer stderr closed with error");
                    break;
                }
            }
        }
    })
}
