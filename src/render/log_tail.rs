//! Recent trainer activity captured from tracing events.
//!
//! While the chart owns the terminal, log lines cannot be written to the
//! screen. [`TailLayer`] keeps the latest events from the stream reader in a
//! bounded [`LogTail`] that the chart draws in its own pane.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, Layer};

/// Number of entries kept by [`LogTail::default`].
pub const DEFAULT_TAIL_CAPACITY: usize = 200;

/// Module whose events make up the trainer activity feed.
const TRAINER_OUTPUT_TARGET: &str = "trainwatch::trainer::stream";

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    /// Event message followed by its fields as `key=value`.
    pub text: String,
}

/// Bounded, shared buffer of the most recent entries.
#[derive(Debug, Clone)]
pub struct LogTail {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for LogTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_CAPACITY)
    }
}

impl LogTail {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry, dropping the oldest one when full.
    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` latest entries, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }
}

/// Filter selecting the stream reader events (metric updates, completion,
/// malformed lines and echoed output) at every level down to debug.
#[must_use]
pub fn trainer_output_targets() -> Targets {
    Targets::new().with_target(TRAINER_OUTPUT_TARGET, Level::DEBUG)
}

/// Tracing layer copying events into a [`LogTail`].
#[derive(Debug, Clone)]
pub struct TailLayer {
    tail: LogTail,
}

impl TailLayer {
    #[must_use]
    pub fn new(tail: LogTail) -> Self {
        Self { tail }
    }
}

impl<S> Layer<S> for TailLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        self.tail.push(LogEntry {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            level: *event.metadata().level(),
            text: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: String,
}

impl EntryVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
