//! Colored CLI display utilities for plain (non-chart) output.
//!
//! These lines are meant for a human watching the terminal. They are only
//! printed when the terminal is not taken over by the live chart.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::supervisor::WatchOutcome;
use crate::trainer::ReaderSummary;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for echoed trainer lines.
const DEFAULT_MAX_LEN: usize = 160;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Format a metric the way the trainer prints it.
#[must_use]
pub fn format_metric(metric: f64) -> String {
    format!("{metric:.9}")
}

/// Echo a raw line received from the trainer's stdout.
pub fn print_trainer_line(line: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[TRAINER]".dimmed().bold(),
        truncate(line, DEFAULT_MAX_LEN)
    );
    let _ = io::stdout().flush();
}

/// Echo a line the trainer wrote to stderr.
pub fn print_trainer_stderr(line: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[STDERR]".yellow().bold(),
        truncate(line, DEFAULT_MAX_LEN)
    );
    let _ = io::stdout().flush();
}

/// Print a successfully parsed metric update.
pub fn print_sample(epoch: u64, metric: f64) {
    println!(
        "{} {} epoch={} mse={}",
        timestamp().dimmed(),
        "[PARSED]".cyan().bold(),
        epoch,
        format_metric(metric).bold()
    );
    let _ = io::stdout().flush();
}

/// Print a rejected `LOSS:` line.
pub fn print_parse_error(reason: &str, line: &str) {
    println!(
        "{} {} {} line: {}",
        timestamp().dimmed(),
        "[PARSE ERROR]".red().bold(),
        reason,
        truncate(line, DEFAULT_MAX_LEN).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print the completion notice.
pub fn print_training_done() {
    println!(
        "{} {} Training finished.",
        timestamp().dimmed(),
        "[DONE]".green().bold()
    );
    let _ = io::stdout().flush();
}

/// Print that the trainer is being stopped.
pub fn print_shutdown(pid: Option<u32>) {
    println!(
        "{} {} Stopping trainer {}",
        timestamp().dimmed(),
        "[SHUTDOWN]".magenta().bold(),
        pid.map_or(String::new(), |p| format!("pid={p}")).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a build step before running it.
pub fn print_build(command: &str) {
    println!(
        "{} {} Trainer binary not found, building: {}",
        timestamp().dimmed(),
        "[BUILD]".blue().bold(),
        command.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

/// Print the final session summary.
pub fn print_summary(outcome: &WatchOutcome) {
    let status = if outcome.finished {
        "finished".green().to_string()
    } else {
        "incomplete".yellow().to_string()
    };
    let last = outcome.last.map_or_else(
        || "-".to_string(),
        |s| format!("epoch={} mse={}", s.epoch, format_metric(s.metric)),
    );
    let best = outcome.best.map_or_else(
        || "-".to_string(),
        |s| format!("epoch={} mse={}", s.epoch, format_metric(s.metric)),
    );
    println!(
        "{} {} {} samples={} last=({}) best=({}) exit={}",
        timestamp().dimmed(),
        "[SUMMARY]".blue().bold(),
        status,
        outcome.samples,
        last,
        best,
        outcome
            .exit_code
            .map_or_else(|| "-".to_string(), |c| c.to_string())
    );
    if let Some(reader) = &outcome.reader {
        let line = format_reader_summary(reader);
        if reader.malformed > 0 || reader.io_error.is_some() {
            println!("{} {} {}", timestamp().dimmed(), "[SUMMARY]".blue().bold(), line.yellow());
        } else {
            println!("{} {} {}", timestamp().dimmed(), "[SUMMARY]".blue().bold(), line);
        }
    }
    let _ = io::stdout().flush();
}

/// Reader counters for the final summary.
#[must_use]
pub fn format_reader_summary(reader: &ReaderSummary) -> String {
    let mut line = format!(
        "lines={} malformed={} unrecognized={}",
        reader.lines, reader.malformed, reader.unrecognized
    );
    if let Some(err) = &reader.io_error {
        line.push_str(&format!(" read_error={err}"));
    }
    line
}
