//! Line protocol emitted by the trainer on stdout.
//!
//! The trainer reports progress with two tagged lines:
//!
//! - `LOSS:<epoch>,<mse>` once per epoch,
//! - `TRAINING_DONE` (optionally followed by anything) once at the end.
//!
//! Everything else is free-form output that is echoed but carries no data.

use serde::Serialize;

/// Tag prefix of a metric update line.
pub const LOSS_TAG: &str = "LOSS:";

/// Tag prefix of the completion line.
pub const DONE_TAG: &str = "TRAINING_DONE";

/// A single decoded trainer output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodedEvent {
    /// A `LOSS:` line with a valid epoch and metric.
    MetricUpdate {
        /// Training iteration index.
        epoch: u64,
        /// Loss value reported for that epoch.
        metric: f64,
    },
    /// The `TRAINING_DONE` signal.
    Completion,
    /// A line carrying no recognized tag.
    Unrecognized(String),
    /// A `LOSS:` line whose payload could not be parsed.
    Malformed {
        /// The line as received.
        raw: String,
        /// Why the payload was rejected.
        reason: String,
    },
}

/// Decode one line of trainer output.
///
/// The line must already be stripped of its terminator. Decoding never fails:
/// a bad `LOSS:` payload is reported as [`DecodedEvent::Malformed`].
#[must_use]
pub fn decode_line(line: &str) -> DecodedEvent {
    if let Some(payload) = line.strip_prefix(LOSS_TAG) {
        return match parse_loss_payload(payload) {
            Ok((epoch, metric)) => DecodedEvent::MetricUpdate { epoch, metric },
            Err(reason) => DecodedEvent::Malformed {
                raw: line.to_string(),
                reason,
            },
        };
    }

    if line.starts_with(DONE_TAG) {
        return DecodedEvent::Completion;
    }

    DecodedEvent::Unrecognized(line.to_string())
}

/// Split `<epoch>,<mse>` on the first comma and parse both halves.
fn parse_loss_payload(payload: &str) -> Result<(u64, f64), String> {
    let (epoch_str, metric_str) = payload
        .split_once(',')
        .ok_or_else(|| format!("missing ',' between epoch and metric in {payload:?}"))?;

    let epoch = epoch_str
        .parse::<u64>()
        .map_err(|e| format!("invalid epoch {epoch_str:?}: {e}"))?;
    let metric = metric_str
        .parse::<f64>()
        .map_err(|e| format!("invalid metric {metric_str:?}: {e}"))?;

    Ok((epoch, metric))
}
