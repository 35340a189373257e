//! Chart view derived from a progress snapshot.

use serde::Serialize;

use crate::supervisor::{ProgressSample, Snapshot};

/// Value axis used before any sample has been drawn.
pub const DEFAULT_VALUE_BOUNDS: [f64; 2] = [0.0, 0.01];

/// Fraction of the observed value span added above and below the data.
const VALUE_MARGIN: f64 = 0.05;

/// Animation state of the render loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RenderStatus {
    #[default]
    Running,
    Finished,
}

impl RenderStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Finished => "Finished",
        }
    }
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartView {
    /// `(epoch, metric)` points in arrival order.
    pub points: Vec<(f64, f64)>,
    pub epoch_bounds: [f64; 2],
    pub value_bounds: [f64; 2],
    pub status: RenderStatus,
    pub total_epochs: u64,
    pub latest: Option<ProgressSample>,
}

impl ChartView {
    /// Empty chart sized for `total_epochs`.
    #[must_use]
    pub fn initial(total_epochs: u64) -> Self {
        Self {
            points: Vec::new(),
            epoch_bounds: epoch_bounds(total_epochs),
            value_bounds: DEFAULT_VALUE_BOUNDS,
            status: RenderStatus::Running,
            total_epochs,
            latest: None,
        }
    }

    /// Rebuild the whole series from a snapshot. The epoch axis stays fixed;
    /// the value axis is fitted to the finite metrics in the snapshot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_snapshot(snapshot: &Snapshot, total_epochs: u64, status: RenderStatus) -> Self {
        let points: Vec<(f64, f64)> = snapshot
            .samples
            .iter()
            .map(|s| (s.epoch as f64, s.metric))
            .collect();
        let value_bounds =
            fit_value_bounds(snapshot.samples.iter().map(|s| s.metric)).unwrap_or(DEFAULT_VALUE_BOUNDS);

        Self {
            points,
            epoch_bounds: epoch_bounds(total_epochs),
            value_bounds,
            status,
            total_epochs,
            latest: snapshot.last(),
        }
    }

    /// Title shown above the chart.
    #[must_use]
    pub fn title(&self) -> String {
        format!("Loss (MSE) - {}", self.status.label())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == RenderStatus::Finished
    }
}

#[allow(clippy::cast_precision_loss)]
fn epoch_bounds(total_epochs: u64) -> [f64; 2] {
    [0.0, total_epochs as f64 + 1.0]
}

/// Fit `[min, max]` plus margin around the finite values, `None` if there
/// are none.
#[must_use]
pub fn fit_value_bounds(values: impl IntoIterator<Item = f64>) -> Option<[f64; 2]> {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;

    let span = max - min;
    let pad = if span > 0.0 {
        span * VALUE_MARGIN
    } else if max != 0.0 {
        max.abs() * VALUE_MARGIN
    } else {
        DEFAULT_VALUE_BOUNDS[1] * VALUE_MARGIN
    };
    Some([min - pad, max + pad])
}
