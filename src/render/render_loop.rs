//! Periodic render loop sampling the progress store.
//!
//! Each tick takes a snapshot, rebuilds the [`ChartView`] from it and draws.
//! Once a snapshot reports completion the loop moves to
//! [`RenderStatus::Finished`] and stops scheduling ticks.

use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::render::{ChartView, RenderError, RenderStatus, Renderer};
use crate::supervisor::{ProgressStore, Snapshot};

/// Default interval between two ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Empty snapshot, nothing to draw.
    Idle,
    /// The series was rebuilt.
    Updated,
    /// Completion observed; no further ticks.
    Finished,
}

/// Why [`RenderLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderExit {
    Finished,
    Cancelled,
    SurfaceLost,
}

/// Interval-driven chart updater.
#[derive(Debug, Clone)]
pub struct RenderLoop {
    view: ChartView,
    total_epochs: u64,
    interval: Duration,
    ticks: u64,
    draw_errors: u64,
}

impl RenderLoop {
    #[must_use]
    pub fn new(total_epochs: u64, interval: Duration) -> Self {
        Self {
            view: ChartView::initial(total_epochs),
            total_epochs,
            interval,
            ticks: 0,
            draw_errors: 0,
        }
    }

    #[must_use]
    pub fn view(&self) -> &ChartView {
        &self.view
    }

    #[must_use]
    pub fn status(&self) -> RenderStatus {
        self.view.status
    }

    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn draw_errors(&self) -> u64 {
        self.draw_errors
    }

    /// Apply one snapshot. Does not draw.
    pub fn tick(&mut self, snapshot: &Snapshot) -> TickOutcome {
        if self.view.is_finished() {
            return TickOutcome::Finished;
        }
        self.ticks += 1;

        let status = if snapshot.finished {
            RenderStatus::Finished
        } else {
            RenderStatus::Running
        };

        if snapshot.is_empty() {
            if !snapshot.finished {
                return TickOutcome::Idle;
            }
            self.view.status = status;
        } else {
            self.view = ChartView::from_snapshot(snapshot, self.total_epochs, status);
        }

        if snapshot.finished {
            tracing::debug!(
                from = ?RenderStatus::Running,
                to = ?RenderStatus::Finished,
                samples = snapshot.samples.len(),
                "Render state transition"
            );
            TickOutcome::Finished
        } else {
            TickOutcome::Updated
        }
    }

    /// Draw the current view, absorbing transient failures.
    fn draw<R: Renderer>(&mut self, renderer: &mut R) -> Result<(), RenderError> {
        match renderer.draw(&self.view) {
            Ok(()) => Ok(()),
            Err(RenderError::Transient(e)) => {
                self.draw_errors += 1;
                tracing::warn!(error = %e, errors = self.draw_errors, "Frame draw failed");
                Ok(())
            }
            Err(e @ RenderError::SurfaceClosed) => Err(e),
        }
    }

    /// Tick on the configured interval until completion is observed, the
    /// surface is lost, or `cancel` fires.
    pub async fn run<R: Renderer>(
        &mut self,
        store: &ProgressStore,
        renderer: &mut R,
        cancel: &CancellationToken,
    ) -> RenderExit {
        if self.draw(renderer).is_err() {
            return RenderExit::SurfaceLost;
        }

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(ticks = self.ticks, "Render loop cancelled");
                    return RenderExit::Cancelled;
                }
                _ = interval.tick() => {
                    let snapshot = store.snapshot();
                    let outcome = self.tick(&snapshot);
                    if outcome != TickOutcome::Idle && self.draw(renderer).is_err() {
                        tracing::warn!("Render surface closed");
                        return RenderExit::SurfaceLost;
                    }
                    if outcome == TickOutcome::Finished {
                        return RenderExit::Finished;
                    }
                }
            }
        }
    }
}
