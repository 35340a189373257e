//! Line-oriented renderer for terminals without the live chart.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::display::format_metric;
use crate::render::{ChartView, RenderError, RenderStatus, Renderer};

/// Prints one progress line whenever the drawn series grows or the run
/// finishes.
#[derive(Debug, Default)]
pub struct PlainRenderer {
    drawn_points: Option<usize>,
    drawn_status: RenderStatus,
    frames: u64,
}

impl PlainRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames that produced output.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Progress line for `view`, `None` if nothing changed since the last
    /// frame.
    #[must_use]
    pub fn progress_line(&self, view: &ChartView) -> Option<String> {
        let unchanged =
            self.drawn_points == Some(view.points.len()) && self.drawn_status == view.status;
        if unchanged {
            return None;
        }
        let detail = view.latest.map_or_else(
            || "no samples".to_string(),
            |s| {
                format!(
                    "epoch {}/{} ({}%) mse={}",
                    s.epoch,
                    view.total_epochs,
                    percent(s.epoch, view.total_epochs),
                    format_metric(s.metric)
                )
            },
        );
        Some(format!("{} {detail}", view.title()))
    }
}

fn percent(epoch: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        (epoch.saturating_mul(100) / total).min(100)
    }
}

impl Renderer for PlainRenderer {
    fn draw(&mut self, view: &ChartView) -> Result<(), RenderError> {
        let Some(line) = self.progress_line(view) else {
            return Ok(());
        };
        let mut out = io::stdout().lock();
        let tag = match view.status {
            RenderStatus::Running => "[PROGRESS]".blue().bold().to_string(),
            RenderStatus::Finished => "[PROGRESS]".green().bold().to_string(),
        };
        writeln!(out, "{tag} {line}").map_err(RenderError::from_draw)?;
        out.flush().map_err(RenderError::from_draw)?;

        self.drawn_points = Some(view.points.len());
        self.drawn_status = view.status;
        self.frames += 1;
        Ok(())
    }
}
