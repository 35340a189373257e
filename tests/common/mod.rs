//! Shared test helpers.

use std::collections::VecDeque;

use trainwatch::render::{ChartView, RenderError, Renderer};

/// Renderer that keeps every frame it is asked to draw.
#[derive(Default)]
pub struct RecordingRenderer {
    pub frames: Vec<ChartView>,
    /// Errors returned by the next draws, in order.
    pub failures: VecDeque<RenderError>,
    pub keeps_open: bool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keeping_surface_open() -> Self {
        Self {
            keeps_open: true,
            ..Self::default()
        }
    }

    pub fn last(&self) -> &ChartView {
        self.frames.last().expect("no frame drawn")
    }
}

impl Renderer for RecordingRenderer {
    fn draw(&mut self, view: &ChartView) -> Result<(), RenderError> {
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }
        self.frames.push(view.clone());
        Ok(())
    }

    fn keeps_surface_open(&self) -> bool {
        self.keeps_open
    }
}
