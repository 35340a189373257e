//! Render module: chart view, periodic render loop, drawing surfaces and the
//! captured trainer activity shown next to the chart.

mod chart;
mod log_tail;
mod plain;
mod render_loop;
mod terminal;

pub use chart::*;
pub use log_tail::*;
pub use plain::*;
pub use render_loop::*;
pub use terminal::*;

/// Error type for drawing a frame.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// A single frame could not be drawn; the next tick may succeed.
    #[error("Draw failed: {0}")]
    Transient(#[from] std::io::Error),
    /// The drawing surface is gone.
    #[error("Render surface closed")]
    SurfaceClosed,
}

impl RenderError {
    /// Classify an I/O error from a draw call.
    #[must_use]
    pub fn from_draw(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
                Self::SurfaceClosed
            }
            _ => Self::Transient(err),
        }
    }
}

/// A surface the render loop draws onto.
pub trait Renderer {
    /// Draw one frame.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Transient` for a frame that failed and
    /// `RenderError::SurfaceClosed` once the surface is unusable.
    fn draw(&mut self, view: &ChartView) -> Result<(), RenderError>;

    /// Whether the last frame stays on screen after the loop finishes,
    /// waiting for the user to dismiss it.
    fn keeps_surface_open(&self) -> bool {
        false
    }
}
