//! Supervisor runner for orchestrating a watched training run.
//!
//! This module connects the process spawner, the stream reader, the progress
//! store and the render loop, and owns the shutdown sequence.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, WatchConfig};
use crate::display;
use crate::render::{RenderExit, RenderLoop, Renderer};
use crate::supervisor::{ProgressSample, ProgressStore, Snapshot};
use crate::trainer::{ensure_built, spawn_echo, ReaderSummary, SpawnError, StreamReader, TrainerProcess};

/// Error type for supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to start trainer: {0}")]
    Spawn(#[from] SpawnError),
    /// Process stdout was not available.
    #[error("Process stdout not available")]
    NoStdout,
    #[error("Cannot open the terminal chart: {0}")]
    Terminal(#[source] std::io::Error),
    #[error("Failed to open {path}: {source}")]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a watched run.
#[derive(Debug, Clone, Serialize)]
pub struct WatchOutcome {
    /// Number of samples collected.
    pub samples: usize,
    /// Whether the completion signal was observed.
    pub finished: bool,
    pub last: Option<ProgressSample>,
    /// Sample with the lowest finite metric.
    pub best: Option<ProgressSample>,
    /// Reader counters, `None` if the reader did not stop in time.
    pub reader: Option<ReaderSummary>,
    /// Trainer exit code, `None` for replays or signal exits.
    pub exit_code: Option<i32>,
    pub render_exit: RenderExit,
    pub draw_errors: u64,
}

impl WatchOutcome {
    fn new(
        snapshot: &Snapshot,
        reader: Option<ReaderSummary>,
        exit_code: Option<i32>,
        render_exit: RenderExit,
        draw_errors: u64,
    ) -> Self {
        Self {
            samples: snapshot.samples.len(),
            finished: snapshot.finished,
            last: snapshot.last(),
            best: snapshot.best(),
            reader,
            exit_code,
            render_exit,
            draw_errors,
        }
    }
}

/// Orchestrates one trainer run (or replay) and its live chart.
pub struct Supervisor {
    config: WatchConfig,
    cancel: CancellationToken,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Set a cancellation token for dismissal and graceful shutdown.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the render loop and dismisses the chart.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    fn echoes(&self) -> bool {
        self.config.ui.echoes()
    }

    /// Build (if needed) and spawn the trainer, chart its progress, then
    /// stop it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the trainer cannot
    /// be built or started. Nothing is rendered in that case.
    pub async fn run<R: Renderer>(&self, renderer: &mut R) -> Result<WatchOutcome, SupervisorError> {
        self.config.validate()?;

        let program = self.config.trainer.program();
        if let Some(step) = self.config.build.as_ref().filter(|_| !program.exists()) {
            if self.echoes() {
                display::print_build(&step.command_line());
            }
        }
        ensure_built(program, self.config.build.as_ref()).await?;

        let mut process = TrainerProcess::spawn(&self.config.trainer)?;
        let stdout = process.take_stdout().ok_or(SupervisorError::NoStdout)?;
        if let Some(stderr) = process.take_stderr() {
            spawn_echo(stderr, self.echoes());
        }

        let store = ProgressStore::new();
        let reader = StreamReader::new(store.clone())
            .with_echo(self.echoes())
            .spawn(stdout);

        let (render_exit, draw_errors) = self.render(&store, renderer).await;

        if self.echoes() && matches!(process.try_wait(), Ok(None)) {
            display::print_shutdown(process.id());
        }
        let exit_code = match process.shutdown(self.config.terminate_timeout).await {
            Ok(status) => {
                tracing::info!(?status, "Trainer stopped");
                status.code()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to stop trainer");
                None
            }
        };

        let summary = self.join_reader(reader).await;
        Ok(WatchOutcome::new(
            &store.snapshot(),
            summary,
            exit_code,
            render_exit,
            draw_errors,
        ))
    }

    /// Feed captured trainer output from `path` through the same pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the file cannot
    /// be opened.
    pub async fn replay<R: Renderer>(
        &self,
        path: &Path,
        renderer: &mut R,
    ) -> Result<WatchOutcome, SupervisorError> {
        self.config.validate()?;

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| SupervisorError::Replay {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), "Replaying trainer output");

        let store = ProgressStore::new();
        let reader = StreamReader::new(store.clone())
            .with_echo(self.echoes())
            .spawn(file);

        let (render_exit, draw_errors) = self.render(&store, renderer).await;
        let summary = self.join_reader(reader).await;
        Ok(WatchOutcome::new(
            &store.snapshot(),
            summary,
            None,
            render_exit,
            draw_errors,
        ))
    }

    /// Run the render loop; a finished chart that stays on screen is held
    /// until the cancellation token fires.
    async fn render<R: Renderer>(&self, store: &ProgressStore, renderer: &mut R) -> (RenderExit, u64) {
        let mut render_loop = RenderLoop::new(self.config.total_epochs, self.config.poll_interval);
        let exit = render_loop.run(store, renderer, &self.cancel).await;
        tracing::info!(?exit, ticks = render_loop.ticks(), "Render loop stopped");

        if exit == RenderExit::Finished && renderer.keeps_surface_open() {
            self.cancel.cancelled().await;
        }
        (exit, render_loop.draw_errors())
    }

    async fn join_reader(&self, mut handle: JoinHandle<ReaderSummary>) -> Option<ReaderSummary> {
        match tokio::time::timeout(self.config.terminate_timeout, &mut handle).await {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Stream reader task failed");
                None
            }
            Err(_) => {
                tracing::warn!("Stream reader still blocked after shutdown, abandoning it");
                handle.abort();
                None
            }
        }
    }
}
