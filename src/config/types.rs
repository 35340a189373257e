//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::render::DEFAULT_POLL_INTERVAL;
use crate::trainer::{BuildStep, TrainerCommand};

/// Expected number of epochs, used for the epoch axis.
pub const DEFAULT_TOTAL_EPOCHS: u64 = 100;

/// Trainer binary launched when none is given.
pub const DEFAULT_TRAINER: &str = "./central_comando";

/// Build run when the default trainer binary is missing.
pub const DEFAULT_BUILD_COMMAND: &str = "gcc main.c -o central_comando -lm";

/// Time the trainer gets between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for invalid configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// How progress is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UiMode {
    /// Live chart in the alternate screen.
    #[default]
    Chart,
    /// Colored log lines on stdout.
    Plain,
}

impl UiMode {
    /// Whether trainer output is echoed to stdout in this mode.
    #[must_use]
    pub fn echoes(self) -> bool {
        self == Self::Plain
    }
}

/// Configuration for a watch session.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub trainer: TrainerCommand,
    /// Run before spawning when the trainer binary is missing.
    pub build: Option<BuildStep>,
    pub total_epochs: u64,
    pub poll_interval: Duration,
    pub terminate_timeout: Duration,
    pub ui: UiMode,
    pub log_file: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            trainer: TrainerCommand::new(DEFAULT_TRAINER),
            build: None,
            total_epochs: DEFAULT_TOTAL_EPOCHS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            ui: UiMode::default(),
            log_file: None,
        }
    }
}

impl WatchConfig {
    /// Build step implied for `trainer` when none is given: the default
    /// trainer is compiled from `main.c`, any other binary is used as is.
    #[must_use]
    pub fn default_build_for(trainer: &Path) -> Option<BuildStep> {
        if trainer == Path::new(DEFAULT_TRAINER) {
            BuildStep::parse(DEFAULT_BUILD_COMMAND).ok()
        } else {
            None
        }
    }

    /// Check values that would break the render loop.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroPollInterval` for a zero poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}
