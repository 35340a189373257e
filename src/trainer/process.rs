//! Trainer process spawning and control.
//!
//! This module provides a builder for the trainer command line, an optional
//! build step for producing the trainer binary, and the running process
//! handle with its shutdown sequence.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Flag asking the trainer to skip its interactive prompt after training.
pub const NO_INTERACTIVE_FLAG: &str = "--no-interactive";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("Trainer binary not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The build command ran and failed.
    #[error("Build command `{command}` failed ({status}): {stderr}")]
    BuildFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    /// The build command was empty.
    #[error("Build command is empty")]
    EmptyBuild,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error, program: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(program.display().to_string())
            }
            _ => Self::Io(err),
        }
    }
}

/// Command used to produce the trainer binary when it is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    program: String,
    args: Vec<String>,
}

impl BuildStep {
    /// Parse a whitespace-separated command line such as
    /// `gcc main.c -o central_comando -lm`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::EmptyBuild` if the command has no words.
    pub fn parse(command: &str) -> Result<Self, SpawnError> {
        let mut words = command.split_whitespace().map(String::from);
        let program = words.next().ok_or(SpawnError::EmptyBuild)?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the build to completion.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::BuildFailed` on a non-zero exit, or a spawn error
    /// if the build tool itself cannot be started.
    pub async fn run(&self) -> Result<(), SpawnError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SpawnError::from_io(e, Path::new(&self.program)))?;

        if output.status.success() {
            tracing::info!(command = %self.command_line(), "Build succeeded");
            Ok(())
        } else {
            Err(SpawnError::BuildFailed {
                command: self.command_line(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Run `build` when `binary` does not exist yet.
///
/// Returns whether a build was performed.
///
/// # Errors
///
/// Propagates build failures.
pub async fn ensure_built(binary: &Path, build: Option<&BuildStep>) -> Result<bool, SpawnError> {
    if binary.exists() {
        return Ok(false);
    }
    let Some(step) = build else {
        return Ok(false);
    };
    tracing::info!(binary = %binary.display(), command = %step.command_line(), "Building trainer");
    step.run().await?;
    Ok(true)
}

/// Builder for the trainer command line.
#[derive(Debug, Clone)]
pub struct TrainerCommand {
    program: PathBuf,
    args: Vec<String>,
    unattended: bool,
}

impl TrainerCommand {
    /// Create a new builder for the given program. Unattended by default.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            unattended: true,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether to pass [`NO_INTERACTIVE_FLAG`]. An interactive trainer also
    /// reads from the supervisor's stdin.
    #[must_use]
    pub fn unattended(mut self, unattended: bool) -> Self {
        self.unattended = unattended;
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the trainer is connected to the supervisor's stdin.
    /// Unattended trainers get a closed stdin instead.
    #[must_use]
    pub fn inherits_stdin(&self) -> bool {
        !self.unattended
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if self.unattended && !args.iter().any(|a| a == NO_INTERACTIVE_FLAG) {
            args.push(NO_INTERACTIVE_FLAG.to_string());
        }
        args
    }
}

/// A running trainer process.
#[derive(Debug)]
pub struct TrainerProcess {
    child: Child,
}

impl TrainerProcess {
    /// Spawn the trainer with piped stdout and stderr.
    ///
    /// Stdin is inherited for an interactive trainer so it can prompt the
    /// user, and closed otherwise.
    ///
    /// The child is killed if this handle is dropped while it still runs.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(command: &TrainerCommand) -> Result<Self, SpawnError> {
        let stdin = if command.inherits_stdin() {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        let mut cmd = Command::new(&command.program);
        cmd.args(command.build_args())
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(e, &command.program))?;
        tracing::info!(
            program = %command.program.display(),
            pid = ?child.id(),
            "Spawned trainer"
        );

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the trainer if it is still running and return its exit status.
    ///
    /// A process that already exited is not signalled. Otherwise it gets
    /// SIGTERM (unix), then SIGKILL once `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried or the kill
    /// fails.
    pub async fn shutdown(&mut self, timeout: Duration) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            tracing::debug!(?status, "Trainer already exited");
            return Ok(status);
        }
        self.graceful_terminate(timeout).await?;
        self.child.wait().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.child.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            // Process already reaped
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(errno) = kill(nix_pid, Signal::SIGTERM) {
            tracing::debug!(%errno, pid, "SIGTERM not delivered");
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(pid, ?timeout, "Trainer ignored SIGTERM, killing");
                self.child.kill().await
            }
        }
    }
}
