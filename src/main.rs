//! trainwatch - supervise a training process and chart its loss live.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trainwatch::config::{
    UiMode, WatchConfig, DEFAULT_TERMINATE_TIMEOUT, DEFAULT_TOTAL_EPOCHS, DEFAULT_TRAINER,
};
use trainwatch::display;
use trainwatch::render::{
    spawn_input_listener, trainer_output_targets, LogTail, PlainRenderer, TailLayer,
    TerminalChart, DEFAULT_POLL_INTERVAL,
};
use trainwatch::supervisor::{Supervisor, SupervisorError, WatchOutcome};
use trainwatch::trainer::{BuildStep, TrainerCommand};

#[derive(Parser)]
#[command(
    name = "trainwatch",
    about = "Supervise a training process and chart its loss live",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn the trainer and chart its progress.
    Run {
        /// Trainer binary.
        #[arg(default_value = DEFAULT_TRAINER)]
        trainer: PathBuf,
        /// Extra arguments passed to the trainer.
        #[arg(last = true)]
        args: Vec<String>,
        /// Let the trainer prompt interactively: do not pass --no-interactive
        /// and give it this terminal's stdin. Implies --plain.
        #[arg(long)]
        interactive: bool,
        /// Command building the trainer when the binary is missing.
        /// Defaults to compiling main.c for ./central_comando.
        #[arg(long, value_name = "CMD", conflicts_with = "no_build")]
        build: Option<String>,
        /// Never build the trainer, even when the binary is missing.
        #[arg(long)]
        no_build: bool,
        /// Time between SIGTERM and SIGKILL, in milliseconds.
        #[arg(long, value_name = "MS", default_value_t = millis(DEFAULT_TERMINATE_TIMEOUT))]
        terminate_timeout_ms: u64,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Chart a captured trainer output file.
    Replay {
        /// File holding trainer stdout.
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(Args)]
struct ViewArgs {
    /// Expected number of epochs (epoch axis size).
    #[arg(long, default_value_t = DEFAULT_TOTAL_EPOCHS)]
    epochs: u64,
    /// Chart refresh interval in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = millis(DEFAULT_POLL_INTERVAL))]
    interval_ms: u64,
    /// Print progress lines instead of drawing the chart.
    #[arg(long)]
    plain: bool,
    /// Write logs to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Print the final summary as JSON.
    #[arg(long)]
    json_summary: bool,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ViewArgs {
    fn apply(&self, config: &mut WatchConfig) {
        config.total_epochs = self.epochs;
        config.poll_interval = Duration::from_millis(self.interval_ms);
        config.ui = if self.plain { UiMode::Plain } else { UiMode::Chart };
        config.log_file.clone_from(&self.log_file);
    }
}

/// Logs go to the log file if given, otherwise to stderr unless the chart
/// owns the terminal. With the chart, trainer activity is also captured into
/// `tail` for its output pane.
fn init_tracing(
    verbosity: u8,
    ui: UiMode,
    log_file: Option<&Path>,
    tail: Option<&LogTail>,
) -> std::io::Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(Mutex::new(File::create(path)?))
                .with_ansi(false)
                .with_filter(filter()),
        ),
        None => None,
    };
    let stderr_layer = (log_file.is_none() && ui == UiMode::Plain)
        .then(|| fmt::layer().with_writer(std::io::stderr).with_filter(filter()));
    let tail_layer = tail
        .map(|tail| TailLayer::new(tail.clone()).with_filter(trainer_output_targets()));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(tail_layer)
        .init();
    Ok(())
}

/// Cancel on SIGINT. In chart mode raw mode turns Ctrl-C into a key press
/// instead, handled by the input listener.
fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            cancel.cancel();
        }
    });
}

enum Source {
    Trainer,
    Replay(PathBuf),
}

async fn watch(
    supervisor: &Supervisor,
    source: &Source,
    tail: Option<LogTail>,
) -> Result<WatchOutcome, SupervisorError> {
    let cancel = supervisor.cancellation();
    spawn_ctrl_c(cancel.clone());

    match supervisor.config().ui {
        UiMode::Plain => {
            let mut renderer = PlainRenderer::new();
            match source {
                Source::Trainer => supervisor.run(&mut renderer).await,
                Source::Replay(path) => supervisor.replay(path, &mut renderer).await,
            }
        }
        UiMode::Chart => {
            let mut renderer = TerminalChart::stdout().map_err(SupervisorError::Terminal)?;
            if let Some(tail) = tail {
                renderer = renderer.with_log_tail(tail);
            }
            let input = spawn_input_listener(cancel.clone());
            let result = match source {
                Source::Trainer => supervisor.run(&mut renderer).await,
                Source::Replay(path) => supervisor.replay(path, &mut renderer).await,
            };
            cancel.cancel();
            let _ = input.await;
            result
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = WatchConfig::default();
    let (source, json_summary) = match &cli.command {
        Commands::Run {
            trainer,
            args,
            interactive,
            build,
            no_build,
            terminate_timeout_ms,
            view,
        } => {
            config.trainer = TrainerCommand::new(trainer)
                .args(args.iter().cloned())
                .unattended(!interactive);
            config.build = match build.as_deref().map(BuildStep::parse).transpose() {
                Ok(Some(step)) => Some(step),
                Ok(None) if *no_build => None,
                Ok(None) => WatchConfig::default_build_for(trainer),
                Err(e) => {
                    display::print_error(&e.to_string());
                    return ExitCode::FAILURE;
                }
            };
            config.terminate_timeout = Duration::from_millis(*terminate_timeout_ms);
            view.apply(&mut config);
            // The chart's raw mode would take the keystrokes meant for the
            // trainer's prompt.
            if *interactive {
                config.ui = UiMode::Plain;
            }
            (Source::Trainer, view.json_summary)
        }
        Commands::Replay { file, view } => {
            view.apply(&mut config);
            (Source::Replay(file.clone()), view.json_summary)
        }
    };

    let tail = (config.ui == UiMode::Chart).then(LogTail::default);
    if let Err(e) = init_tracing(
        cli.verbose,
        config.ui,
        config.log_file.as_deref(),
        tail.as_ref(),
    ) {
        display::print_error(&format!("Cannot open log file: {e}"));
        return ExitCode::FAILURE;
    }

    tracing::info!(
        trainer = %config.trainer.program().display(),
        epochs = config.total_epochs,
        interval = ?config.poll_interval,
        ui = ?config.ui,
        "Starting trainwatch"
    );

    let supervisor = Supervisor::new(config);
    match watch(&supervisor, &source, tail).await {
        Ok(outcome) => {
            if json_summary {
                match serde_json::to_string(&outcome) {
                    Ok(json) => println!("{json}"),
                    Err(e) => display::print_error(&e.to_string()),
                }
            } else {
                display::print_summary(&outcome);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "trainwatch failed");
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
