//! Live loss chart drawn in the terminal with ratatui.

use std::io::{self, Stdout};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use futures_util::StreamExt;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Chart, Dataset, GraphType, Paragraph};
use tracing::Level;
use ratatui::{Frame, Terminal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::display::format_metric;
use crate::render::{ChartView, LogEntry, LogTail, RenderError, RenderStatus, Renderer};

/// Height of the trainer activity pane, borders included.
const LOG_PANE_HEIGHT: u16 = 8;

/// Restores the terminal when dropped.
#[derive(Debug)]
struct ScreenGuard;

impl ScreenGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        if let Err(e) = io::stdout().execute(EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        Ok(Self)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = io::stdout().execute(crossterm::cursor::Show);
    }
}

/// Renderer owning a ratatui terminal.
pub struct TerminalChart<B: Backend> {
    terminal: Terminal<B>,
    log: Option<LogTail>,
    _guard: Option<ScreenGuard>,
}

impl TerminalChart<CrosstermBackend<Stdout>> {
    /// Take over stdout: raw mode plus alternate screen, undone on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be configured.
    pub fn stdout() -> io::Result<Self> {
        let guard = ScreenGuard::enter()?;
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.hide_cursor()?;
        terminal.clear()?;
        Ok(Self {
            terminal,
            log: None,
            _guard: Some(guard),
        })
    }
}

impl<B: Backend> TerminalChart<B> {
    /// Wrap an existing terminal without touching the screen mode.
    #[must_use]
    pub fn new(terminal: Terminal<B>) -> Self {
        Self {
            terminal,
            log: None,
            _guard: None,
        }
    }

    /// Show the latest entries of `tail` in a pane below the chart.
    #[must_use]
    pub fn with_log_tail(mut self, tail: LogTail) -> Self {
        self.log = Some(tail);
        self
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }
}

impl<B: Backend> Renderer for TerminalChart<B> {
    fn draw(&mut self, view: &ChartView) -> Result<(), RenderError> {
        let log = self
            .log
            .as_ref()
            .map(|tail| tail.recent(usize::from(LOG_PANE_HEIGHT - 2)));
        self.terminal
            .draw(|frame| draw_chart(frame, view, log.as_deref()))
            .map(|_| ())
            .map_err(RenderError::from_draw)
    }

    fn keeps_surface_open(&self) -> bool {
        true
    }
}

/// Axis label for a loss value; tiny values switch to scientific notation.
#[must_use]
pub fn format_axis_value(value: f64) -> String {
    if value != 0.0 && value.abs() < 1e-3 {
        format!("{value:.2e}")
    } else {
        format!("{value:.4}")
    }
}

/// Draw the chart, the trainer activity pane when `log` is given, and the
/// status line for `view`.
pub fn draw_chart(frame: &mut Frame<'_>, view: &ChartView, log: Option<&[LogEntry]>) {
    let log_height = if log.is_some() { LOG_PANE_HEIGHT } else { 0 };
    let [chart_area, log_area, status_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(log_height),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let title_color = match view.status {
        RenderStatus::Running => Color::Green,
        RenderStatus::Finished => Color::Red,
    };
    let block = Block::bordered().title(Span::styled(
        format!(" {} ", view.title()),
        Style::default()
            .fg(title_color)
            .add_modifier(Modifier::BOLD),
    ));

    let [x_min, x_max] = view.epoch_bounds;
    let [y_min, y_max] = view.value_bounds;

    let dataset = Dataset::default()
        .name("MSE")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&view.points);

    let chart = Chart::new(vec![dataset])
        .block(block)
        .x_axis(
            Axis::default()
                .title("Epoch")
                .style(Style::default().fg(Color::DarkGray))
                .bounds(view.epoch_bounds)
                .labels(vec![
                    format!("{x_min:.0}"),
                    format!("{:.0}", (x_min + x_max) / 2.0),
                    format!("{x_max:.0}"),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("MSE")
                .style(Style::default().fg(Color::DarkGray))
                .bounds(view.value_bounds)
                .labels(vec![
                    format_axis_value(y_min),
                    format_axis_value((y_min + y_max) / 2.0),
                    format_axis_value(y_max),
                ]),
        );
    frame.render_widget(chart, chart_area);

    if let Some(entries) = log {
        let lines: Vec<Line<'_>> = entries.iter().map(log_line).collect();
        let pane = Paragraph::new(lines).block(
            Block::bordered()
                .title(" Trainer output ")
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        frame.render_widget(pane, log_area);
    }

    frame.render_widget(Paragraph::new(status_line(view)), status_area);
}

fn log_line(entry: &LogEntry) -> Line<'_> {
    let style = if entry.level == Level::ERROR {
        Style::default().fg(Color::Red)
    } else if entry.level == Level::WARN {
        Style::default().fg(Color::Yellow)
    } else if entry.level == Level::INFO {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::from(vec![
        Span::styled(
            format!("{} ", entry.timestamp),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(entry.text.as_str(), style),
    ])
}

fn status_line(view: &ChartView) -> Line<'static> {
    let progress = view.latest.map_or_else(
        || Span::styled("waiting for data...", Style::default().fg(Color::DarkGray)),
        |s| {
            Span::raw(format!(
                "epoch {}/{}  mse {}  points {}",
                s.epoch,
                view.total_epochs,
                format_metric(s.metric),
                view.points.len()
            ))
        },
    );
    let hint = match view.status {
        RenderStatus::Running => "  [q] quit",
        RenderStatus::Finished => "  training finished, [q] close",
    };
    Line::from(vec![
        Span::raw(" "),
        progress,
        Span::styled(hint, Style::default().fg(Color::DarkGray)),
    ])
}

/// Returns true for the keys that dismiss the chart.
#[must_use]
pub fn is_dismiss_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Watch terminal input and cancel `cancel` when the user dismisses the
/// chart. Raw mode swallows SIGINT, so Ctrl-C is handled here too.
pub fn spawn_input_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = events.next() => match next {
                    Some(Ok(Event::Key(key))) if is_dismiss_key(&key) => {
                        tracing::debug!(code = ?key.code, "Chart dismissed");
                        cancel.cancel();
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Terminal input failed");
                        break;
                    }
                    None => break,
                },
            }
        }
    })
}
