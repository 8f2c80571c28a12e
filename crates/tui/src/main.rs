//! droptop - dropcoder dashboard
//!
//! Terminal view of the daemon's persisted state. Reads queue.json,
//! current.json, completed.json and errors.json from the state directory on
//! every poll; the daemon never needs to be reachable.

use chrono::{DateTime, Local, Utc};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table},
    Frame, Terminal,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, Stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

const POLL_INTERVAL_MS: u64 = 1000;
const RECENT_LIMIT: usize = 10;

// ============================================================================
// Data Models (mirroring the daemon's state files)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub path: PathBuf,
    pub added: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentJob {
    pub path: PathBuf,
    pub synthetic_progress: u8,
    pub eta: String,
    pub started: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedRecord {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub completed_at: DateTime<Utc>,
}

/// Error kinds are kept as plain strings so newer daemons don't break the view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub path: PathBuf,
    pub kind: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything read from the state directory in one poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateView {
    pub queue: Vec<QueueEntry>,
    pub current: Option<CurrentJob>,
    pub completed: Vec<CompletedRecord>,
    pub errors: Vec<ErrorRecord>,
}

fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("{}: {}", path.display(), e)),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

fn read_current(path: &Path) -> Result<Option<CurrentJob>, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("{}: {}", path.display(), e)),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))?;
    match value {
        serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
        value => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("{}: {}", path.display(), e)),
    }
}

/// Read all four state files from `dir`
///
/// Missing files read as empty. Any unreadable or malformed file fails the
/// whole read so the dashboard never shows a half-updated mix.
pub fn load_state(dir: &Path) -> Result<StateView, String> {
    Ok(StateView {
        queue: read_list(&dir.join("queue.json"))?,
        current: read_current(&dir.join("current.json"))?,
        completed: read_list(&dir.join("completed.json"))?,
        errors: read_list(&dir.join("errors.json"))?,
    })
}

// ============================================================================
// App State
// ============================================================================

/// droptop - live view of a dropcoder state directory
#[derive(Parser, Debug)]
#[command(name = "droptop")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the daemon's state files
    #[arg(short, long, default_value = "state")]
    state_dir: PathBuf,
}

/// Main application state for the dashboard
pub struct App {
    state_dir: PathBuf,
    /// Last successful read
    pub state: Option<StateView>,
    /// Error from the most recent read, if it failed
    pub last_error: Option<String>,
}

impl App {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            state: None,
            last_error: None,
        }
    }

    /// Re-read the state directory
    ///
    /// A failed read keeps the previous view on screen and flags it as stale.
    pub fn refresh(&mut self) {
        match load_state(&self.state_dir) {
            Ok(view) => {
                self.state = Some(view);
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e),
        }
    }
}

// ============================================================================
// Terminal Setup/Teardown
// ============================================================================

/// Initialize the terminal for TUI rendering
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restore terminal to normal state
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ============================================================================
// Formatting
// ============================================================================

/// Format a byte count with binary units, e.g. `1.5 GiB`
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Size reduction in percent; negative when the output grew
fn reduction_percent(original: u64, compressed: u64) -> Option<f64> {
    if original == 0 {
        return None;
    }
    Some((1.0 - compressed as f64 / original as f64) * 100.0)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%m-%d %H:%M:%S").to_string()
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

// ============================================================================
// Widget Rendering
// ============================================================================

fn render_counters(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.state {
        Some(state) => {
            let saved: u64 = state
                .completed
                .iter()
                .map(|c| c.original_size_bytes.saturating_sub(c.compressed_size_bytes))
                .sum();
            Line::from(vec![
                Span::raw(format!(" Queued: {} ", state.queue.len())),
                Span::raw(format!(
                    "| Running: {} ",
                    usize::from(state.current.is_some())
                )),
                Span::styled(
                    format!("| Completed: {} ", state.completed.len()),
                    Style::default().fg(Color::Green),
                ),
                Span::styled(
                    format!("| Errors: {} ", state.errors.len()),
                    Style::default().fg(Color::Red),
                ),
                Span::raw(format!("| Saved: {} ", format_bytes(saved))),
            ])
        }
        None => Line::from(" state unavailable "),
    };

    let title = if app.last_error.is_some() {
        " dropcoder (stale) "
    } else {
        " dropcoder "
    };
    let paragraph =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(paragraph, area);
}

/// Render the current job with its synthetic progress
fn render_current(f: &mut Frame, area: Rect, app: &App) {
    let current = app.state.as_ref().and_then(|s| s.current.as_ref());

    let Some(job) = current else {
        let block = Block::default().borders(Borders::ALL).title(" Current ");
        f.render_widget(Paragraph::new(" idle").block(block), area);
        return;
    };

    let progress = job.synthetic_progress.min(100);
    let title = format!(" Current: {} ", file_name(&job.path));
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(u16::from(progress))
        .label(format!("{}% {}", progress, job.eta));
    f.render_widget(gauge, area);
}

fn render_queue(f: &mut Frame, area: Rect, app: &App) {
    let header = Row::new(["#", "File", "Added"].map(|h| Cell::from(h).style(header_style())));

    let rows: Vec<Row> = app
        .state
        .iter()
        .flat_map(|s| s.queue.iter().enumerate())
        .map(|(i, entry)| {
            Row::new(vec![
                Cell::from(format!("{}", i + 1)),
                Cell::from(file_name(&entry.path)),
                Cell::from(local_time(&entry.added)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Min(20),
        Constraint::Length(16),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Queue "));
    f.render_widget(table, area);
}

fn render_completed(f: &mut Frame, area: Rect, app: &App) {
    let header = Row::new(
        ["Output", "Before", "After", "Saved", "Finished"].map(|h| Cell::from(h).style(header_style())),
    );

    let rows: Vec<Row> = app
        .state
        .iter()
        .flat_map(|s| s.completed.iter().rev().take(RECENT_LIMIT))
        .map(|record| {
            let saved = reduction_percent(record.original_size_bytes, record.compressed_size_bytes)
                .map(|p| format!("{:.1}%", p))
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(file_name(&record.output)),
                Cell::from(format_bytes(record.original_size_bytes)),
                Cell::from(format_bytes(record.compressed_size_bytes)),
                Cell::from(saved),
                Cell::from(local_time(&record.completed_at)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(20),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(7),
        Constraint::Length(16),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Recently completed "));
    f.render_widget(table, area);
}

fn render_errors(f: &mut Frame, area: Rect, app: &App) {
    let header = Row::new(["Path", "Kind", "Reason", "When"].map(|h| Cell::from(h).style(header_style())));

    let rows: Vec<Row> = app
        .state
        .iter()
        .flat_map(|s| s.errors.iter().rev().take(RECENT_LIMIT))
        .map(|record| {
            Row::new(vec![
                Cell::from(file_name(&record.path)),
                Cell::from(record.kind.clone()).style(Style::default().fg(Color::Red)),
                Cell::from(record.reason.clone()),
                Cell::from(local_time(&record.timestamp)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Percentage(30),
        Constraint::Length(18),
        Constraint::Min(20),
        Constraint::Length(16),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Recent errors "));
    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status = match &app.last_error {
        Some(e) => format!(" state unavailable: {} | Press 'q' to quit ", e),
        None => format!(" {} | Press 'q' to quit ", app.state_dir.display()),
    };
    let paragraph =
        Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::DarkGray));
    f.render_widget(paragraph, area);
}

// ============================================================================
// Main UI Layout
// ============================================================================

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // counters
            Constraint::Length(3), // current job
            Constraint::Min(6),    // queue + completed
            Constraint::Length(RECENT_LIMIT as u16 + 3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);

    render_counters(f, chunks[0], app);
    render_current(f, chunks[1], app);
    render_queue(f, middle[0], app);
    render_completed(f, middle[1], app);
    render_errors(f, chunks[3], app);
    render_status_bar(f, chunks[4], app);
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> io::Result<()> {
    let args = Args::parse();

    let mut terminal = setup_terminal()?;
    let mut app = App::new(args.state_dir);
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> io::Result<()> {
    let poll_interval = Duration::from_millis(POLL_INTERVAL_MS);
    let mut last_refresh: Option<Instant> = None;

    loop {
        if last_refresh.map_or(true, |t| t.elapsed() >= poll_interval) {
            app.refresh();
            last_refresh = Some(Instant::now());
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') => app.refresh(),
                        _ => {}
                    }
                }
            }
        }
    }
}
