//! UI Actor - Single-threaded event processing
//!
//! Every line grab prints goes through one thread, in the order events were
//! sent. Progress lines are redrawn in place on a terminal and dropped
//! otherwise.

use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::style::Stylize;

use super::{format_size, icons, truncate};

/// Minimum interval between redraws of one progress line.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// Print a section header
    Header(String),
    /// Download progress for one entry
    Progress {
        label: String,
        current: u64,
        total: Option<u64>,
    },
    /// Entry-level status line (done, verifying, failed)
    Status {
        label: String,
        icon: &'static str,
        detail: String,
        is_error: bool,
    },
    /// Plain line on stdout (listings)
    Line(String),
    /// Info message
    Info(String),
    /// Success footer
    Success(String),
    /// Warning message
    Warning(String),
    /// Error message
    Error(String),
    /// Synchronize (wait for all pending renders)
    Sync(tokio::sync::oneshot::Sender<()>),
}

/// Handle to the UI actor thread
#[derive(Debug)]
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
    _handle: thread::JoinHandle<()>,
}

impl UiActor {
    /// Spawn the rendering thread; lines are cut to `width` when given.
    pub fn spawn(width: Option<usize>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver, width));
        Self {
            sender,
            _handle: handle,
        }
    }

    /// Get a cloneable sender for this actor
    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }
}

struct Renderer {
    width: Option<usize>,
    live: bool,
    progress_drawn: bool,
    last_draw: HashMap<String, Instant>,
}

impl Renderer {
    fn fit(&self, line: &str) -> String {
        self.width.map_or_else(|| line.to_string(), |w| truncate(line, w))
    }

    fn clear_progress(&mut self, err: &mut impl Write) {
        if self.progress_drawn {
            let _ = write!(err, "\r\x1b[2K");
            self.progress_drawn = false;
        }
    }

    fn stderr_line(&mut self, line: &str) {
        let mut err = std::io::stderr().lock();
        self.clear_progress(&mut err);
        let _ = writeln!(err, "{}", self.fit(line));
    }

    fn stdout_line(&mut self, line: &str) {
        {
            let mut err = std::io::stderr().lock();
            self.clear_progress(&mut err);
        }
        let _ = writeln!(std::io::stdout().lock(), "{}", self.fit(line));
    }

    fn progress(&mut self, label: &str, current: u64, total: Option<u64>) {
        if !self.live {
            return;
        }
        let now = Instant::now();
        let finished = total.is_some_and(|t| current >= t);
        if let Some(last) = self.last_draw.get(label) {
            if now.duration_since(*last) < PROGRESS_INTERVAL && !finished {
                return;
            }
        }
        self.last_draw.insert(label.to_string(), now);

        let amount = match total {
            Some(t) if t > 0 => format!(
                "{} / {} ({:>3}%)",
                format_size(current),
                format_size(t),
                current.saturating_mul(100) / t
            ),
            _ => format_size(current),
        };
        let line = format!("  {} {label}  {}", icons::ACTIVE.red(), amount.dark_grey());
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[2K{}", self.fit(&line));
        let _ = err.flush();
        self.progress_drawn = true;
    }
}

/// Main event loop for the UI actor
fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>, width: Option<usize>) {
    let mut r = Renderer {
        width,
        live: std::io::stderr().is_terminal(),
        progress_drawn: false,
        last_draw: HashMap::new(),
    };

    while let Ok(event) = receiver.recv() {
        match event {
            UiEvent::Header(title) => {
                r.stderr_line("");
                r.stderr_line(&format!("{} {}", title.bold(), "─".repeat(40).dark_grey()));
            }
            UiEvent::Progress {
                label,
                current,
                total,
            } => r.progress(&label, current, total),
            UiEvent::Status {
                label,
                icon,
                detail,
                is_error,
            } => {
                let icon = if is_error { icon.red() } else { icon.green() };
                r.last_draw.remove(&label);
                r.stderr_line(&format!("  {icon} {label}  {}", detail.dark_grey()));
            }
            UiEvent::Line(line) => r.stdout_line(&line),
            UiEvent::Info(msg) => r.stdout_line(&format!("  {} {msg}", icons::INFO.blue())),
            UiEvent::Success(msg) => {
                r.stderr_line(&format!("  {} {msg}", icons::SUCCESS.green()));
            }
            UiEvent::Warning(msg) => {
                r.stderr_line(&format!("  {} {msg}", icons::WARNING.yellow()));
            }
            UiEvent::Error(msg) => r.stderr_line(&format!("  {} {msg}", icons::ERROR.red())),
            UiEvent::Sync(tx) => {
                let mut err = std::io::stderr().lock();
                r.clear_progress(&mut err);
                let _ = err.flush();
                let _ = std::io::stdout().flush();
                let _ = tx.send(());
            }
        }
    }
}
