//! Unified UI output interface.

use std::sync::{OnceLock, mpsc};

use grab_core::Reporter;
use grab_schema::Entry;

use super::actor::{UiActor, UiEvent};
use super::{Verbosity, icons};

/// Singleton instance of the UI actor channel.
static UI_ACTOR: OnceLock<mpsc::Sender<UiEvent>> = OnceLock::new();

fn actor_sender(width: Option<usize>) -> mpsc::Sender<UiEvent> {
    UI_ACTOR
        .get_or_init(|| {
            let actor = UiActor::spawn(width);
            let sender = actor.sender();
            // Keep actor alive for program duration
            std::mem::forget(actor);
            sender
        })
        .clone()
}

/// A cloneable handle for sending UI events to the terminal actor.
#[derive(Debug, Clone)]
pub struct Output {
    sender: mpsc::Sender<UiEvent>,
    verbosity: Verbosity,
}

impl Output {
    /// Create an output handle; lines are cut to the terminal width unless
    /// `no_truncate` is set.
    pub fn new(verbosity: Verbosity, no_truncate: bool) -> Self {
        let width = if no_truncate {
            None
        } else {
            super::terminal_width()
        };
        Self {
            sender: actor_sender(width),
            verbosity,
        }
    }

    /// Active verbosity level.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn send(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }

    fn status(&self, entry: &Entry, icon: &'static str, detail: &str, is_error: bool) {
        self.send(UiEvent::Status {
            label: entry.colored(),
            icon,
            detail: detail.to_string(),
            is_error,
        });
    }

    /// Print a result line on stdout (listings, info). Suppressed only in
    /// the silent modes.
    pub fn line(&self, line: impl Into<String>) {
        if self.verbosity.shows_progress() {
            self.send(UiEvent::Line(line.into()));
        }
    }

    /// Block until all pending UI events are processed.
    pub async fn flush(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(UiEvent::Sync(tx));
        let _ = rx.await;
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        if self.verbosity.shows_progress() {
            self.send(UiEvent::Header(title.to_string()));
        }
    }

    fn downloading(&self, entry: &Entry, current: u64, total: Option<u64>) {
        if self.verbosity.shows_progress() {
            self.send(UiEvent::Progress {
                label: entry.colored(),
                current,
                total,
            });
        }
    }

    fn verifying(&self, entry: &Entry) {
        if self.verbosity == Verbosity::Verbose {
            self.status(entry, icons::ACTIVE, "verifying", false);
        }
    }

    fn done(&self, entry: &Entry, detail: &str) {
        if self.verbosity.shows_progress() {
            self.status(entry, icons::SUCCESS, detail, false);
        }
    }

    fn failed(&self, entry: &Entry, reason: &str) {
        if self.verbosity.shows_errors() {
            self.status(entry, icons::ERROR, reason, true);
        }
    }

    fn info(&self, msg: &str) {
        if self.verbosity.shows_progress() {
            self.send(UiEvent::Info(msg.to_string()));
        }
    }

    fn success(&self, msg: &str) {
        if self.verbosity.shows_progress() {
            self.send(UiEvent::Success(msg.to_string()));
        }
    }

    fn warning(&self, msg: &str) {
        if self.verbosity.shows_progress() {
            self.send(UiEvent::Warning(msg.to_string()));
        }
    }

    fn error(&self, msg: &str) {
        if self.verbosity.shows_errors() {
            self.send(UiEvent::Error(msg.to_string()));
        }
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        self.success(&format!(
            "{count} binar{} {action} in {elapsed_secs:.1}s",
            if count == 1 { "y" } else { "ies" }
        ));
    }
}
