//! Terminal output.
//!
//! Commands talk to [`Output`], which filters by [`Verbosity`] and forwards
//! events to a single rendering thread ([`actor`]) so concurrent workers
//! never interleave half-written lines.

pub mod actor;
pub mod output;

pub use output::Output;

/// How much grab prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Nothing at all; only the exit code reports failure.
    ExtraSilent,
    /// Errors only.
    Silent,
    /// Progress, results and warnings.
    #[default]
    Normal,
    /// Everything, plus debug logging.
    Verbose,
}

impl Verbosity {
    /// Pick the level from the global flags; the quietest flag wins.
    pub fn from_flags(verbose: bool, silent: bool, extra_silent: bool) -> Self {
        if extra_silent {
            Self::ExtraSilent
        } else if silent {
            Self::Silent
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Whether errors are printed.
    pub fn shows_errors(self) -> bool {
        self >= Self::Silent
    }

    /// Whether progress, info and warnings are printed.
    pub fn shows_progress(self) -> bool {
        self >= Self::Normal
    }
}

/// Status icons.
pub mod icons {
    /// Completed.
    pub const SUCCESS: &str = "✓";
    /// Failed.
    pub const ERROR: &str = "✗";
    /// Warning.
    pub const WARNING: &str = "⚠";
    /// Information.
    pub const INFO: &str = "ℹ";
    /// In progress.
    pub const ACTIVE: &str = "●";
}

/// Format bytes for human-readable display
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}

/// Cut `line` to `width` visible columns, keeping ANSI escape sequences
/// intact and ending with `…` when anything was dropped.
pub fn truncate(line: &str, width: usize) -> String {
    if width == 0 || visible_width(line) <= width {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    let mut visible = 0;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            out.push(c);
            for esc in chars.by_ref() {
                out.push(esc);
                if esc.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        if visible + 1 >= width {
            break;
        }
        out.push(c);
        visible += 1;
    }
    out.push('…');
    if line.contains('\x1b') {
        out.push_str("\x1b[0m");
    }
    out
}

fn visible_width(line: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in line.chars() {
        match (in_escape, c) {
            (false, '\x1b') => in_escape = true,
            (true, c) if c.is_ascii_alphabetic() => in_escape = false,
            (true, _) => {}
            (false, _) => width += 1,
        }
    }
    width
}

/// Terminal width when stdout is a terminal.
pub fn terminal_width() -> Option<usize> {
    use std::io::IsTerminal;
    if !std::io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size().ok().map(|(w, _)| usize::from(w))
}
