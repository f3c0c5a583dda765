//! Reporter trait for dependency injection
//!
//! This trait allows core logic to report progress and status without
//! being coupled to a specific terminal implementation.

use grab_schema::Entry;

/// Progress and status sink for pipeline operations.
pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Fetching", "Installing").
    fn section(&self, title: &str);

    /// Updates the progress of a download.
    fn downloading(&self, entry: &Entry, current: u64, total: Option<u64>);

    /// Updates the state of an entry to 'verifying'.
    fn verifying(&self, entry: &Entry);

    /// Marks an entry operation as successfully completed.
    fn done(&self, entry: &Entry, detail: &str);

    /// Marks an entry operation as failed with a specific reason.
    fn failed(&self, entry: &Entry, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a non-fatal warning; suppressed in quiet modes.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, entry: &Entry, current: u64, total: Option<u64>) {
        (**self).downloading(entry, current, total);
    }
    fn verifying(&self, entry: &Entry) {
        (**self).verifying(entry);
    }
    fn done(&self, entry: &Entry, detail: &str) {
        (**self).done(entry, detail);
    }
    fn failed(&self, entry: &Entry, reason: &str) {
        (**self).failed(entry, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn success(&self, msg: &str) {
        (**self).success(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &Entry, _: u64, _: Option<u64>) {}
    fn verifying(&self, _: &Entry) {}
    fn done(&self, _: &Entry, _: &str) {}
    fn failed(&self, _: &Entry, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
