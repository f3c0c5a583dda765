//! Domain-specific errors for install, run, update and remove operations

use std::path::PathBuf;

use grab_core::io::FetchError;
use grab_core::repo::RepoError;
use grab_core::resolver::ResolveError;
use grab_core::tracker::TrackerError;
use grab_core::trust::TrustError;
use thiserror::Error;

/// Why an operation on one binary failed.
#[derive(Error, Debug)]
pub enum InstallError {
    /// No index entry satisfies the request.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// Repository indexes could not be loaded.
    #[error(transparent)]
    Index(#[from] RepoError),

    /// Download, verification or signature failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The path is held by a running process or a concurrent operation.
    #[error("{} is in use by a running process or another grab operation", .0.display())]
    Busy(PathBuf),

    /// An integration hook could not start or exited non-zero.
    #[error("Integration hook failed: {0}")]
    Hook(String),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tracker store could not be read or written.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The request itself is unacceptable.
    #[error("{0}")]
    Validation(String),

    /// A lower-level failure with a description of what was attempted.
    #[error("{context}: {message}")]
    Context {
        /// What was being attempted.
        context: &'static str,
        /// The underlying error.
        message: String,
    },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}

impl From<TrustError> for InstallError {
    fn from(err: TrustError) -> Self {
        Self::Fetch(FetchError::Trust(err))
    }
}

impl From<anyhow::Error> for InstallError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
