//! Busy-path detection.
//!
//! A destination is busy when a running process executes it (the kernel
//! refuses to open it for writing with `ETXTBSY`) or when another worker in
//! this process is already writing it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::InstallError;

/// Paths claimed by in-flight operations of this process.
#[derive(Debug, Clone, Default)]
pub struct BusyPaths {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl BusyPaths {
    /// Claim `path` for the lifetime of the returned guard.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Busy`] when the path is executing or already
    /// claimed.
    pub fn claim(&self, path: &Path) -> Result<BusyGuard, InstallError> {
        if is_executing(path) {
            return Err(InstallError::Busy(path.to_path_buf()));
        }
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| InstallError::Other("busy-path lock poisoned".into()))?;
        if !claimed.insert(path.to_path_buf()) {
            return Err(InstallError::Busy(path.to_path_buf()));
        }
        Ok(BusyGuard {
            claimed: Arc::clone(&self.claimed),
            path: path.to_path_buf(),
        })
    }
}

/// Releases its path when dropped.
#[derive(Debug)]
pub struct BusyGuard {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if let Ok(mut claimed) = self.claimed.lock() {
            claimed.remove(&self.path);
        }
    }
}

/// Whether a running process currently executes `path`.
pub fn is_executing(path: &Path) -> bool {
    match std::fs::OpenOptions::new().write(true).open(path) {
        Ok(_) => false,
        Err(e) => e.raw_os_error() == Some(libc::ETXTBSY),
    }
}
