//! Tracker of installed binaries.
//!
//! A single JSON document keyed by binary base name. Callers load it once at
//! the start of a command, mutate it in memory and save it at the end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use grab_schema::Entry;
use serde::{Deserialize, Serialize};

/// What grab knows about one installed binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    /// Entry name as resolved.
    pub name: String,
    /// Resolved package id.
    #[serde(default)]
    pub pkg_id: String,
    /// Repository the entry came from.
    #[serde(default)]
    pub repository: String,
    /// Installed version.
    #[serde(default)]
    pub version: String,
    /// BLAKE3 of the installed file.
    #[serde(default)]
    pub content_hash: String,
    /// Installed size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Absolute install path.
    pub path: PathBuf,
    /// Unix timestamp of installation.
    pub installed_at: i64,
}

impl InstalledRecord {
    /// Build a record for `entry` installed at `path`.
    pub fn new(entry: &Entry, path: &Path, content_hash: String, size: u64) -> Self {
        Self {
            name: entry.name.clone(),
            pkg_id: entry.pkg_id.clone(),
            repository: entry.repository.clone(),
            version: entry.version.clone(),
            content_hash,
            size,
            path: path.to_path_buf(),
            installed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The request that re-resolves this record's identity.
    pub fn as_request(&self) -> Entry {
        Entry {
            name: self.name.clone(),
            pkg_id: self.pkg_id.clone(),
            repository: self.repository.clone(),
            ..Entry::default()
        }
    }
}

/// Errors produced by the tracker store.
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    /// Reading or writing the store failed.
    #[error("Tracker I/O error at {path}: {source}")]
    Io {
        /// Store location.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The store is not valid JSON.
    #[error("Tracker file {path} is corrupt: {source}")]
    Corrupt {
        /// Store location.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Key-value store of [`InstalledRecord`]s keyed by base name.
#[derive(Debug, Default)]
pub struct Tracker {
    path: PathBuf,
    records: BTreeMap<String, InstalledRecord>,
    dirty: bool,
}

impl Tracker {
    /// Load from `path`; a missing file is an empty tracker.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let records = match std::fs::read(path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| TrackerError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(TrackerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
            dirty: false,
        })
    }

    /// Write back if anything changed, via a temp file and rename.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Io`] on write failure.
    pub fn save(&mut self) -> Result<(), TrackerError> {
        if !self.dirty {
            return Ok(());
        }
        let io_err = |source| TrackerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_vec_pretty(&self.records).map_err(|source| {
            TrackerError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = crate::paths::tmp_path(&self.path);
        std::fs::write(&tmp, raw).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        self.dirty = false;
        Ok(())
    }

    /// Record for `base_name`.
    pub fn get(&self, base_name: &str) -> Option<&InstalledRecord> {
        self.records.get(base_name)
    }

    /// Insert or replace the record for `base_name`.
    pub fn set(&mut self, base_name: impl Into<String>, record: InstalledRecord) {
        self.records.insert(base_name.into(), record);
        self.dirty = true;
    }

    /// Remove and return the record for `base_name`.
    pub fn remove(&mut self, base_name: &str) -> Option<InstalledRecord> {
        let removed = self.records.remove(base_name);
        self.dirty |= removed.is_some();
        removed
    }

    /// All records, ordered by base name.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &InstalledRecord)> {
        self.records.iter()
    }

    /// Number of tracked binaries.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
