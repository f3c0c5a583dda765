//! Provenance tags and resume state stored as extended file attributes.
//!
//! An installed binary carries its identity (`name#pkgId@repository`)
//! directly on the file, so a later run can recognise "this file was placed
//! by grab, as this package" without a separate database. Filesystems that
//! lack extended attributes read as "no provenance", which the orchestrator
//! treats as "not installed by us".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use grab_schema::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Attribute holding the provenance tag of an installed binary.
pub const PROVENANCE_ATTR: &str = "user.grab.provenance";

/// Attribute holding [`ResumeState`] on an in-flight `.tmp` file.
pub const RESUME_ATTR: &str = "user.grab.resume";

/// Read/write access to provenance tags.
pub trait ProvenanceStore: Send + Sync + std::fmt::Debug {
    /// The entry identity recorded on `path`, if any.
    fn get(&self, path: &Path) -> Option<Entry>;

    /// Record `entry`'s identity on `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tag could not be written.
    fn set(&self, path: &Path, entry: &Entry) -> std::io::Result<()>;

    /// Remove any recorded identity from `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tag exists but could not be removed.
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// Canonical tag value: the short token without version.
pub fn tag_value(entry: &Entry) -> String {
    let mut tagged = Entry::named(entry.name.clone());
    tagged.pkg_id.clone_from(&entry.pkg_id);
    tagged.repository.clone_from(&entry.repository);
    tagged.token(false)
}

/// Extended-attribute backed provenance.
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrProvenance;

impl ProvenanceStore for XattrProvenance {
    fn get(&self, path: &Path) -> Option<Entry> {
        let raw = read_attr(path, PROVENANCE_ATTR)?;
        let value = String::from_utf8(raw).ok()?;
        Entry::parse_token(&value).ok()
    }

    fn set(&self, path: &Path, entry: &Entry) -> std::io::Result<()> {
        write_attr(path, PROVENANCE_ATTR, tag_value(entry).as_bytes())
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        remove_attr(path, PROVENANCE_ATTR)
    }
}

/// In-memory provenance, for callers that cannot or should not touch file
/// metadata.
#[derive(Debug, Default)]
pub struct MemoryProvenance {
    tags: Mutex<HashMap<PathBuf, String>>,
}

impl ProvenanceStore for MemoryProvenance {
    fn get(&self, path: &Path) -> Option<Entry> {
        let tags = self.tags.lock().ok()?;
        tags.get(path).and_then(|v| Entry::parse_token(v).ok())
    }

    fn set(&self, path: &Path, entry: &Entry) -> std::io::Result<()> {
        self.tags
            .lock()
            .map_err(|_| std::io::Error::other("provenance lock poisoned"))?
            .insert(path.to_path_buf(), tag_value(entry));
        Ok(())
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.tags
            .lock()
            .map_err(|_| std::io::Error::other("provenance lock poisoned"))?
            .remove(path);
        Ok(())
    }
}

/// Progress of an interrupted download, persisted on its `.tmp` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Bytes written and hashed so far.
    pub offset: u64,
    /// Hex BLAKE3 of those bytes.
    pub digest: String,
}

impl ResumeState {
    /// Load the state recorded on `tmp`, if any.
    pub fn load(tmp: &Path) -> Option<Self> {
        let raw = read_attr(tmp, RESUME_ATTR)?;
        serde_json::from_slice(&raw).ok()
    }

    /// Persist onto `tmp`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the attribute could not be written.
    pub fn save(&self, tmp: &Path) -> std::io::Result<()> {
        let raw = serde_json::to_vec(self).map_err(std::io::Error::other)?;
        write_attr(tmp, RESUME_ATTR, &raw)
    }

    /// Drop any state recorded on `tmp`.
    pub fn clear(tmp: &Path) {
        if let Err(e) = remove_attr(tmp, RESUME_ATTR) {
            debug!(path = %tmp.display(), error = %e, "Failed to clear resume state");
        }
    }
}

fn read_attr(path: &Path, name: &str) -> Option<Vec<u8>> {
    if !xattr::SUPPORTED_PLATFORM {
        return None;
    }
    match xattr::get(path, name) {
        Ok(v) => v,
        Err(e) => {
            debug!(path = %path.display(), attr = name, error = %e, "xattr read failed");
            None
        }
    }
}

fn write_attr(path: &Path, name: &str, value: &[u8]) -> std::io::Result<()> {
    if !xattr::SUPPORTED_PLATFORM {
        debug!(path = %path.display(), attr = name, "xattrs unsupported on this platform");
        return Ok(());
    }
    match xattr::set(path, name, value) {
        Err(e) if is_unsupported(&e) => {
            debug!(path = %path.display(), attr = name, "xattrs unsupported by filesystem");
            Ok(())
        }
        other => other,
    }
}

fn remove_attr(path: &Path, name: &str) -> std::io::Result<()> {
    if !xattr::SUPPORTED_PLATFORM {
        return Ok(());
    }
    match xattr::remove(path, name) {
        Err(e) if is_unsupported(&e) || e.raw_os_error() == Some(libc::ENODATA) => Ok(()),
        other => other,
    }
}

fn is_unsupported(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::Unsupported
        || matches!(e.raw_os_error(), Some(code) if code == libc::ENOTSUP || code == libc::EOPNOTSUPP)
}
