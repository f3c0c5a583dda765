//! Repository descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named source of entries.
///
/// Repositories are listed in configuration order; that order is the
/// order their entries appear in the merged index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Short name used in `@repository` tokens and provenance tags.
    pub name: String,

    /// URL of the index document (optionally `.gz`/`.zst` compressed).
    pub url: String,

    /// Public keys for detached signature verification, label → key URL.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pubkeys: BTreeMap<String, String>,
}

impl Repository {
    /// Create a repository without signing keys.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            pubkeys: BTreeMap::new(),
        }
    }

    /// Parse a `name=url`, bare `url` or bare local path item. A bare URL is
    /// named after its host, a local path after its file name up to the
    /// first dot.
    ///
    /// # Example
    ///
    /// ```
    /// use grab_schema::Repository;
    ///
    /// let r = Repository::parse_item("main=https://example.com/index.json").unwrap();
    /// assert_eq!(r.name, "main");
    /// let r = Repository::parse_item("https://pkgs.example.org/index.json.zst").unwrap();
    /// assert_eq!(r.name, "pkgs.example.org");
    /// let r = Repository::parse_item("/srv/grab/local.json.gz").unwrap();
    /// assert_eq!(r.name, "local");
    /// ```
    pub fn parse_item(item: &str) -> Option<Self> {
        let item = item.trim();
        if item.is_empty() {
            return None;
        }
        if let Some((name, url)) = item.split_once('=') {
            if !name.contains('/') && !name.is_empty() && !url.is_empty() {
                return Some(Self::new(name.trim(), url.trim()));
            }
        }
        if let Some(path) = local_path(item) {
            let name = path
                .rsplit('/')
                .next()
                .and_then(|file| file.split('.').next())
                .filter(|n| !n.is_empty())?;
            return Some(Self::new(name, item));
        }
        let host = item
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .filter(|h| !h.is_empty())?;
        Some(Self::new(host, item))
    }

    /// Whether entries from this repository require a signature.
    pub fn is_signed(&self) -> bool {
        !self.pubkeys.is_empty()
    }
}

/// The filesystem path behind a `file://` URL or an absolute or relative path.
fn local_path(item: &str) -> Option<&str> {
    item.strip_prefix("file://")
        .or_else(|| item.starts_with(['/', '.']).then_some(item))
}
