//! The canonical record describing one installable artifact.
//!
//! An [`Entry`] is produced either by decoding a repository index document or
//! by parsing a user-supplied token of the form
//! `name[#pkgId[:version]][@repository]`.

use serde::{Deserialize, Serialize};

/// Content hash sentinel meaning "do not verify this download".
///
/// Set on entries re-targeted at a pinned snapshot, where the index has no
/// hash for the historical artifact.
pub const NO_CHECK: &str = "!no_check";

/// URL prefix marking an OCI registry reference.
pub const OCI_PREFIX: &str = "oci://";

/// Errors produced while parsing a user-supplied entry token.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EntryError {
    /// The token had no name component.
    #[error("Empty package name in '{0}'")]
    EmptyName(String),

    /// A delimiter was present but the component after it was empty.
    #[error("Empty {component} in '{token}'")]
    EmptyComponent {
        /// Which component was empty (`pkg_id`, `version` or `repository`).
        component: &'static str,
        /// The offending token.
        token: String,
    },
}

/// A pinned historical release of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Commit or tag identifying the snapshot upstream.
    #[serde(default)]
    pub commit: String,
    /// Version string published for the snapshot.
    #[serde(default)]
    pub version: String,
}

impl Snapshot {
    /// Whether `requested` names this snapshot by commit or by version.
    pub fn matches(&self, requested: &str) -> bool {
        (!self.commit.is_empty() && self.commit == requested)
            || (!self.version.is_empty() && self.version == requested)
    }

    /// The value substituted into a download reference when pinning.
    pub fn tag(&self) -> &str {
        if self.commit.is_empty() {
            &self.version
        } else {
            &self.commit
        }
    }
}

/// One installable artifact and its provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Repository-relative path or identifier.
    pub name: String,

    /// Human-friendly display name.
    #[serde(rename = "prettyName", default, skip_serializing_if = "String::is_empty")]
    pub pretty_name: String,

    /// Stable package identity distinguishing same-name variants.
    #[serde(rename = "pkgId", default, skip_serializing_if = "String::is_empty")]
    pub pkg_id: String,

    /// Published version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Direct HTTPS URL or `oci://image:tag` reference.
    #[serde(rename = "downloadURL", default, skip_serializing_if = "String::is_empty")]
    pub download_url: String,

    /// Artifact size in bytes, zero when unknown.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,

    /// Primary BLAKE3 hash (hex), or [`NO_CHECK`].
    #[serde(rename = "contentHash", default, skip_serializing_if = "String::is_empty")]
    pub content_hash: String,

    /// Advisory SHA-256 hash (hex).
    #[serde(rename = "secondaryHash", default, skip_serializing_if = "String::is_empty")]
    pub secondary_hash: String,

    /// Build timestamp as published by the repository.
    #[serde(rename = "buildDate", default, skip_serializing_if = "String::is_empty")]
    pub build_date: String,

    /// Preference rank; higher wins, zero is unranked.
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub rank: u32,

    /// Historical pinned releases, newest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,

    /// Upstream source locations.
    #[serde(rename = "sourceURLs", default, skip_serializing_if = "Vec::is_empty")]
    pub source_urls: Vec<String>,

    /// Project homepages.
    #[serde(rename = "webURLs", default, skip_serializing_if = "Vec::is_empty")]
    pub web_urls: Vec<String>,

    /// Free-form notes from the repository maintainers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    /// Name of the repository this entry was loaded from.
    ///
    /// Never part of the wire format; set when an index is merged.
    #[serde(skip)]
    pub repository: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

impl Entry {
    /// Create a bare entry with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a user token: `name`, `name#pkgId`, `name#pkgId:version`, each
    /// optionally followed by `@repository`.
    ///
    /// A token that is an absolute `http(s)` URL is returned as a direct
    /// entry whose name and download URL are both the URL.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError`] when the name, or a component following a
    /// delimiter, is empty.
    pub fn parse_token(token: &str) -> Result<Self, EntryError> {
        let token = token.trim();
        if is_absolute_url(token) {
            return Ok(Self {
                name: token.to_string(),
                download_url: token.to_string(),
                ..Self::default()
            });
        }

        let empty = |component| EntryError::EmptyComponent {
            component,
            token: token.to_string(),
        };

        let (rest, repository) = match token.rsplit_once('@') {
            Some((_, "")) => return Err(empty("repository")),
            Some((rest, repo)) => (rest, repo.to_string()),
            None => (token, String::new()),
        };

        let (name, pkg_id, version) = match rest.split_once('#') {
            None => (rest, "", ""),
            Some((_, "")) => return Err(empty("pkg_id")),
            Some((name, ident)) => match ident.split_once(':') {
                None => (name, ident, ""),
                Some((_, "")) => return Err(empty("version")),
                Some(("", _)) => return Err(empty("pkg_id")),
                Some((pkg_id, version)) => (name, pkg_id, version),
            },
        };

        if name.is_empty() {
            return Err(EntryError::EmptyName(token.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            pkg_id: pkg_id.to_string(),
            version: version.to_string(),
            repository,
            ..Self::default()
        })
    }

    /// Format as a token. The version is only emitted when requested and a
    /// `pkg_id` is present, mirroring the grammar accepted by
    /// [`parse_token`](Self::parse_token).
    pub fn token(&self, with_version: bool) -> String {
        let mut out = self.name.clone();
        if !self.pkg_id.is_empty() {
            out.push('#');
            out.push_str(&self.pkg_id);
            if with_version && !self.version.is_empty() {
                out.push(':');
                out.push_str(&self.version);
            }
        }
        if !self.repository.is_empty() {
            out.push('@');
            out.push_str(&self.repository);
        }
        out
    }

    /// Terminal-styled short token.
    pub fn colored(&self) -> String {
        use crossterm::style::Stylize;

        let mut out = self.name.as_str().bold().to_string();
        if !self.pkg_id.is_empty() {
            out.push_str(&format!("#{}", self.pkg_id).dark_grey().to_string());
        }
        if !self.repository.is_empty() {
            out.push_str(&format!("@{}", self.repository).cyan().to_string());
        }
        out
    }

    /// Name shown to users: the pretty name when available.
    pub fn display_name(&self) -> &str {
        if self.pretty_name.is_empty() {
            &self.name
        } else {
            &self.pretty_name
        }
    }

    /// File name this entry installs as (last path segment of `name`).
    pub fn base_name(&self) -> &str {
        if is_absolute_url(&self.name) {
            let path = self.name.split(['?', '#']).next().unwrap_or_default();
            return path.rsplit('/').next().unwrap_or_default();
        }
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Whether the download reference points at an OCI registry.
    pub fn is_oci(&self) -> bool {
        self.download_url.starts_with(OCI_PREFIX)
    }

    /// Whether this entry bypasses index lookup (ad-hoc direct URL).
    pub fn is_direct(&self) -> bool {
        is_absolute_url(&self.name)
    }

    /// Whether verification against `content_hash` should be skipped.
    pub fn skips_verification(&self) -> bool {
        self.content_hash.is_empty() || self.content_hash == NO_CHECK
    }

    /// Whether this entry is matched by a request naming `name` and
    /// optionally `pkg_id` (empty means any variant).
    pub fn matches(&self, name: &str, pkg_id: &str) -> bool {
        self.name == name && (pkg_id.is_empty() || self.pkg_id == pkg_id)
    }

    /// Re-target this entry at a pinned snapshot.
    ///
    /// For OCI references only the final `:tag` segment is replaced. For
    /// plain URLs the current version string, if present in the URL, is
    /// swapped for the snapshot's. The content hash becomes [`NO_CHECK`].
    pub fn pin_snapshot(&mut self, snapshot: &Snapshot) {
        let tag = snapshot.tag();
        if self.is_oci() {
            self.download_url = retag_oci(&self.download_url, tag);
        } else if !self.version.is_empty()
            && !snapshot.version.is_empty()
            && self.download_url.contains(&self.version)
        {
            self.download_url = self
                .download_url
                .replacen(&self.version, &snapshot.version, 1);
        }
        self.content_hash = NO_CHECK.to_string();
        if !snapshot.version.is_empty() {
            self.version.clone_from(&snapshot.version);
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token(false))
    }
}

impl std::str::FromStr for Entry {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_token(s)
    }
}

/// Replace the trailing `:tag` of an `oci://image:tag` reference, appending
/// one when the reference has no tag.
fn retag_oci(reference: &str, tag: &str) -> String {
    match reference.rsplit_once(':') {
        Some((image, current)) if !current.contains('/') && image != "oci" => {
            format!("{image}:{tag}")
        }
        _ => format!("{reference}:{tag}"),
    }
}

/// Whether `s` is a syntactically valid absolute `http`/`https` URL.
///
/// # Example
///
/// ```
/// use grab_schema::entry::is_absolute_url;
///
/// assert!(is_absolute_url("https://example.com/bin/tool"));
/// assert!(!is_absolute_url("tool#com.example.tool"));
/// assert!(!is_absolute_url("https:///missing-host"));
/// ```
pub fn is_absolute_url(s: &str) -> bool {
    let Some(rest) = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
    else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty() && !s.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_token() {
        let e = Entry::parse_token("foo#com.example.foo:1.2.0@myrepo").unwrap();
        assert_eq!(e.name, "foo");
        assert_eq!(e.pkg_id, "com.example.foo");
        assert_eq!(e.version, "1.2.0");
        assert_eq!(e.repository, "myrepo");
    }

    #[test]
    fn short_form_drops_version() {
        let e = Entry::parse_token("foo#com.example.foo:1.2.0@myrepo").unwrap();
        assert_eq!(e.to_string(), "foo#com.example.foo@myrepo");
        assert_eq!(e.token(true), "foo#com.example.foo:1.2.0@myrepo");
    }

    #[test]
    fn parse_partial_tokens() {
        let e = Entry::parse_token("foo").unwrap();
        assert_eq!((e.pkg_id.as_str(), e.repository.as_str()), ("", ""));

        let e = Entry::parse_token("foo@bar").unwrap();
        assert_eq!(e.name, "foo");
        assert_eq!(e.repository, "bar");

        let e = Entry::parse_token("foo#id").unwrap();
        assert_eq!(e.pkg_id, "id");
        assert!(e.version.is_empty());
    }

    #[test]
    fn parse_rejects_empty_components() {
        assert!(matches!(
            Entry::parse_token("#id"),
            Err(EntryError::EmptyName(_))
        ));
        assert!(Entry::parse_token("foo#").is_err());
        assert!(Entry::parse_token("foo#id:").is_err());
        assert!(Entry::parse_token("foo@").is_err());
    }

    #[test]
    fn url_tokens_bypass_grammar() {
        let url = "https://example.com/dl/tool#frag@x";
        let e = Entry::parse_token(url).unwrap();
        assert_eq!(e.name, url);
        assert_eq!(e.download_url, url);
        assert!(e.is_direct());
        assert_eq!(e.base_name(), "tool");
    }

    #[test]
    fn base_name_uses_last_segment() {
        assert_eq!(Entry::named("bin/x86_64/jq").base_name(), "jq");
        assert_eq!(Entry::named("jq").base_name(), "jq");
    }

    #[test]
    fn pin_oci_snapshot_replaces_tag_only() {
        let mut e = Entry {
            name: "jq".into(),
            version: "1.7".into(),
            download_url: "oci://ghcr.io:443/org/jq:latest".into(),
            content_hash: "abc".into(),
            ..Entry::default()
        };
        e.pin_snapshot(&Snapshot {
            commit: "c0ffee".into(),
            version: "1.6".into(),
        });
        assert_eq!(e.download_url, "oci://ghcr.io:443/org/jq:c0ffee");
        assert_eq!(e.content_hash, NO_CHECK);
        assert_eq!(e.version, "1.6");
        assert!(e.skips_verification());
    }

    #[test]
    fn pin_http_snapshot_swaps_version() {
        let mut e = Entry {
            name: "jq".into(),
            version: "1.7".into(),
            download_url: "https://dl.example.com/jq/1.7/jq".into(),
            ..Entry::default()
        };
        e.pin_snapshot(&Snapshot {
            commit: String::new(),
            version: "1.6".into(),
        });
        assert_eq!(e.download_url, "https://dl.example.com/jq/1.6/jq");
    }

    #[test]
    fn deserialize_omits_unknown_and_defaults() {
        let json = r#"{
            "name": "jq",
            "pkgId": "jq.musl",
            "downloadURL": "https://x/jq",
            "rank": 3,
            "snapshots": [{"commit": "abc", "version": "1.0"}],
            "somethingElse": {"nested": true}
        }"#;
        let e: Entry = serde_json::from_str(json).unwrap();
        assert_eq!(e.pkg_id, "jq.musl");
        assert_eq!(e.rank, 3);
        assert_eq!(e.snapshots.len(), 1);
        assert!(e.content_hash.is_empty());

        let out = serde_json::to_string(&e).unwrap();
        assert!(!out.contains("contentHash"));
        assert!(!out.contains("repository"));
    }
}
