//! Index resolution.
//!
//! Matches a requested [`Entry`] (usually parsed from a user token) against
//! the merged index of every configured repository.
//!
//! Selection among same-name candidates:
//!
//! 1. a single candidate wins outright;
//! 2. otherwise candidates whose `pkg_id` is not a glibc build are preferred,
//!    and the highest `rank` among them wins;
//! 3. with no such candidate, the highest `rank` overall wins;
//! 4. equal ranks fall back to index order.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use grab_schema::Entry;

/// Substring of a `pkg_id` marking a glibc-linked variant.
pub const GLIBC_MARKER: &str = "glibc";

/// Errors produced during resolution.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing in the merged index matches the request.
    #[error("Package '{request}' not found")]
    NotFound {
        /// The request as the user wrote it.
        request: String,
    },

    /// Every request in a batch failed.
    #[error("No requested package could be resolved ({} failed)", .0.len())]
    AllFailed(Vec<ResolveError>),
}

/// The merged, searchable collection of entries from every repository.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: Vec<Entry>,
}

impl Index {
    /// Wrap an already merged list.
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Merge per-repository entry lists in priority order.
    pub fn merge(parts: impl IntoIterator<Item = Vec<Entry>>) -> Self {
        Self {
            entries: parts.into_iter().flatten().collect(),
        }
    }

    /// All entries in index order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve one request. See [`resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] when nothing matches.
    pub fn resolve(&self, requested: &Entry) -> Result<Entry, ResolveError> {
        resolve(requested, &self.entries)
    }

    /// Fuzzy search over names, package ids and notes, best match first.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<&Entry> {
        let matcher = SkimMatcherV2::default().ignore_case();
        let needle = query.to_lowercase();

        let mut scored: Vec<(i64, &Entry)> = self
            .entries
            .iter()
            .filter_map(|e| {
                let fuzzy = [e.name.as_str(), e.pretty_name.as_str(), e.pkg_id.as_str()]
                    .iter()
                    .filter_map(|field| matcher.fuzzy_match(field, query))
                    .max();
                let in_notes = e.notes.iter().any(|n| n.to_lowercase().contains(&needle));
                match (fuzzy, in_notes) {
                    (Some(score), _) => Some((score, e)),
                    (None, true) => Some((0, e)),
                    (None, false) => None,
                }
            })
            .collect();

        // Stable: equal scores keep index order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .map(|(_, e)| e)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Resolve `requested` against `index`.
///
/// Direct URL requests are returned unchanged. A requested version is
/// satisfied either by the candidate's current version or by one of its
/// snapshots, in which case the returned entry is re-targeted at that
/// snapshot; candidates offering neither are discarded.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] when no candidate matches.
pub fn resolve(requested: &Entry, index: &[Entry]) -> Result<Entry, ResolveError> {
    if requested.is_direct() {
        return Ok(requested.clone());
    }

    let candidates: Vec<Entry> = index
        .iter()
        .filter(|e| e.matches(&requested.name, &requested.pkg_id))
        .filter(|e| requested.repository.is_empty() || e.repository == requested.repository)
        .filter_map(|e| with_version(e, &requested.version))
        .collect();

    tracing::trace!(
        request = %requested.token(true),
        candidates = candidates.len(),
        "Resolving"
    );

    select(candidates).ok_or_else(|| ResolveError::NotFound {
        request: requested.token(true),
    })
}

/// Resolve a batch, reporting per-item outcomes in request order.
///
/// # Errors
///
/// Returns [`ResolveError::AllFailed`] when the batch is non-empty and no
/// request resolved.
pub fn resolve_batch(
    requests: &[Entry],
    index: &[Entry],
) -> Result<Vec<Result<Entry, ResolveError>>, ResolveError> {
    let results: Vec<_> = requests.iter().map(|r| resolve(r, index)).collect();
    if !results.is_empty() && results.iter().all(Result::is_err) {
        return Err(ResolveError::AllFailed(
            results.into_iter().filter_map(Result::err).collect(),
        ));
    }
    Ok(results)
}

fn with_version(candidate: &Entry, version: &str) -> Option<Entry> {
    if version.is_empty() || candidate.version == version {
        return Some(candidate.clone());
    }
    let snapshot = candidate.snapshots.iter().find(|s| s.matches(version))?;
    let mut pinned = candidate.clone();
    pinned.pin_snapshot(snapshot);
    Some(pinned)
}

fn select(mut candidates: Vec<Entry>) -> Option<Entry> {
    if candidates.len() <= 1 {
        return candidates.pop();
    }

    let preferred: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.pkg_id.contains(GLIBC_MARKER))
        .map(|(i, _)| i)
        .collect();

    let pool: Vec<usize> = if preferred.is_empty() {
        (0..candidates.len()).collect()
    } else {
        preferred
    };

    let winner = highest_rank(&candidates, &pool)?;
    Some(candidates.swap_remove(winner))
}

/// First index in `pool` carrying the maximum rank.
fn highest_rank(candidates: &[Entry], pool: &[usize]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for &i in pool {
        match best {
            Some(b) if candidates[b].rank >= candidates[i].rank => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use grab_schema::{NO_CHECK, Snapshot};

    fn entry(name: &str, pkg_id: &str, rank: u32) -> Entry {
        Entry {
            name: name.into(),
            pkg_id: pkg_id.into(),
            rank,
            version: "1.0".into(),
            download_url: format!("https://dl/{pkg_id}"),
            content_hash: "h".into(),
            ..Entry::default()
        }
    }

    fn req(token: &str) -> Entry {
        Entry::parse_token(token).unwrap()
    }

    #[test]
    fn highest_rank_wins() {
        let index = [entry("jq", "a", 3), entry("jq", "b", 5), entry("jq", "c", 1)];
        assert_eq!(resolve(&req("jq"), &index).unwrap().pkg_id, "b");
    }

    #[test]
    fn unranked_falls_back_to_index_order() {
        let index = [entry("jq", "a", 0), entry("jq", "b", 0), entry("jq", "c", 0)];
        assert_eq!(resolve(&req("jq"), &index).unwrap().pkg_id, "a");
    }

    #[test]
    fn non_glibc_preferred_over_rank() {
        let index = [entry("jq", "jq.glibc", 10), entry("jq", "jq.musl", 1)];
        assert_eq!(resolve(&req("jq"), &index).unwrap().pkg_id, "jq.musl");
    }

    #[test]
    fn all_glibc_uses_global_rank() {
        let index = [entry("jq", "x.glibc", 1), entry("jq", "y.glibc", 2)];
        assert_eq!(resolve(&req("jq"), &index).unwrap().pkg_id, "y.glibc");
    }

    #[test]
    fn unknown_pkg_id_is_not_found() {
        let index = [entry("jq", "jq.musl", 1), entry("jq", "jq.glibc", 1)];
        let err = resolve(&req("jq#jq.static"), &index).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotFound {
                request: "jq#jq.static".into()
            }
        );
    }

    #[test]
    fn repository_filter_applies() {
        let mut a = entry("jq", "jq", 1);
        a.repository = "main".into();
        let mut b = entry("jq", "jq", 9);
        b.repository = "extra".into();
        let index = [a, b];
        assert_eq!(resolve(&req("jq@main"), &index).unwrap().repository, "main");
    }

    #[test]
    fn snapshot_version_pins_entry() {
        let mut e = entry("jq", "jq", 1);
        e.download_url = "oci://ghcr.io/org/jq:latest".into();
        e.snapshots = vec![Snapshot {
            commit: "abc123".into(),
            version: "0.9".into(),
        }];
        let index = [e];

        let pinned = resolve(&req("jq#jq:0.9"), &index).unwrap();
        assert_eq!(pinned.download_url, "oci://ghcr.io/org/jq:abc123");
        assert_eq!(pinned.content_hash, NO_CHECK);
        assert_eq!(pinned.version, "0.9");

        let by_commit = resolve(&req("jq#jq:abc123"), &index).unwrap();
        assert_eq!(by_commit.version, "0.9");

        // Current version needs no pinning.
        let current = resolve(&req("jq#jq:1.0"), &index).unwrap();
        assert_eq!(current.content_hash, "h");

        assert!(resolve(&req("jq#jq:7.7"), &index).is_err());
        // The stored entry is untouched.
        assert_eq!(index[0].download_url, "oci://ghcr.io/org/jq:latest");
    }

    #[test]
    fn direct_url_bypasses_index() {
        let r = req("https://example.com/tool");
        assert_eq!(resolve(&r, &[]).unwrap(), r);
    }

    #[test]
    fn batch_tolerates_partial_failure() {
        let index = [entry("jq", "jq", 0)];
        let out = resolve_batch(&[req("jq"), req("nope")], &index).unwrap();
        assert!(out[0].is_ok());
        assert!(out[1].is_err());

        let err = resolve_batch(&[req("nope"), req("nada")], &index).unwrap_err();
        assert!(matches!(err, ResolveError::AllFailed(ref v) if v.len() == 2));
    }

    #[test]
    fn search_ranks_and_limits() {
        let mut notes = entry("ripgrep", "rg", 0);
        notes.notes = vec!["A fast grep replacement".into()];
        let index = Index::merge([vec![entry("jq", "jq", 0), entry("jql", "jql", 0)], vec![notes]]);

        let hits = index.search("jq", None);
        assert_eq!(hits[0].name, "jq");
        assert_eq!(index.search("jq", Some(1)).len(), 1);
        assert_eq!(index.search("replacement", None)[0].name, "ripgrep");
    }
}
