//! Repository index loading.
//!
//! Every configured repository is fetched concurrently, decoded and tagged
//! with its name, then merged in configuration order so earlier
//! repositories win ties during resolution.

use std::path::Path;

use reqwest::Client;
use reqwest::header::USER_AGENT;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use grab_schema::{Entry, IndexDocument, IndexError, Repository};

use crate::Reporter;
use crate::resolver::Index;

/// Errors produced while loading repository indexes.
#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    /// No repository is configured.
    #[error("No repositories configured. Add one to config.toml or set GRAB_REPOSITORIES.")]
    NoRepositories,

    /// The index could not be retrieved.
    #[error("Failed to fetch index for '{repo}': {message}")]
    Fetch {
        /// Repository name.
        repo: String,
        /// What went wrong.
        message: String,
    },

    /// The index was retrieved but could not be decoded.
    #[error("Invalid index for '{repo}': {source}")]
    Decode {
        /// Repository name.
        repo: String,
        /// Decoder error.
        source: IndexError,
    },

    /// No repository produced an index.
    #[error("Failed to load any repository index ({} failed)", .0.len())]
    AllFailed(Vec<RepoError>),
}

/// Fetch and decode one repository's entries.
///
/// `file://` URLs and bare paths are read from disk.
///
/// # Errors
///
/// Returns [`RepoError::Fetch`] or [`RepoError::Decode`].
pub async fn fetch_repository(client: &Client, repo: &Repository) -> Result<Vec<Entry>, RepoError> {
    let fetch_err = |message: String| RepoError::Fetch {
        repo: repo.name.clone(),
        message,
    };

    let data = if let Some(path) = local_path(&repo.url) {
        tokio::fs::read(path)
            .await
            .map_err(|e| fetch_err(format!("{}: {e}", path.display())))?
    } else {
        let resp = client
            .get(&repo.url)
            .header(USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_err(e.to_string()))?;
        resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?.to_vec()
    };

    let document = IndexDocument::decode(&data, Some(&repo.url)).map_err(|source| {
        RepoError::Decode {
            repo: repo.name.clone(),
            source,
        }
    })?;
    debug!(repo = %repo.name, entries = document.len(), "Loaded repository index");
    Ok(document.into_entries(&repo.name))
}

/// Fetch every repository concurrently and merge them in order.
///
/// A failing repository is reported as a warning as long as another one
/// loads.
///
/// # Errors
///
/// Returns [`RepoError::NoRepositories`] for an empty list and
/// [`RepoError::AllFailed`] when nothing loads.
pub async fn load_index(
    client: &Client,
    repos: &[Repository],
    reporter: &dyn Reporter,
) -> Result<Index, RepoError> {
    if repos.is_empty() {
        return Err(RepoError::NoRepositories);
    }

    let mut set = JoinSet::new();
    for (position, repo) in repos.iter().cloned().enumerate() {
        let client = client.clone();
        set.spawn(async move { (position, fetch_repository(&client, &repo).await) });
    }

    let mut loaded: Vec<(usize, Vec<Entry>)> = Vec::with_capacity(repos.len());
    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((position, Ok(entries))) => loaded.push((position, entries)),
            Ok((_, Err(e))) => {
                warn!(error = %e, "Repository unavailable");
                failures.push(e);
            }
            Err(e) => failures.push(RepoError::Fetch {
                repo: "<task>".into(),
                message: e.to_string(),
            }),
        }
    }

    if loaded.is_empty() {
        return Err(RepoError::AllFailed(failures));
    }
    for failure in &failures {
        reporter.warning(&failure.to_string());
    }

    loaded.sort_by_key(|(position, _)| *position);
    Ok(Index::merge(loaded.into_iter().map(|(_, entries)| entries)))
}

fn local_path(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(Path::new(path));
    }
    (!url.contains("://")).then(|| Path::new(url))
}
