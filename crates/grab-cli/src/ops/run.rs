//! Run a binary without installing it.
//!
//! Binaries are fetched into the cache directory, tagged like installs, and
//! reused while their provenance still matches the request. The cache is
//! capped: once it holds more than [`CACHE_CEILING`] files the oldest are
//! evicted in batches of at least [`EVICTION_BATCH`].

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use grab_core::Index;
use grab_schema::Entry;
use tracing::{debug, warn};

use super::install::fetch_one;
use super::{Context, InstallError};

/// Most binaries kept in the run cache.
pub const CACHE_CEILING: usize = 20;

/// Fewest binaries evicted at once when the ceiling is exceeded.
pub const EVICTION_BATCH: usize = 5;

/// Fetch (or reuse) `token` and run it with `args`, returning its exit code.
///
/// With `transparent`, a binary of the same name already on `PATH` wins.
///
/// # Errors
///
/// Parse, resolve, fetch and spawn failures.
pub async fn run(
    ctx: &Context,
    token: &str,
    args: &[String],
    transparent: bool,
) -> Result<i32, InstallError> {
    let request =
        Entry::parse_token(token).map_err(|e| InstallError::Validation(e.to_string()))?;

    if transparent {
        if let Ok(path) = which::which(request.base_name()) {
            debug!(path = %path.display(), "Using binary from PATH");
            return exec(&path, args).await;
        }
    }

    let path = ctx.config.cache_dir.join(request.base_name());
    if !cached(ctx, &request, &path) {
        let index = if request.is_direct() {
            Index::default()
        } else {
            ctx.load_index().await?
        };
        let entry = index.resolve(&request)?;
        fetch_one(ctx, entry, path.clone(), false).await?;
    }

    let code = exec(&path, args).await;
    match prune_cache(&ctx.config.cache_dir, CACHE_CEILING, EVICTION_BATCH, &path) {
        Ok(evicted) if !evicted.is_empty() => debug!(count = evicted.len(), "Evicted cached binaries"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to prune run cache"),
    }
    code
}

/// Whether the cached file at `path` satisfies `request`.
fn cached(ctx: &Context, request: &Entry, path: &Path) -> bool {
    if !request.version.is_empty() || !path.exists() {
        return false;
    }
    let Some(tag) = ctx.provenance.get(path) else {
        return false;
    };
    tag.name == request.name
        && (request.pkg_id.is_empty() || tag.pkg_id == request.pkg_id)
        && (request.repository.is_empty() || tag.repository == request.repository)
}

async fn exec(path: &Path, args: &[String]) -> Result<i32, InstallError> {
    let status = tokio::process::Command::new(path)
        .args(args)
        .status()
        .await
        .map_err(|e| InstallError::context("Failed to execute process", e))?;
    Ok(status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1))
}

/// Evict the oldest cached binaries when the cache holds more than
/// `ceiling`. At least `batch` files go, or as many as it takes to get back
/// under the ceiling. `keep` is never evicted.
///
/// # Errors
///
/// Fails when the cache directory cannot be listed.
pub fn prune_cache(
    dir: &Path,
    ceiling: usize,
    batch: usize,
    keep: &Path,
) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .filter(|p| p.extension().is_none_or(|ext| ext != "tmp"))
        .filter_map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .collect();
    if files.len() <= ceiling {
        return Ok(Vec::new());
    }

    files.sort_by_key(|(modified, _)| *modified);
    let excess = (files.len() - ceiling).max(batch);
    let mut evicted = Vec::with_capacity(excess);
    for (_, path) in files.into_iter().filter(|(_, p)| p != keep).take(excess) {
        match std::fs::remove_file(&path) {
            Ok(()) => evicted.push(path),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to evict"),
        }
    }
    Ok(evicted)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use grab_core::provenance::ProvenanceStore;

    use super::*;
    use crate::ops::testing::context;

    fn fill(dir: &Path, count: usize) -> Vec<PathBuf> {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        (0..count)
            .map(|i| {
                let path = dir.join(format!("bin{i:02}"));
                let file = std::fs::File::create(&path).unwrap();
                file.set_modified(base + Duration::from_secs(i as u64))
                    .unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn prune_below_ceiling_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        fill(dir.path(), CACHE_CEILING);
        let evicted = prune_cache(dir.path(), CACHE_CEILING, EVICTION_BATCH, Path::new("/x"))
            .unwrap();
        assert!(evicted.is_empty());
    }

    #[test]
    fn prune_evicts_oldest_batch() {
        let dir = tempfile::tempdir().unwrap();
        let files = fill(dir.path(), CACHE_CEILING + 1);
        let evicted = prune_cache(dir.path(), CACHE_CEILING, EVICTION_BATCH, Path::new("/x"))
            .unwrap();
        assert_eq!(evicted, files[..EVICTION_BATCH].to_vec());
    }

    #[test]
    fn prune_spares_the_running_binary() {
        let dir = tempfile::tempdir().unwrap();
        let files = fill(dir.path(), CACHE_CEILING + 8);
        let evicted = prune_cache(dir.path(), CACHE_CEILING, EVICTION_BATCH, &files[0]).unwrap();
        assert_eq!(evicted.len(), 8);
        assert!(files[0].exists());
        assert!(!files[8].exists());
    }

    #[test]
    fn cache_hit_requires_matching_tag() {
        let home = tempfile::tempdir().unwrap();
        let ctx = context(home.path(), Vec::new());
        let path = home.path().join("jq");
        std::fs::write(&path, b"\x7fELF").unwrap();

        let request = Entry::parse_token("jq").unwrap();
        assert!(!cached(&ctx, &request, &path));

        ctx.provenance
            .set(&path, &Entry::parse_token("jq#jq.musl@main").unwrap())
            .unwrap();
        assert!(cached(&ctx, &request, &path));
        assert!(cached(&ctx, &Entry::parse_token("jq#jq.musl").unwrap(), &path));
        assert!(!cached(&ctx, &Entry::parse_token("jq#jq.glibc").unwrap(), &path));
        assert!(!cached(&ctx, &Entry::parse_token("jq#jq.musl:1.6").unwrap(), &path));
    }

    #[tokio::test]
    async fn runs_cached_binary() {
        let home = tempfile::tempdir().unwrap();
        let ctx = context(home.path(), Vec::new());
        std::fs::create_dir_all(&ctx.config.cache_dir).unwrap();
        let path = ctx.config.cache_dir.join("tool");
        std::fs::write(&path, "#!/bin/sh\nexit \"$1\"\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        ctx.provenance
            .set(&path, &Entry::parse_token("tool#tool@main").unwrap())
            .unwrap();

        let code = run(&ctx, "tool", &["7".to_string()], false).await.unwrap();
        assert_eq!(code, 7);
    }
}
