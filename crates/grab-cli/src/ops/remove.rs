//! Remove installed binaries.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use grab_core::Tracker;
use grab_schema::Entry;
use tokio::task::JoinSet;
use tracing::debug;

use super::busy::BusyGuard;
use super::{Context, InstallError, hooks};

/// Per-item results of a removal batch.
#[derive(Debug, Default)]
pub struct RemoveReport {
    /// Binaries deleted or forgotten.
    pub removed: Vec<Entry>,
    /// Requested token and why it failed.
    pub failed: Vec<(String, InstallError)>,
}

/// Check that `request` may be removed and claim its path.
fn prepare(
    ctx: &Context,
    tracker: &Tracker,
    request: &Entry,
) -> Result<Option<(PathBuf, BusyGuard)>, InstallError> {
    let base = request.base_name();
    let path = tracker
        .get(base)
        .map_or_else(|| ctx.config.install_dir.join(base), |r| r.path.clone());

    if !path.exists() {
        if tracker.get(base).is_some() {
            return Ok(None);
        }
        return Err(InstallError::Validation(format!("{} is not installed", request.name)));
    }

    match ctx.provenance.get(&path) {
        Some(tag) if !request.pkg_id.is_empty() && tag.pkg_id != request.pkg_id => {
            return Err(InstallError::Validation(format!(
                "{} is installed as {}, not {}",
                path.display(),
                tag.token(false),
                request.token(false)
            )));
        }
        Some(_) => {}
        None if ctx.config.reown => {}
        None => {
            return Err(InstallError::Validation(format!(
                "{} was not installed by grab (set GRAB_REOWN=1 to remove it anyway)",
                path.display()
            )));
        }
    }

    let guard = ctx.busy.claim(&path)?;
    Ok(Some((path, guard)))
}

/// Remove `tokens`, forgetting them in `tracker`. Per-item problems are
/// reported and collected.
pub async fn remove(ctx: &Context, tracker: &mut Tracker, tokens: &[String]) -> RemoveReport {
    let start = Instant::now();
    let reporter = ctx.reporter.as_ref();
    let mut report = RemoveReport::default();
    let mut seen = HashSet::new();
    let mut set = JoinSet::new();

    for token in tokens {
        let request = match Entry::parse_token(token) {
            Ok(request) => request,
            Err(e) => {
                reporter.failed(&Entry::named(token.clone()), &e.to_string());
                report
                    .failed
                    .push((token.clone(), InstallError::Validation(e.to_string())));
                continue;
            }
        };
        if !seen.insert(request.base_name().to_string()) {
            continue;
        }

        match prepare(ctx, tracker, &request) {
            Ok(Some((path, guard))) => {
                let ctx = ctx.clone();
                set.spawn(async move {
                    let result = delete(&ctx, &path).await;
                    drop(guard);
                    (request, result)
                });
            }
            Ok(None) => {
                debug!(name = %request.name, "Already gone, forgetting");
                tracker.remove(request.base_name());
                reporter.done(&request, "was already gone");
                report.removed.push(request);
            }
            Err(e) => {
                reporter.failed(&request, &e.to_string());
                report.failed.push((request.token(false), e));
            }
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((request, Ok(()))) => {
                tracker.remove(request.base_name());
                reporter.done(&request, "removed");
                report.removed.push(request);
            }
            Ok((request, Err(e))) => {
                reporter.failed(&request, &e.to_string());
                report.failed.push((request.token(false), e));
            }
            Err(e) => report.failed.push((
                "<task>".to_string(),
                InstallError::context("Remove task panicked", e),
            )),
        }
    }

    if !report.removed.is_empty() {
        reporter.summary(report.removed.len(), "removed", start.elapsed().as_secs_f64());
    }
    report
}

async fn delete(ctx: &Context, path: &std::path::Path) -> Result<(), InstallError> {
    tokio::fs::remove_file(path).await?;
    ctx.provenance.remove(path).ok();
    if let Err(e) = hooks::run_hook(&ctx.config.hooks, path).await {
        ctx.reporter.warning(&e.to_string());
    }
    Ok(())
}
