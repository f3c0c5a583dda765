//! Install pipeline: parse tokens, resolve, plan and fetch concurrently.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use grab_core::io::FetchOutcome;
use grab_core::{Index, InstalledRecord, Tracker, resolver};
use grab_schema::Entry;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{Context, InstallError, file_hash, hooks};
use crate::ui::format_size;

/// A binary that landed on disk.
#[derive(Debug)]
pub struct Installed {
    /// The resolved entry.
    pub entry: Entry,
    /// Where it was placed.
    pub path: PathBuf,
    /// Hash, size and signature status of the placed file.
    pub outcome: FetchOutcome,
}

/// Per-item results of a batch operation.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Binaries fetched and placed.
    pub installed: Vec<Installed>,
    /// Binaries already up to date.
    pub skipped: Vec<Entry>,
    /// Requested token and why it failed.
    pub failed: Vec<(String, InstallError)>,
}

impl BatchReport {
    fn absorb(&mut self, other: BatchReport) {
        self.installed.extend(other.installed);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    /// Record every installed binary in `tracker`.
    pub fn record(&self, tracker: &mut Tracker) {
        for item in &self.installed {
            tracker.set(
                item.entry.base_name(),
                InstalledRecord::new(
                    &item.entry,
                    &item.path,
                    item.outcome.hash.to_string(),
                    item.outcome.size,
                ),
            );
        }
    }
}

/// Drop repeated requests, keeping first-seen order.
pub fn dedupe(requests: Vec<Entry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter(|r| seen.insert(r.token(true)))
        .collect()
}

/// Narrow a bare-name request to the variant already installed in `dir`.
///
/// A request like `jq` for a file whose provenance reads `jq#jq.musl@main`
/// keeps resolving to that variant instead of whatever ranks best today.
pub fn prefer_provenance(ctx: &Context, mut request: Entry, dir: &Path) -> Entry {
    if request.is_direct() || !request.pkg_id.is_empty() {
        return request;
    }
    let path = dir.join(request.base_name());
    let Some(tag) = ctx.provenance.get(&path) else {
        return request;
    };
    if tag.name != request.name {
        return request;
    }

    debug!(request = %request.token(true), tag = %tag.token(false), "Preferring installed variant");
    request.pkg_id = tag.pkg_id;
    if request.repository.is_empty() && ctx.config.repository(&tag.repository).is_some() {
        request.repository = tag.repository;
    }
    request
}

/// Install `tokens` into the configured install directory.
///
/// Items that fail are reported and collected; the batch continues.
///
/// # Errors
///
/// Returns an error only when nothing in the batch could be resolved.
pub async fn install(
    ctx: &Context,
    index: &Index,
    tokens: &[String],
    force: bool,
) -> Result<BatchReport, InstallError> {
    let start = Instant::now();
    let reporter = ctx.reporter.as_ref();
    let mut report = BatchReport::default();

    let mut requests = Vec::with_capacity(tokens.len());
    for token in tokens {
        match Entry::parse_token(token) {
            Ok(request) => requests.push(request),
            Err(e) => {
                reporter.failed(&Entry::named(token.clone()), &e.to_string());
                report
                    .failed
                    .push((token.clone(), InstallError::Validation(e.to_string())));
            }
        }
    }
    let requests = dedupe(
        dedupe(requests)
            .into_iter()
            .map(|r| prefer_provenance(ctx, r, &ctx.config.install_dir))
            .collect(),
    );
    if requests.is_empty() {
        return Ok(report);
    }

    let resolved = resolver::resolve_batch(&requests, index.entries())?;

    let mut jobs = Vec::new();
    let mut destinations = HashSet::new();
    for (request, result) in requests.iter().zip(resolved) {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                reporter.failed(request, &e.to_string());
                report.failed.push((request.token(true), e.into()));
                continue;
            }
        };

        let dest = ctx.config.install_dir.join(entry.base_name());
        if !destinations.insert(dest.clone()) {
            debug!(dest = %dest.display(), "Already scheduled");
            continue;
        }

        match needs_fetch(ctx, &entry, &dest, force).await {
            Ok(true) => jobs.push((entry, dest)),
            Ok(false) => {
                reporter.done(&entry, "already up to date");
                report.skipped.push(entry);
            }
            Err(e) => {
                reporter.failed(&entry, &e.to_string());
                report.failed.push((entry.token(true), e));
            }
        }
    }

    if !jobs.is_empty() {
        reporter.section("Installing");
    }
    report.absorb(fetch_all(ctx, jobs, true).await);

    if !report.installed.is_empty() {
        reporter.summary(
            report.installed.len(),
            "installed",
            start.elapsed().as_secs_f64(),
        );
    }
    Ok(report)
}

/// Whether `entry` must be fetched to `dest`.
///
/// # Errors
///
/// Refuses to replace a file grab did not install, unless `force` is set.
async fn needs_fetch(
    ctx: &Context,
    entry: &Entry,
    dest: &Path,
    force: bool,
) -> Result<bool, InstallError> {
    if !dest.exists() {
        return Ok(true);
    }
    if !force && !ctx.owns(dest) {
        return Err(InstallError::Validation(format!(
            "{} exists but was not installed by grab (use --force or set GRAB_REOWN=1)",
            dest.display()
        )));
    }
    if force || entry.skips_verification() {
        return Ok(true);
    }
    Ok(!file_hash(dest).await?.matches(&entry.content_hash))
}

/// Fetch every job concurrently. Hooks run after each successful placement
/// when `run_hooks` is set.
pub async fn fetch_all(ctx: &Context, jobs: Vec<(Entry, PathBuf)>, run_hooks: bool) -> BatchReport {
    let mut report = BatchReport::default();
    let mut set = JoinSet::new();
    for (entry, dest) in jobs {
        let ctx = ctx.clone();
        set.spawn(async move {
            let token = entry.token(true);
            let result = fetch_one(&ctx, entry, dest, run_hooks).await;
            (token, result)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(installed))) => report.installed.push(installed),
            Ok((token, Err(e))) => report.failed.push((token, e)),
            Err(e) => report.failed.push((
                "<task>".to_string(),
                InstallError::context("Install task panicked", e),
            )),
        }
    }
    report
}

/// Fetch one entry to `dest`, tag it and run its hook.
///
/// Failures are reported before being returned.
///
/// # Errors
///
/// Busy destinations, key lookup and fetch failures.
pub async fn fetch_one(
    ctx: &Context,
    entry: Entry,
    dest: PathBuf,
    run_hooks: bool,
) -> Result<Installed, InstallError> {
    let result = place(ctx, &entry, &dest).await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            ctx.reporter.failed(&entry, &e.to_string());
            return Err(e);
        }
    };

    if let Err(e) = ctx.provenance.set(&dest, &entry) {
        warn!(path = %dest.display(), error = %e, "Failed to tag provenance");
        ctx.reporter.warning(&format!(
            "{}: could not record provenance: {e}",
            entry.token(false)
        ));
    }
    if run_hooks {
        if let Err(e) = hooks::run_hook(&ctx.config.hooks, &dest).await {
            ctx.reporter
                .warning(&format!("{}: {e}", entry.token(false)));
        }
    }

    let mut detail = format!("{} {}", entry.version, format_size(outcome.size));
    if outcome.signed {
        detail.push_str(" (signed)");
    }
    ctx.reporter.done(&entry, detail.trim_start());
    Ok(Installed {
        entry,
        path: dest,
        outcome,
    })
}

async fn place(ctx: &Context, entry: &Entry, dest: &Path) -> Result<FetchOutcome, InstallError> {
    let _guard = ctx.busy.claim(dest)?;
    let keys = ctx.keys_for(entry).await?;
    Ok(ctx
        .fetcher
        .fetch(entry, dest, &keys, ctx.reporter.as_ref())
        .await?)
}
