//! Update: re-resolve installed binaries and refetch the ones whose content
//! no longer matches the index.

use std::path::PathBuf;
use std::time::Instant;

use grab_core::{Index, InstalledRecord, Tracker};
use grab_schema::Entry;
use tokio::task::JoinSet;
use tracing::debug;

use super::install::{BatchReport, fetch_all};
use super::{Context, InstallError, file_hash};

/// What an update run would do.
#[derive(Debug, Default)]
pub struct UpdatePlan {
    /// Binaries to refetch, with their install path.
    pub outdated: Vec<(Entry, PathBuf)>,
    /// Binaries already matching the index.
    pub current: Vec<Entry>,
    /// Selections that could not be checked.
    pub failed: Vec<(String, InstallError)>,
}

/// Tracker records named by `names`, or all of them.
fn select<'a>(
    tracker: &'a Tracker,
    names: &[String],
    failed: &mut Vec<(String, InstallError)>,
) -> Vec<&'a InstalledRecord> {
    if names.is_empty() {
        return tracker.iter().map(|(_, record)| record).collect();
    }
    let mut selected = Vec::new();
    for name in names {
        let base = match Entry::parse_token(name) {
            Ok(request) => request.base_name().to_string(),
            Err(e) => {
                failed.push((name.clone(), InstallError::Validation(e.to_string())));
                continue;
            }
        };
        match tracker.get(&base) {
            Some(record) => selected.push(record),
            None => failed.push((
                name.clone(),
                InstallError::Validation(format!("{name} is not installed")),
            )),
        }
    }
    selected
}

/// Work out which selected binaries are outdated.
///
/// Every per-item problem, including a failed hash check, lands in
/// [`UpdatePlan::failed`] without affecting the other selections.
pub async fn plan(
    ctx: &Context,
    index: &Index,
    tracker: &Tracker,
    names: &[String],
) -> UpdatePlan {
    let reporter = ctx.reporter.as_ref();
    let mut plan = UpdatePlan::default();
    let records = select(tracker, names, &mut plan.failed);

    let mut checks = JoinSet::new();
    for record in records {
        let path = record.path.clone();
        if !path.exists() {
            reporter.warning(&format!("{} is missing, skipping", path.display()));
            continue;
        }

        let request = match ctx.provenance.get(&path) {
            Some(tag) => tag,
            None if ctx.config.reown => record.as_request(),
            None => {
                reporter.warning(&format!(
                    "{} was not installed by grab, skipping (set GRAB_REOWN=1 to adopt it)",
                    path.display()
                ));
                continue;
            }
        };

        let entry = match index.resolve(&request) {
            Ok(entry) => entry,
            Err(e) => {
                reporter.failed(&request, &e.to_string());
                plan.failed.push((request.token(false), e.into()));
                continue;
            }
        };

        let installed_version = record.version.clone();
        checks.spawn(async move {
            let outdated = if entry.skips_verification() {
                Ok(entry.version != installed_version)
            } else {
                file_hash(&path)
                    .await
                    .map(|hash| !hash.matches(&entry.content_hash))
            };
            (entry, path, outdated)
        });
    }

    while let Some(joined) = checks.join_next().await {
        match joined {
            Ok((entry, path, Ok(outdated))) => {
                debug!(name = %entry.name, outdated, "Checked");
                if outdated {
                    plan.outdated.push((entry, path));
                } else {
                    plan.current.push(entry);
                }
            }
            Ok((entry, _, Err(e))) => {
                reporter.failed(&entry, &e.to_string());
                plan.failed.push((entry.token(false), e));
            }
            Err(e) => plan.failed.push((
                "<task>".to_string(),
                InstallError::context("Hash check panicked", e),
            )),
        }
    }
    plan
}

/// Refetch every outdated binary in place. Per-item results are collected
/// in the returned report.
pub async fn update(
    ctx: &Context,
    index: &Index,
    tracker: &Tracker,
    names: &[String],
) -> BatchReport {
    let start = Instant::now();
    let reporter = ctx.reporter.as_ref();
    let UpdatePlan {
        outdated,
        current,
        failed,
    } = plan(ctx, index, tracker, names).await;

    if outdated.is_empty() {
        if failed.is_empty() {
            reporter.success(&format!("All {} binaries are up to date", current.len()));
        }
        return BatchReport {
            skipped: current,
            failed,
            ..BatchReport::default()
        };
    }

    reporter.section("Updating");
    let mut report = fetch_all(ctx, outdated, true).await;
    report.skipped = current;
    report.failed.extend(failed);
    if !report.installed.is_empty() {
        reporter.summary(
            report.installed.len(),
            "updated",
            start.elapsed().as_secs_f64(),
        );
    }
    report
}
