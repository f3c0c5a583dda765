//! Update command

use anyhow::{Context, Result};
use grab_cli::ops;
use grab_core::Reporter;

use super::{Session, check_failures};

/// Refetch installed binaries whose content no longer matches the index
pub async fn update(session: &Session, names: &[String]) -> Result<()> {
    let mut tracker = session.tracker()?;
    if tracker.is_empty() {
        session.output.info("Nothing installed yet");
        return Ok(());
    }

    let index = session.ctx.load_index().await?;
    let report = ops::update::update(&session.ctx, &index, &tracker, names).await;
    report.record(&mut tracker);
    tracker.save().context("Failed to save tracker")?;

    check_failures(
        &report.failed,
        report.installed.len() + report.skipped.len() + report.failed.len(),
    )
}
