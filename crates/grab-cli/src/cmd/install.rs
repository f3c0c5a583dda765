//! Install command

use anyhow::{Context, Result};
use grab_cli::ops;

use super::{Session, check_failures};

/// Install one or more binaries
pub async fn install(session: &Session, tokens: &[String], force: bool) -> Result<()> {
    let index = session.index_for(tokens).await?;
    let report = ops::install::install(&session.ctx, &index, tokens, force).await?;

    let mut tracker = session.tracker()?;
    report.record(&mut tracker);
    tracker.save().context("Failed to save tracker")?;

    check_failures(
        &report.failed,
        report.installed.len() + report.skipped.len() + report.failed.len(),
    )
}
