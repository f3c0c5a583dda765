//! Remove command

use anyhow::{Context, Result};
use grab_cli::ops;

use super::{Session, check_failures};

/// Remove installed binaries
pub async fn remove(session: &Session, tokens: &[String]) -> Result<()> {
    let mut tracker = session.tracker()?;
    let report = ops::remove::remove(&session.ctx, &mut tracker, tokens).await;
    tracker.save().context("Failed to save tracker")?;
    check_failures(&report.failed, report.removed.len() + report.failed.len())
}
