//! List command

use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::style::Stylize;
use grab_cli::ui::format_size;
use grab_core::Reporter;

use super::Session;

/// List index entries, or installed binaries with `installed`
pub async fn list(session: &Session, limit: Option<usize>, installed: bool) -> Result<()> {
    let output = &session.output;
    let limit = limit.unwrap_or(usize::MAX);

    if installed {
        let tracker = session.tracker()?;
        if tracker.is_empty() {
            output.info("No binaries installed");
            return Ok(());
        }
        output.section("Installed");
        for (base, record) in tracker.iter().take(limit) {
            let when = DateTime::from_timestamp(record.installed_at, 0)
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            output.line(format!(
                "  {} {:<12} {:>9}  {}  {}",
                format!("{base:<20}").bold(),
                record.version,
                format_size(record.size),
                when.dark_grey(),
                record.as_request().token(false).dark_grey(),
            ));
        }
        return Ok(());
    }

    let index = session.ctx.load_index().await?;
    for entry in index.entries().iter().take(limit) {
        output.line(format!("  {}  {}", entry.colored(), entry.version.as_str().dark_grey()));
    }
    output.info(&format!(
        "{} of {} entries",
        index.len().min(limit),
        index.len()
    ));
    Ok(())
}
