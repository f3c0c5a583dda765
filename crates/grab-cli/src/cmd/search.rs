//! Search command

use anyhow::Result;
use crossterm::style::Stylize;
use grab_core::Reporter;

use super::Session;

/// Search the merged index
pub async fn search(session: &Session, query: &str, limit: Option<usize>) -> Result<()> {
    let index = session.ctx.load_index().await?;
    let results = index.search(query, limit);
    let output = &session.output;

    if results.is_empty() {
        output.info(&format!("No binaries found matching '{query}'"));
        return Ok(());
    }

    output.section(&format!("Binaries matching '{query}'"));
    for entry in results {
        let note = entry.notes.first().map(String::as_str).unwrap_or_default();
        output.line(format!(
            "  {}  {}  {}",
            entry.colored(),
            entry.version.as_str().dark_grey(),
            note
        ));
    }
    Ok(())
}
