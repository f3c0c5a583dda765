//! Info command

use anyhow::Result;
use crossterm::style::Stylize;
use grab_cli::ops::InstallError;
use grab_cli::ui::{Output, format_size};
use grab_core::Reporter;
use grab_schema::Entry;

use super::{Session, check_failures};

/// Resolve tokens and print their full metadata
pub async fn info(session: &Session, tokens: &[String]) -> Result<()> {
    let index = session.index_for(tokens).await?;
    let output = &session.output;
    let mut failed = Vec::new();

    for token in tokens {
        let resolved = Entry::parse_token(token)
            .map_err(|e| InstallError::Validation(e.to_string()))
            .and_then(|request| index.resolve(&request).map_err(InstallError::from));
        match resolved {
            Ok(entry) => print_entry(output, &entry),
            Err(e) => {
                output.failed(&Entry::named(token.clone()), &e.to_string());
                failed.push((token.clone(), e));
            }
        }
    }
    check_failures(&failed, tokens.len())
}

fn print_entry(output: &Output, entry: &Entry) {
    output.section(entry.display_name());
    let field = |label: &str, value: &str| {
        if !value.is_empty() {
            output.line(format!("  {} {value}", format!("{label:<12}").bold()));
        }
    };

    field("Name", &entry.name);
    field("Package", &entry.pkg_id);
    field("Version", &entry.version);
    field("Repository", &entry.repository);
    field("Download", &entry.download_url);
    if entry.size > 0 {
        field("Size", &format_size(entry.size));
    }
    field("BLAKE3", &entry.content_hash);
    field("SHA-256", &entry.secondary_hash);
    field("Built", &entry.build_date);
    if entry.rank > 0 {
        field("Rank", &entry.rank.to_string());
    }
    let snapshots: Vec<&str> = entry
        .snapshots
        .iter()
        .map(|s| if s.version.is_empty() { s.commit.as_str() } else { s.version.as_str() })
        .collect();
    field("Snapshots", &snapshots.join(", "));
    field("Source", &entry.source_urls.join(", "));
    field("Homepage", &entry.web_urls.join(", "));
    for note in &entry.notes {
        field("Note", note);
    }
}
