//! Run command - transient execution without install

use anyhow::Result;
use grab_cli::ops;

use super::Session;

/// Run a binary from the cache, returning its exit code
pub async fn run(session: &Session, token: &str, args: &[String], transparent: bool) -> Result<i32> {
    // Let the child own the terminal.
    session.output.flush().await;
    Ok(ops::run::run(&session.ctx, token, args, transparent).await?)
}
