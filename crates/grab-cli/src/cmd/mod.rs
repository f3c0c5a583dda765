//! Command modules - one file per CLI command

pub mod info;
pub mod install;
pub mod list;
pub mod remove;
pub mod run;
pub mod search;
pub mod update;

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use grab_cli::ops::{Context, InstallError};
use grab_cli::ui::{Output, Verbosity};
use grab_core::{Config, Index, Tracker};
use grab_schema::entry::is_absolute_url;
use tokio_util::sync::CancellationToken;

/// State shared by every command invocation.
pub struct Session {
    pub ctx: Context,
    pub output: Output,
}

impl Session {
    /// Load configuration and wire up output and the operation context.
    pub fn open(verbosity: Verbosity, no_truncate: bool, cancel: CancellationToken) -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        let output = Output::new(verbosity, no_truncate || config.no_truncate);
        let ctx = Context::new(config, Arc::new(output.clone()), cancel)?;
        Ok(Self { ctx, output })
    }

    /// The merged index, unless every token is a direct URL.
    pub async fn index_for(&self, tokens: &[String]) -> Result<Index> {
        if !tokens.is_empty() && tokens.iter().all(|t| is_absolute_url(t.trim())) {
            return Ok(Index::default());
        }
        Ok(self.ctx.load_index().await?)
    }

    pub fn tracker(&self) -> Result<Tracker> {
        Tracker::load(&self.ctx.config.tracker_path()).context("Failed to open tracker")
    }
}

/// Turn per-item failures into the command's error.
fn check_failures(failed: &[(String, InstallError)], total: usize) -> Result<()> {
    match failed.len() {
        0 => Ok(()),
        n => bail!("{n} of {total} failed"),
    }
}
