//! Shared operation context.
//!
//! Groups the configuration, network clients and capabilities every
//! operation needs so they are passed around as one cheap clone.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use grab_core::io::Fetcher;
use grab_core::trust::{KeyCache, PublicKey};
use grab_core::{Config, Index, ProvenanceStore, Reporter, XattrProvenance};
use grab_schema::Entry;
use tokio_util::sync::CancellationToken;

use super::{BusyPaths, InstallError};

/// Groups common state used during operations.
#[derive(Clone)]
pub struct Context {
    /// Effective configuration.
    pub config: Arc<Config>,
    /// Downloader shared by every fetch.
    pub fetcher: Fetcher,
    /// Progress and outcome sink.
    pub reporter: Arc<dyn Reporter>,
    /// Where ownership tags are read and written.
    pub provenance: Arc<dyn ProvenanceStore>,
    /// Repository public keys.
    pub keys: KeyCache,
    /// Paths claimed by in-flight operations.
    pub busy: BusyPaths,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context with xattr provenance and a fresh HTTP client.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(
        config: Config,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .user_agent(grab_core::USER_AGENT)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| InstallError::context("Failed to build HTTP client", e))?;
        Ok(Self {
            keys: KeyCache::new(config.keys_dir()),
            config: Arc::new(config),
            fetcher: Fetcher::new(client, cancel),
            reporter,
            provenance: Arc::new(XattrProvenance),
            busy: BusyPaths::default(),
        })
    }

    /// Replace the provenance capability.
    pub fn with_provenance(mut self, provenance: Arc<dyn ProvenanceStore>) -> Self {
        self.provenance = provenance;
        self
    }

    /// Replace the fetcher.
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Fetch and merge every configured repository index.
    pub async fn load_index(&self) -> Result<Index, InstallError> {
        Ok(grab_core::repo::load_index(
            self.fetcher.client(),
            &self.config.repositories,
            self.reporter.as_ref(),
        )
        .await?)
    }

    /// Public keys of the repository `entry` came from; empty when the
    /// repository declares none.
    pub async fn keys_for(&self, entry: &Entry) -> Result<Vec<PublicKey>, InstallError> {
        match self.config.repository(&entry.repository) {
            Some(repo) if repo.is_signed() => {
                Ok(self.keys.keys_for(self.fetcher.client(), repo).await?)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Whether grab may replace or delete `path`: it carries our provenance,
    /// or re-owning foreign binaries is allowed.
    pub fn owns(&self, path: &Path) -> bool {
        self.config.reown || self.provenance.get(path).is_some()
    }
}
