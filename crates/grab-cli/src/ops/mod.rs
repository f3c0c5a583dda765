//! Install, update, remove and run pipelines.

pub mod busy;
pub mod context;
pub mod error;
pub mod hooks;
pub mod install;
pub mod remove;
pub mod run;
pub mod update;

pub use busy::BusyPaths;
pub use context::Context;
pub use error::InstallError;

use std::path::{Path, PathBuf};

use grab_schema::Blake3Hash;

/// BLAKE3 of the file at `path`, off the async runtime.
pub(crate) async fn file_hash(path: &Path) -> Result<Blake3Hash, InstallError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || Blake3Hash::compute_file(&path))
        .await
        .map_err(|e| InstallError::context("Hashing task failed", e))?
        .map_err(InstallError::from)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use grab_core::config::ConfigFile;
    use grab_core::io::Fetcher;
    use grab_core::provenance::MemoryProvenance;
    use grab_core::{Config, NullReporter};
    use grab_schema::Repository;
    use grab_schema::{Blake3Hash, Entry};
    use tokio_util::sync::CancellationToken;

    use super::Context;

    /// Start of a valid ELF image, enough to pass file-type validation.
    pub const ELF_PAYLOAD: &[u8] = b"\x7fELF\x02\x01\x01\x00grab-test-binary";

    /// Context rooted in `home` with in-memory provenance.
    pub fn context(home: &Path, repositories: Vec<Repository>) -> Context {
        let file = ConfigFile {
            repositories,
            ..ConfigFile::default()
        };
        let config = Config::from_parts(home.to_path_buf(), file, &|_| None);
        let ctx = Context::new(config, Arc::new(NullReporter), CancellationToken::new())
            .expect("context");
        let fetcher = Fetcher::new(ctx.fetcher.client().clone(), CancellationToken::new())
            .with_plain_http(true);
        ctx.with_provenance(Arc::new(MemoryProvenance::default()))
            .with_fetcher(fetcher)
    }

    /// Index entry serving `payload` from `url`.
    pub fn entry(name: &str, pkg_id: &str, version: &str, url: &str, payload: &[u8]) -> Entry {
        Entry {
            name: name.to_string(),
            pkg_id: pkg_id.to_string(),
            version: version.to_string(),
            download_url: url.to_string(),
            size: payload.len() as u64,
            content_hash: Blake3Hash::compute(payload).to_string(),
            repository: "main".to_string(),
            ..Entry::named(name)
        }
    }
}
