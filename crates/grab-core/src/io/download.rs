//! Content fetcher: resumable, checksum-verified downloads with atomic commit.
//!
//! Bytes stream into `<dest>.tmp` while being hashed. Only after the hash
//! and file type check out is the temp file renamed onto `dest`, so a
//! destination path never holds unverified content.
//!
//! Resume state differs by source. A plain HTTP download resumes from the
//! temp file's length and re-hashes the prefix. An OCI blob resumes from the
//! `{offset, digest}` pair persisted on the temp file, and the prefix digest
//! must match before any byte is appended.

use std::io::SeekFrom;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::{CACHE_CONTROL, PRAGMA, RANGE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use grab_schema::{Blake3Hash, Entry, NO_CHECK, Sha256Hash};

use super::filetype::{self, FileTypeError};
use super::oci::{ImageRef, OciClient, OciError, ResolvedLayer};
use crate::Reporter;
use crate::paths;
use crate::provenance::ResumeState;
use crate::trust::{self, PublicKey, TrustError};

/// Why a fetch failed.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure or an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The downloaded bytes do not hash to the published value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Published hash.
        expected: String,
        /// Hash of the downloaded bytes.
        actual: String,
    },

    /// The content is neither an ELF binary nor a usable script.
    #[error("Invalid file type: {0}")]
    InvalidFileType(#[from] FileTypeError),

    /// Registry lookup failed.
    #[error(transparent)]
    Oci(#[from] OciError),

    /// Signature or key problem.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Interrupted; partial state is kept for a later resume.
    #[error("Download cancelled")]
    Cancelled,
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// BLAKE3 of the installed bytes.
    pub hash: Blake3Hash,
    /// Installed size.
    pub size: u64,
    /// Whether a detached signature was verified.
    pub signed: bool,
}

/// Where the bytes came from, kept for the signature lookup.
enum Source {
    Http(String),
    Oci(Box<ResolvedLayer>),
}

/// Fetches entries from HTTP or OCI sources.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    oci: OciClient,
    cancel: CancellationToken,
}

impl Fetcher {
    /// Fetcher sharing `client`, stopping early once `cancel` fires.
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        Self {
            oci: OciClient::new(client.clone()),
            client,
            cancel,
        }
    }

    /// Talk plain HTTP to OCI registries.
    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.oci = self.oci.with_plain_http(plain_http);
        self
    }

    /// The shared HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch `entry` to `dest`, mode 0755.
    ///
    /// When `keys` is non-empty the published detached signature is checked
    /// after the rename; a bad signature removes `dest` again.
    ///
    /// # Errors
    ///
    /// See [`FetchError`]. On checksum mismatch the temp file is kept for
    /// diagnosis and a later retry; on a rejected file type it is removed.
    pub async fn fetch(
        &self,
        entry: &Entry,
        dest: &Path,
        keys: &[PublicKey],
        reporter: &dyn Reporter,
    ) -> Result<FetchOutcome, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = paths::tmp_path(dest);
        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_else(|| entry.base_name());

        let (hasher, source) = if entry.is_oci() {
            let image = ImageRef::parse(&entry.download_url)?;
            let layer = self.oci.resolve_layer(&image, file_name).await?;
            let hasher = self.download_oci(entry, &layer, &tmp, reporter).await?;
            (hasher, Source::Oci(Box::new(layer)))
        } else {
            let url = source_url(entry).to_string();
            let hasher = self.download_http(entry, &url, &tmp, reporter).await?;
            (hasher, Source::Http(url))
        };

        reporter.verifying(entry);
        let hash = Blake3Hash::from(&hasher);
        check_checksum(entry, &hash, &tmp, reporter).await?;

        let candidate = tmp.clone();
        let file_type = tokio::task::spawn_blocking(move || filetype::validate(&candidate))
            .await
            .map_err(std::io::Error::other)?;
        if let Err(e) = file_type {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }

        tokio::fs::rename(&tmp, dest).await?;
        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755)).await?;
        let size = tokio::fs::metadata(dest).await?.len();

        let signed = if keys.is_empty() {
            false
        } else {
            match self.check_signature(&source, dest, keys).await {
                Ok(Some(())) => true,
                Ok(None) => {
                    reporter.warning(&format!(
                        "{}: no signature published, skipping signature check",
                        entry.token(false)
                    ));
                    false
                }
                Err(e) => {
                    tokio::fs::remove_file(dest).await.ok();
                    return Err(e);
                }
            }
        };

        debug!(name = %entry.name, dest = %dest.display(), %hash, size, signed, "Fetched");
        Ok(FetchOutcome { hash, size, signed })
    }

    async fn download_http(
        &self,
        entry: &Entry,
        url: &str,
        tmp: &Path,
        reporter: &dyn Reporter,
    ) -> Result<blake3::Hasher, FetchError> {
        let mut offset = existing_len(tmp).await;
        if offset > 0 && entry.size > 0 && offset >= entry.size {
            debug!(%url, offset, "Partial download is already complete or oversized, restarting");
            offset = 0;
        }

        let mut resp = self.send(self.request(url, offset)).await?;
        if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(%url, offset, "Range not satisfiable, restarting");
            tokio::fs::remove_file(tmp).await.ok();
            offset = 0;
            resp = self.send(self.request(url, 0)).await?;
        }
        let resp = resp.error_for_status()?;
        if offset > 0 && resp.status() != StatusCode::PARTIAL_CONTENT {
            debug!(%url, status = %resp.status(), "Server ignored range, restarting");
            offset = 0;
        }

        let hasher = if offset > 0 {
            debug!(%url, offset, "Resuming download");
            prefix_hasher(tmp, offset).await?
        } else {
            blake3::Hasher::new()
        };
        let total = resp
            .content_length()
            .map(|len| len + offset)
            .or((entry.size > 0).then_some(entry.size));

        self.stream(entry, resp, tmp, offset, hasher, total, false, reporter)
            .await
    }

    async fn download_oci(
        &self,
        entry: &Entry,
        layer: &ResolvedLayer,
        tmp: &Path,
        reporter: &dyn Reporter,
    ) -> Result<blake3::Hasher, FetchError> {
        let (mut offset, mut hasher) = self.oci_resume_point(tmp).await;

        let mut resp = self
            .oci
            .open_blob(&layer.image, &layer.token, &layer.blob.digest, offset)
            .await?;
        if offset > 0 && resp.status() != StatusCode::PARTIAL_CONTENT {
            debug!(digest = %layer.blob.digest, status = %resp.status(), "Blob range refused, restarting");
            offset = 0;
            hasher = blake3::Hasher::new();
            if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
                resp = self
                    .oci
                    .open_blob(&layer.image, &layer.token, &layer.blob.digest, 0)
                    .await?;
            }
        }
        let resp = resp.error_for_status()?;
        let total = (layer.blob.size > 0).then_some(layer.blob.size);

        self.stream(entry, resp, tmp, offset, hasher, total, true, reporter)
            .await
    }

    /// Validate the persisted resume state against the temp file's prefix.
    async fn oci_resume_point(&self, tmp: &Path) -> (u64, blake3::Hasher) {
        let fresh = (0, blake3::Hasher::new());
        let Some(state) = ResumeState::load(tmp) else {
            return fresh;
        };
        if state.offset == 0 || existing_len(tmp).await < state.offset {
            return fresh;
        }
        match prefix_hasher(tmp, state.offset).await {
            Ok(hasher) if Blake3Hash::from(&hasher).matches(&state.digest) => {
                debug!(path = %tmp.display(), offset = state.offset, "Resuming blob download");
                (state.offset, hasher)
            }
            Ok(_) => {
                warn!(path = %tmp.display(), "Resume digest mismatch, restarting download");
                fresh
            }
            Err(e) => {
                debug!(path = %tmp.display(), error = %e, "Cannot rehash partial download");
                fresh
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream(
        &self,
        entry: &Entry,
        resp: Response,
        tmp: &Path,
        offset: u64,
        mut hasher: blake3::Hasher,
        total: Option<u64>,
        persist_resume: bool,
        reporter: &dyn Reporter,
    ) -> Result<blake3::Hasher, FetchError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(tmp)
            .await?;
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut written = offset;
        let mut stream = resp.bytes_stream();
        reporter.downloading(entry, written, total);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    suspend(&mut file, tmp, written, &hasher, persist_resume).await?;
                    debug!(name = %entry.name, offset = written, "Download interrupted");
                    return Err(FetchError::Cancelled);
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(chunk)) => {
                        file.write_all(&chunk).await?;
                        hasher.update(&chunk);
                        written += chunk.len() as u64;
                        reporter.downloading(entry, written, total);
                    }
                    Some(Err(e)) => {
                        suspend(&mut file, tmp, written, &hasher, persist_resume).await?;
                        return Err(e.into());
                    }
                    None => break,
                },
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        if persist_resume {
            ResumeState::clear(tmp);
        }
        Ok(hasher)
    }

    fn request(&self, url: &str, offset: u64) -> RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header(USER_AGENT, crate::USER_AGENT)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache");
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, FetchError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(FetchError::Cancelled),
            resp = req.send() => Ok(resp?),
        }
    }

    /// `Ok(None)` when no signature is published.
    async fn check_signature(
        &self,
        source: &Source,
        dest: &Path,
        keys: &[PublicKey],
    ) -> Result<Option<()>, FetchError> {
        let text = match source {
            Source::Oci(layer) => match &layer.signature {
                Some(sig) => Some(
                    self.oci
                        .blob_text(&layer.image, &layer.token, &sig.digest)
                        .await?,
                ),
                None => None,
            },
            Source::Http(url) => {
                let resp = self.send(self.request(&format!("{url}.sig"), 0)).await?;
                if resp.status() == StatusCode::NOT_FOUND {
                    None
                } else {
                    Some(resp.error_for_status()?.text().await?)
                }
            }
        };
        let Some(text) = text else {
            return Ok(None);
        };
        trust::verify_file(dest, &text, keys).await?;
        Ok(Some(()))
    }
}

/// URL to download for `entry`: its download URL, or its name for ad-hoc
/// direct requests.
pub fn source_url(entry: &Entry) -> &str {
    if entry.download_url.is_empty() && entry.is_direct() {
        &entry.name
    } else {
        &entry.download_url
    }
}

async fn check_checksum(
    entry: &Entry,
    actual: &Blake3Hash,
    tmp: &Path,
    reporter: &dyn Reporter,
) -> Result<(), FetchError> {
    let mismatch = |expected: &str, actual: &str| FetchError::ChecksumMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    };

    if entry.content_hash == NO_CHECK {
        debug!(name = %entry.name, "Checksum verification disabled for pinned snapshot");
        return Ok(());
    }
    if !entry.content_hash.is_empty() {
        if !actual.matches(&entry.content_hash) {
            return Err(mismatch(&entry.content_hash, actual.as_str()));
        }
        return Ok(());
    }
    if !entry.secondary_hash.is_empty() {
        let path = tmp.to_path_buf();
        let sha = tokio::task::spawn_blocking(move || Sha256Hash::compute_file(&path))
            .await
            .map_err(std::io::Error::other)??;
        if !sha.matches(&entry.secondary_hash) {
            return Err(mismatch(&entry.secondary_hash, sha.as_str()));
        }
        return Ok(());
    }

    reporter.warning(&format!(
        "{}: no checksum available, skipping verification",
        entry.token(false)
    ));
    Ok(())
}

/// Flush and, for OCI blobs, record how far we got.
async fn suspend(
    file: &mut tokio::fs::File,
    tmp: &Path,
    written: u64,
    hasher: &blake3::Hasher,
    persist_resume: bool,
) -> Result<(), FetchError> {
    file.flush().await?;
    if persist_resume {
        let state = ResumeState {
            offset: written,
            digest: Blake3Hash::from(hasher).to_string(),
        };
        if let Err(e) = state.save(tmp) {
            warn!(path = %tmp.display(), error = %e, "Failed to persist resume state");
        }
    }
    Ok(())
}

async fn existing_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map_or(0, |m| m.len())
}

async fn prefix_hasher(path: &Path, len: u64) -> Result<blake3::Hasher, FetchError> {
    let path: PathBuf = path.to_path_buf();
    Ok(
        tokio::task::spawn_blocking(move || Blake3Hash::prefix_hasher(&path, len))
            .await
            .map_err(std::io::Error::other)??,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::trust::tests::{minisign_pub, minisign_sig, signing_key};

    const KEY_ID: [u8; 8] = [4; 8];

    fn payload() -> Vec<u8> {
        let mut data = b"\x7fELF".to_vec();
        data.extend((0..4096u32).map(|i| (i % 251) as u8));
        data
    }

    fn entry_for(url: String, data: &[u8]) -> Entry {
        Entry {
            name: "tool".into(),
            pkg_id: "tool".into(),
            download_url: url,
            size: data.len() as u64,
            content_hash: Blake3Hash::compute(data).to_string(),
            ..Entry::default()
        }
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(Client::new(), CancellationToken::new()).with_plain_http(true)
    }

    #[tokio::test]
    async fn downloads_and_installs_executable() {
        let data = payload();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tool")
            .match_header("cache-control", "no-cache")
            .with_body(&data)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bin").join("tool");
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        let out = fetcher()
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(std::fs::read(&dest).unwrap(), data);
        assert_eq!(out.size, data.len() as u64);
        assert!(out.hash.matches(&entry.content_hash));
        assert!(!out.signed);
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(!paths::tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_no_destination() {
        let data = payload();
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_body(&data)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let mut entry = entry_for(format!("{}/tool", server.url()), &data);
        entry.content_hash = Blake3Hash::compute(b"something else").to_string();

        let err = fetcher()
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
        assert!(!dest.exists());
        assert!(paths::tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn secondary_hash_is_checked_when_primary_missing() {
        let data = payload();
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_body(&data)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let mut entry = entry_for(format!("{}/tool", server.url()), &data);
        entry.content_hash.clear();
        entry.secondary_hash = "00".repeat(32);

        let err = fetcher()
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn resumed_download_matches_uninterrupted_hash() {
        let data = payload();
        let k = 1000;
        let mut server = mockito::Server::new_async().await;
        let ranged = server
            .mock("GET", "/tool")
            .match_header("range", format!("bytes={k}-").as_str())
            .with_status(206)
            .with_body(&data[k..])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        std::fs::write(paths::tmp_path(&dest), &data[..k]).unwrap();
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        let out = fetcher()
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap();
        ranged.assert_async().await;
        assert_eq!(out.hash, Blake3Hash::compute(&data));
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn ignored_range_restarts_from_scratch() {
        let data = payload();
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_status(200)
            .with_body(&data)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        std::fs::write(paths::tmp_path(&dest), b"garbage").unwrap();
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        fetcher()
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn rejects_non_executable_content() {
        let body = b"<html>not found</html>";
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_body(body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let entry = entry_for(format!("{}/tool", server.url()), body);

        let err = fetcher()
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidFileType(_)));
        assert!(!dest.exists());
        assert!(!paths::tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn verifies_http_signature() {
        let data = payload();
        let sk = signing_key();
        let key = PublicKey::parse(&minisign_pub(&sk, KEY_ID)).unwrap();

        let mut server = mockito::Server::new_async().await;
        let _bin = server
            .mock("GET", "/tool")
            .with_body(&data)
            .create_async()
            .await;
        let _sig = server
            .mock("GET", "/tool.sig")
            .with_body(minisign_sig(&sk, KEY_ID, &data, true))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        let out = fetcher()
            .fetch(&entry, &dest, &[key], &NullReporter)
            .await
            .unwrap();
        assert!(out.signed);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn bad_signature_removes_destination() {
        let data = payload();
        let sk = signing_key();
        let key = PublicKey::parse(&minisign_pub(&sk, KEY_ID)).unwrap();

        let mut server = mockito::Server::new_async().await;
        let _bin = server
            .mock("GET", "/tool")
            .with_body(&data)
            .create_async()
            .await;
        let _sig = server
            .mock("GET", "/tool.sig")
            .with_body(minisign_sig(&sk, KEY_ID, b"different bytes", false))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        let err = fetcher()
            .fetch(&entry, &dest, &[key], &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Trust(TrustError::SignatureInvalid(_))
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn missing_signature_is_skipped() {
        let data = payload();
        let sk = signing_key();
        let key = PublicKey::parse(&minisign_pub(&sk, KEY_ID)).unwrap();

        let mut server = mockito::Server::new_async().await;
        let _bin = server
            .mock("GET", "/tool")
            .with_body(&data)
            .create_async()
            .await;
        let _sig = server
            .mock("GET", "/tool.sig")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        let out = fetcher()
            .fetch(&entry, &dest, &[key], &NullReporter)
            .await
            .unwrap();
        assert!(!out.signed);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn fetches_oci_layer_with_signature() {
        let data = payload();
        let sk = signing_key();
        let key = PublicKey::parse(&minisign_pub(&sk, KEY_ID)).unwrap();
        let sig = minisign_sig(&sk, KEY_ID, &data, false);

        let mut server = mockito::Server::new_async().await;
        let _mocks = super::super::oci::tests::mock_registry(
            &mut server,
            &[("tool", data.as_slice()), ("tool.sig", sig.as_bytes())],
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let entry = entry_for(
            format!("oci://{}/org/tool:v1", server.host_with_port()),
            &data,
        );

        let out = fetcher()
            .fetch(&entry, &dest, &[key], &NullReporter)
            .await
            .unwrap();
        assert!(out.signed);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    fn xattrs_work(dir: &Path) -> bool {
        let probe = dir.join("probe");
        xattr::SUPPORTED_PLATFORM
            && std::fs::write(&probe, b"").is_ok()
            && xattr::set(&probe, "user.grab.probe", b"1").is_ok()
    }

    /// Cancels its token as soon as any bytes have been written.
    struct CancelOnProgress(CancellationToken);

    impl Reporter for CancelOnProgress {
        fn section(&self, _: &str) {}
        fn downloading(&self, _: &Entry, current: u64, _: Option<u64>) {
            if current > 0 {
                self.0.cancel();
            }
        }
        fn verifying(&self, _: &Entry) {}
        fn done(&self, _: &Entry, _: &str) {}
        fn failed(&self, _: &Entry, _: &str) {}
        fn info(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn summary(&self, _: usize, _: &str, _: f64) {}
    }

    fn oci_entry(server: &mockito::ServerGuard, data: &[u8]) -> Entry {
        entry_for(
            format!("oci://{}/org/tool:v1", server.host_with_port()),
            data,
        )
    }

    #[tokio::test]
    async fn interrupted_oci_download_keeps_resume_state() {
        let data = payload();
        let mut server = mockito::Server::new_async().await;
        let _mocks =
            super::super::oci::tests::mock_registry(&mut server, &[("tool", data.as_slice())]).await;

        let dir = tempfile::tempdir().unwrap();
        if !xattrs_work(dir.path()) {
            return;
        }
        let dest = dir.path().join("tool");
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::new(Client::new(), cancel.clone()).with_plain_http(true);

        let err = fetcher
            .fetch(&oci_entry(&server, &data), &dest, &[], &CancelOnProgress(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(!dest.exists());

        let tmp = paths::tmp_path(&dest);
        let partial = std::fs::read(&tmp).unwrap();
        assert!(!partial.is_empty());
        assert_eq!(partial, data[..partial.len()]);
        assert_eq!(
            ResumeState::load(&tmp),
            Some(ResumeState {
                offset: partial.len() as u64,
                digest: Blake3Hash::compute(&partial).to_string(),
            })
        );
    }

    #[tokio::test]
    async fn interrupted_http_download_keeps_temp_file() {
        let data = payload();
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_body(&data)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::new(Client::new(), cancel.clone());
        let entry = entry_for(format!("{}/tool", server.url()), &data);

        let err = fetcher
            .fetch(&entry, &dest, &[], &CancelOnProgress(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(!dest.exists());
        let partial = std::fs::read(paths::tmp_path(&dest)).unwrap();
        assert_eq!(partial, data[..partial.len()]);
    }

    #[tokio::test]
    async fn oci_download_resumes_from_saved_state() {
        let data = payload();
        let k = 1000;
        let mut server = mockito::Server::new_async().await;
        let _mocks = super::super::oci::tests::mock_manifest(&mut server, &["tool"]).await;
        let ranged = server
            .mock("GET", "/v2/org/tool/blobs/sha256:0")
            .match_header("authorization", "Bearer t0k")
            .match_header("range", format!("bytes={k}-").as_str())
            .with_status(206)
            .with_body(&data[k..])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        if !xattrs_work(dir.path()) {
            return;
        }
        let dest = dir.path().join("tool");
        let tmp = paths::tmp_path(&dest);
        std::fs::write(&tmp, &data[..k]).unwrap();
        ResumeState {
            offset: k as u64,
            digest: Blake3Hash::compute(&data[..k]).to_string(),
        }
        .save(&tmp)
        .unwrap();

        let out = fetcher()
            .fetch(&oci_entry(&server, &data), &dest, &[], &NullReporter)
            .await
            .unwrap();
        ranged.assert_async().await;
        assert_eq!(out.hash, Blake3Hash::compute(&data));
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn oci_resume_digest_mismatch_restarts() {
        let data = payload();
        let k = 1000;
        let mut server = mockito::Server::new_async().await;
        let _mocks = super::super::oci::tests::mock_manifest(&mut server, &["tool"]).await;
        let full = server
            .mock("GET", "/v2/org/tool/blobs/sha256:0")
            .match_header("authorization", "Bearer t0k")
            .match_header("range", mockito::Matcher::Missing)
            .with_body(&data)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        if !xattrs_work(dir.path()) {
            return;
        }
        let dest = dir.path().join("tool");
        let tmp = paths::tmp_path(&dest);
        let zeros = vec![0u8; k];
        std::fs::write(&tmp, &zeros).unwrap();

        let matching = ResumeState {
            offset: k as u64,
            digest: Blake3Hash::compute(&zeros).to_string(),
        };
        matching.save(&tmp).unwrap();
        assert_eq!(fetcher().oci_resume_point(&tmp).await.0, k as u64);

        let beyond = ResumeState {
            offset: k as u64 + 1,
            ..matching.clone()
        };
        beyond.save(&tmp).unwrap();
        assert_eq!(fetcher().oci_resume_point(&tmp).await.0, 0);

        ResumeState {
            offset: k as u64,
            digest: Blake3Hash::compute(&data[..k]).to_string(),
        }
        .save(&tmp)
        .unwrap();
        assert_eq!(fetcher().oci_resume_point(&tmp).await.0, 0);

        fetcher()
            .fetch(&oci_entry(&server, &data), &dest, &[], &NullReporter)
            .await
            .unwrap();
        full.assert_async().await;
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn cancelled_fetch_does_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = Fetcher::new(Client::new(), cancel);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");
        let entry = entry_for("http://127.0.0.1:9/tool".into(), b"x");

        let err = fetcher
            .fetch(&entry, &dest, &[], &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(!paths::tmp_path(&dest).exists());
    }
}
