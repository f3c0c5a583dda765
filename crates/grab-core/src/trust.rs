//! Integrity and trust verification.
//!
//! Detached signatures use the minisign layout over Ed25519:
//!
//! ```text
//! public key : base64("Ed" || key_id[8] || key[32])       (or bare base64 key[32])
//! signature  : base64(alg[2] || key_id[8] || sig[64])     (or bare base64 sig[64])
//! ```
//!
//! `alg` is `Ed` when the signature covers the raw bytes and `ED` when it
//! covers their BLAKE2b-512 digest. Comment lines are ignored.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use grab_schema::Repository;
use tracing::{debug, warn};

/// How long a cached repository key is trusted before it is re-fetched.
pub const KEY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Errors produced while checking a signature.
#[derive(thiserror::Error, Debug)]
pub enum TrustError {
    /// The public key text is malformed.
    #[error("Invalid public key: {0}")]
    KeyParse(String),

    /// The signature text is malformed.
    #[error("Invalid signature: {0}")]
    SignatureParse(String),

    /// The signature does not verify under any configured key.
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// The public key could not be fetched and no cached copy exists.
    #[error("Failed to fetch public key from {url}: {message}")]
    KeyFetch {
        /// Key location.
        url: String,
        /// What went wrong.
        message: String,
    },
}

const COMMENT_PREFIXES: [&str; 2] = ["untrusted comment:", "trusted comment:"];

/// An Ed25519 verifying key, optionally carrying a minisign key id.
#[derive(Debug, Clone)]
pub struct PublicKey {
    key_id: Option<[u8; 8]>,
    key: VerifyingKey,
}

impl PublicKey {
    /// Parse the text of a public key file.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::KeyParse`] on any malformed input.
    pub fn parse(text: &str) -> Result<Self, TrustError> {
        let line = payload_lines(text)
            .next()
            .ok_or_else(|| TrustError::KeyParse("empty key".into()))?;
        let bytes = STANDARD
            .decode(line)
            .map_err(|e| TrustError::KeyParse(format!("bad base64: {e}")))?;

        let (key_id, raw) = match bytes.len() {
            42 if &bytes[..2] == b"Ed" => (Some(array8(&bytes[2..10])), &bytes[10..]),
            32 => (None, &bytes[..]),
            n => return Err(TrustError::KeyParse(format!("unexpected key length {n}"))),
        };
        let raw: [u8; 32] = raw
            .try_into()
            .map_err(|_| TrustError::KeyParse("invalid key length".into()))?;
        let key = VerifyingKey::from_bytes(&raw)
            .map_err(|e| TrustError::KeyParse(format!("not an Ed25519 point: {e}")))?;
        Ok(Self { key_id, key })
    }
}

/// Whether a signature covers the raw bytes or their BLAKE2b-512 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureAlgorithm {
    /// `Ed`: signature over the bytes themselves.
    Pure,
    /// `ED`: signature over BLAKE2b-512 of the bytes.
    Prehashed,
}

/// A parsed detached signature.
#[derive(Debug, Clone)]
pub struct DetachedSignature {
    algorithm: SignatureAlgorithm,
    key_id: Option<[u8; 8]>,
    signature: Signature,
}

impl DetachedSignature {
    /// Parse the text of a signature file.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::SignatureParse`] on any malformed input.
    pub fn parse(text: &str) -> Result<Self, TrustError> {
        let line = payload_lines(text)
            .next()
            .ok_or_else(|| TrustError::SignatureParse("empty signature".into()))?;
        let bytes = STANDARD
            .decode(line)
            .map_err(|e| TrustError::SignatureParse(format!("bad base64: {e}")))?;

        let (algorithm, key_id, raw) = match (bytes.len(), bytes.get(..2)) {
            (74, Some(b"Ed")) => (SignatureAlgorithm::Pure, Some(array8(&bytes[2..10])), &bytes[10..]),
            (74, Some(b"ED")) => (
                SignatureAlgorithm::Prehashed,
                Some(array8(&bytes[2..10])),
                &bytes[10..],
            ),
            (64, _) => (SignatureAlgorithm::Pure, None, &bytes[..]),
            (n, _) => {
                return Err(TrustError::SignatureParse(format!(
                    "unexpected signature length {n}"
                )));
            }
        };
        let raw: [u8; 64] = raw
            .try_into()
            .map_err(|_| TrustError::SignatureParse("invalid signature length".into()))?;
        Ok(Self {
            algorithm,
            key_id,
            signature: Signature::from_bytes(&raw),
        })
    }
}

/// Verify `data` against `signature` under `key`.
///
/// # Errors
///
/// Returns [`TrustError::SignatureInvalid`] on key id mismatch or a bad
/// signature.
pub fn verify(data: &[u8], signature: &DetachedSignature, key: &PublicKey) -> Result<(), TrustError> {
    if let (Some(sig_id), Some(key_id)) = (signature.key_id, key.key_id) {
        if sig_id != key_id {
            return Err(TrustError::SignatureInvalid(format!(
                "signed by key {}, expected {}",
                hex::encode(sig_id),
                hex::encode(key_id)
            )));
        }
    }

    let result = match signature.algorithm {
        SignatureAlgorithm::Pure => key.key.verify(data, &signature.signature),
        SignatureAlgorithm::Prehashed => {
            use blake2::{Blake2b512, Digest};
            let digest = Blake2b512::digest(data);
            key.key.verify(&digest, &signature.signature)
        }
    };
    result.map_err(|e| TrustError::SignatureInvalid(e.to_string()))
}

/// Verify against every key, succeeding if any one accepts.
///
/// # Errors
///
/// Returns the last failure when no key accepts, or
/// [`TrustError::SignatureInvalid`] when `keys` is empty.
pub fn verify_any(
    data: &[u8],
    signature: &DetachedSignature,
    keys: &[PublicKey],
) -> Result<(), TrustError> {
    let mut last = TrustError::SignatureInvalid("no public keys available".into());
    for key in keys {
        match verify(data, signature, key) {
            Ok(()) => return Ok(()),
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// Verify the file at `path` against signature text under `keys`.
///
/// # Errors
///
/// Propagates parse and verification failures; I/O errors reading `path`
/// are reported as [`TrustError::SignatureInvalid`].
pub async fn verify_file(
    path: &Path,
    signature_text: &str,
    keys: &[PublicKey],
) -> Result<(), TrustError> {
    let signature = DetachedSignature::parse(signature_text)?;
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| TrustError::SignatureInvalid(format!("cannot read {}: {e}", path.display())))?;
    verify_any(&data, &signature, keys)
}

fn payload_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !COMMENT_PREFIXES.iter().any(|p| l.starts_with(p)))
}

fn array8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

/// On-disk cache of repository public keys.
#[derive(Debug, Clone)]
pub struct KeyCache {
    dir: PathBuf,
}

impl KeyCache {
    /// Cache keys under `dir` with the default [`KEY_TTL`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Keys declared by `repo`, fetched or served from cache.
    ///
    /// A stale cached key is still used, with a warning, when refreshing it
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::KeyFetch`] when a key is neither fetchable nor
    /// cached, and [`TrustError::KeyParse`] when a key is malformed.
    pub async fn keys_for(
        &self,
        client: &reqwest::Client,
        repo: &Repository,
    ) -> Result<Vec<PublicKey>, TrustError> {
        let mut keys = Vec::with_capacity(repo.pubkeys.len());
        for (label, url) in &repo.pubkeys {
            let path = self.dir.join(format!("{}.{label}.pub", repo.name));
            let text = self.load(client, url, &path).await?;
            keys.push(PublicKey::parse(&text)?);
        }
        Ok(keys)
    }

    async fn load(
        &self,
        client: &reqwest::Client,
        url: &str,
        path: &Path,
    ) -> Result<String, TrustError> {
        if self.is_fresh(path).await {
            if let Ok(text) = tokio::fs::read_to_string(path).await {
                debug!(path = %path.display(), "Using cached public key");
                return Ok(text);
            }
        }

        match fetch_text(client, url).await {
            Ok(text) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
                if let Err(e) = tokio::fs::write(path, &text).await {
                    warn!(path = %path.display(), error = %e, "Failed to cache public key");
                }
                Ok(text)
            }
            Err(message) => match tokio::fs::read_to_string(path).await {
                Ok(stale) => {
                    warn!(%url, %message, "Using stale cached public key");
                    Ok(stale)
                }
                Err(_) => Err(TrustError::KeyFetch {
                    url: url.to_string(),
                    message,
                }),
            },
        }
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age < KEY_TTL)
    }
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| e.to_string())?;
    resp.text().await.map_err(|e| e.to_string())
}
