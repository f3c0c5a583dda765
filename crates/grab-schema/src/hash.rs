//! Content hashes.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// BLAKE3 content hash (64 hex characters), the primary integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blake3Hash(String);

impl Blake3Hash {
    /// Create a new `Blake3Hash` from a raw hex string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Compute BLAKE3 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Compute BLAKE3 hash of a file by streaming it through the hasher.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn compute_file(path: &Path) -> std::io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut file = std::fs::File::open(path)?;
        std::io::copy(&mut file, &mut hasher)?;
        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    /// Hash the first `len` bytes of a file into a fresh hasher, returning it
    /// so a resumed download can keep feeding it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is shorter than `len` or unreadable.
    pub fn prefix_hasher(path: &Path, len: u64) -> std::io::Result<blake3::Hasher> {
        let mut hasher = blake3::Hasher::new();
        let file = std::fs::File::open(path)?;
        let copied = std::io::copy(&mut file.take(len), &mut hasher)?;
        if copied != len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, found {copied}"),
            ));
        }
        Ok(hasher)
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a hex digest published by an index. Hex case is not
    /// significant; every digest byte must match.
    pub fn matches(&self, expected: &str) -> bool {
        self.0.eq_ignore_ascii_case(expected.trim())
    }
}

impl std::fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Blake3Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&blake3::Hasher> for Blake3Hash {
    fn from(hasher: &blake3::Hasher) -> Self {
        Self(hasher.finalize().to_hex().to_string())
    }
}

/// Newtype for a SHA256 hash string (64 hex characters).
///
/// Used for the advisory secondary hash published alongside BLAKE3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Create a new `Sha256Hash` without validation (for index/deserialized data).
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Compute the SHA-256 of a file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn compute_file(path: &Path) -> std::io::Result<Self> {
        let mut hasher = sha2::Sha256::new();
        let mut file = std::fs::File::open(path)?;
        let mut buffer = [0u8; 8192];
        loop {
            let count = file.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            hasher.update(&buffer[..count]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Return the inner hex string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a published digest.
    pub fn matches(&self, expected: &str) -> bool {
        let expected = expected.trim();
        let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
        self.0.eq_ignore_ascii_case(expected)
    }
}

impl std::fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
