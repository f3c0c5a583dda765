//! Executable type validation.
//!
//! Only ELF binaries and `#!` scripts are installable. Scripts whose
//! interpreter lives under `/nix/store/<hash>/` are build artifacts leaked
//! from another packaging system and would not run elsewhere.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use grab_schema::ELF_MAGIC;
use regex::Regex;

/// Bytes inspected when looking for the shebang line.
const HEADER_LEN: usize = 1024;

static NIX_SHEBANG: OnceLock<Option<Regex>> = OnceLock::new();

fn nix_shebang() -> Option<&'static Regex> {
    NIX_SHEBANG
        .get_or_init(|| Regex::new(r"^#!\s*/nix/store/[^/]+/").ok())
        .as_ref()
}

/// Why a file was refused.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FileTypeError {
    /// Neither ELF nor a shebang script.
    #[error("not an ELF binary or script")]
    Unrecognized,

    /// A script whose interpreter points into the nix store.
    #[error("script interpreter points into /nix/store: {0}")]
    NixStore(String),

    /// The file could not be read.
    #[error("cannot inspect file: {0}")]
    Unreadable(String),
}

/// Validate the leading bytes of a candidate executable.
///
/// # Errors
///
/// See [`FileTypeError`].
pub fn validate_header(header: &[u8]) -> Result<(), FileTypeError> {
    if header.starts_with(&ELF_MAGIC) {
        return Ok(());
    }
    if !header.starts_with(b"#!") {
        return Err(FileTypeError::Unrecognized);
    }

    let line_end = header
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(header.len());
    let line = String::from_utf8_lossy(&header[..line_end]);
    if nix_shebang().is_some_and(|re| re.is_match(&line)) {
        return Err(FileTypeError::NixStore(line.trim_end().to_string()));
    }
    Ok(())
}

/// Validate the file at `path`.
///
/// # Errors
///
/// See [`FileTypeError`].
pub fn validate(path: &Path) -> Result<(), FileTypeError> {
    let file = std::fs::File::open(path).map_err(|e| FileTypeError::Unreadable(e.to_string()))?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| FileTypeError::Unreadable(e.to_string()))?;
    validate_header(&header)
}
