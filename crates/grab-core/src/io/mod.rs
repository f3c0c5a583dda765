//! IO modules - side effects (network, filesystem)

pub mod download;
pub mod filetype;
pub mod oci;

pub use download::{FetchError, FetchOutcome, Fetcher};
