//! Shared types and wire formats for grab.
//!
//! Everything here is pure data: the [`Entry`] record and its token grammar,
//! repository descriptors, index document decoding and content hashes.

pub mod entry;
pub mod hash;
pub mod index;
pub mod repository;

// Re-exports
pub use entry::{Entry, EntryError, NO_CHECK, OCI_PREFIX, Snapshot};
pub use hash::{Blake3Hash, Sha256Hash};
pub use index::{IndexDocument, IndexError, IndexFormat};
pub use repository::Repository;

/// Magic bytes for ZSTD compression (Little Endian: 0xFD2FB528 -> 28 B5 2F FD)
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Magic bytes for gzip compression.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Magic bytes opening every ELF executable.
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
