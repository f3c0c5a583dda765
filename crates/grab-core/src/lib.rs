//! Core of grab: resolve, fetch, verify and place single-file binaries.
//!
//! The pipeline runs leaf-first through [`resolver`] (which entry?),
//! [`io::download`] (bytes on disk, hashed, optionally via [`io::oci`]) and
//! [`trust`] (is the publisher who we expect?). [`provenance`] and
//! [`tracker`] remember what was installed so later runs can recognise it.

pub mod config;
pub mod io;
pub mod paths;
pub mod provenance;
pub mod repo;
pub mod reporter;
pub mod resolver;
pub mod tracker;
pub mod trust;

pub use config::Config;
pub use provenance::{ProvenanceStore, XattrProvenance};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{Index, ResolveError};
pub use tracker::{InstalledRecord, Tracker};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("grab/", env!("CARGO_PKG_VERSION"));
