//! grab - fetch, verify and run single-file binaries.
//!
//! # Architecture
//!
//! - **Ops**: [`ops`] holds the install, update, remove and run pipelines.
//!   Each takes a shared [`ops::Context`] and reports per-item outcomes
//!   instead of aborting the batch.
//! - **Actor Pattern**: terminal output is serialized through
//!   [`ui::actor`] so concurrent downloads never interleave lines.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.grab/          # or $GRAB_HOME
//! ├── bin/          # Installed binaries
//! ├── cache/        # `grab run` cache
//! ├── keys/         # Repository public keys
//! ├── tracker.json  # Installed binaries and their source
//! └── config.toml
//! ```

pub mod ops;
pub mod ui;
