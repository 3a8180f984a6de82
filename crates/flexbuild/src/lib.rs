//! # flexbuild
//!
//! Builds FlexBoot ROM images for every supported adapter.
//!
//! ## Layout
//!
//! - `version` / `header` - version parsing and the `driver_version:` record
//! - `patch` - marker-region replacement and version stamping in templates
//! - `guard` - template backup/restore around a run (also on Ctrl+C)
//! - `pipeline` - per-device clean, patch, make, collect
//! - `merge` - vendor CLP merging of the produced images
//! - `config`, `device`, `request`, `tool`, `error` - the plumbing

pub mod config;
pub mod device;
pub mod error;
pub mod guard;
pub mod header;
pub mod merge;
pub mod patch;
pub mod pipeline;
pub mod request;
pub mod tool;
pub mod version;

pub use config::{BuildConfig, UnexpectedErrorPolicy};
pub use error::BuildError;
pub use pipeline::{run, MergeOptions, RunSummary};
pub use request::{BuildOptions, BuildRequest};
