//! Shared types for the revision store: errors, ids, the `format` file, and
//! path derivation.
//!
//! This crate has no I/O beyond parsing strings already read by a caller; it
//! is the leaf dependency of every other crate in the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod format;
pub mod ids;
pub mod paths;

pub use config::FsfsConfig;
pub use error::{Error, Result};
pub use format::{Format, FormatFeatures, Layout, FORMAT_BLACKLIST, FORMAT_MAX, FORMAT_MIN};
pub use ids::{from_base36, to_base36, NextIds, NodeRevisionId, OpaqueId, Origin, TxnId, Uniquifier};
pub use paths::RepoPaths;
