//! Error types for the revision store.
//!
//! This module defines the single `Error` type shared by every layer of the
//! engine. We use `thiserror` for automatic `Display`/`Error` impls, the same
//! way the rest of this codebase does.
//!
//! ## Error Categories
//!
//! - **Not found**: a requested revision, transaction or path doesn't exist.
//! - **Out of date**: a transaction's base has fallen behind `current`.
//! - **Concurrency**: a proto-revision is already being written.
//! - **Format**: the on-disk `format` file is missing, malformed or
//!   unsupported.
//! - **Corruption**: any structural invariant violation. Never swallowed.
//! - **Hotcopy/upgrade preconditions**: UUID or feature mismatches.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the revision store.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Requested revision exceeds `current`, or is negative.
    #[error("no such revision {0}")]
    NoSuchRevision(i64),

    /// Commit's base revision predates `current`.
    #[error("transaction is out of date: base {base} but current is {current}")]
    TxnOutOfDate {
        /// The transaction's base revision.
        base: i64,
        /// The repository's current revision at commit time.
        current: i64,
    },

    /// Concurrent write to the same proto-revision file.
    #[error("representation is already being written for transaction {0}")]
    RepBeingWritten(String),

    /// Legacy transaction-id allocator exhausted its probe space.
    #[error("unable to find a unique transaction name")]
    UniqueNamesExhausted,

    /// Malformed `format` file.
    #[error("bad format file at {path:?}: {reason}")]
    BadVersionFileFormat {
        /// Path of the offending format file.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// Format number outside the supported range, or blacklisted.
    #[error("unsupported repository format {0}")]
    UnsupportedFormat(i32),

    /// Any structural invariant violation: bad skel, bad offsets, id
    /// mismatches, out-of-order changed-paths, truncated proto-rev, root
    /// predecessor-count mismatch. Never recovered from automatically.
    #[error("corrupt repository state: {0}")]
    Corrupt(String),

    /// Referenced transaction directory is missing.
    #[error("no such transaction: {0}")]
    NoSuchTransaction(String),

    /// Public operation expected a file node but found a directory.
    #[error("not a file: {0}")]
    NotFile(String),

    /// Public operation expected a directory node but found a file.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// Path does not exist in the given revision/transaction root.
    #[error("unversioned resource: {0}")]
    UnversionedResource(String),

    /// Optimistic revision-property change lost its race.
    #[error("revprop base value mismatch for revision {0}")]
    PropBaseValueMismatch(i64),

    /// Hotcopy source/destination UUID mismatch.
    #[error("UUID mismatch: source {source_uuid} vs destination {dest_uuid}")]
    UuidMismatch {
        /// Source repository UUID.
        source_uuid: String,
        /// Destination repository UUID.
        dest_uuid: String,
    },

    /// Hotcopy/upgrade precondition involving an unsupported feature
    /// combination (e.g. mismatched shard size).
    #[error("unsupported feature combination: {0}")]
    UnsupportedFeature(String),

    /// Rep-sharing index backend error.
    #[error("rep-cache index error: {0}")]
    RepCache(String),

    /// Catch-all for structural errors with a human message that don't fit
    /// a more specific variant.
    #[error("filesystem error: {0}")]
    FsGeneral(String),
}

impl Error {
    /// True for errors a caller might reasonably retry (losing a commit
    /// race, or an optimistic revprop race).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TxnOutOfDate { .. } | Error::PropBaseValueMismatch(_)
        )
    }

    /// True for [`Error::Corrupt`] — callers must never paper over this.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }
}
