//! The narrow backend interface spec.md §9 calls for: "a single narrow
//! interface of about a dozen operations... a tagged variant with exactly
//! the implemented backend is sufficient."
//!
//! This rewrite only ever has one backend ([`Fs`]), so the trait below is
//! not object-safe on purpose — there is nothing to dispatch between at
//! runtime — but keeping it as a trait rather than folding its methods
//! straight into [`Fs`]'s inherent impl documents the seam the original's
//! vtable sat at, and gives a future second backend (e.g. a packed-only
//! read path) something concrete to implement against.

use std::collections::BTreeMap;
use std::path::Path;

use svnfs_admin::{CancelFn, Milestone};
use svnfs_core::format::Layout;
use svnfs_core::Result;
use svnfs_storage::dirent::Directory;
use svnfs_storage::noderev::NodeRevision;
use svnfs_transaction::{FoldedChange, Transaction};

use crate::Fs;

/// The dozen-odd operations every caller of this engine needs, independent
/// of how any particular backend stores its bytes (spec.md §9).
pub trait Backend: Sized {
    /// Create a brand-new, empty repository.
    fn create(root: impl AsRef<Path>, format_number: i32, layout: Layout) -> Result<Self>;
    /// Open an already-existing repository.
    fn open(root: impl AsRef<Path>) -> Result<Self>;
    /// The youngest committed revision.
    fn youngest_revision(&self) -> Result<i64>;
    /// Validate a revision number against `youngest_revision`.
    fn revision_root(&self, rev: i64) -> Result<i64>;
    /// Begin a fresh transaction rooted at `base_rev`.
    fn begin_transaction(&self, base_rev: i64) -> Result<Transaction<'_>>;
    /// Abandon a transaction, destroying its scratch state.
    fn abort_transaction(&self, txn: Transaction<'_>) -> Result<()>;
    /// Commit a transaction into a new, immutable revision.
    fn commit(&self, txn: &Transaction<'_>) -> Result<i64>;
    /// Read the node-revision a path names in a revision.
    fn node_revision(&self, rev: i64, path: &str) -> Result<NodeRevision>;
    /// Read a file's full contents.
    fn file_contents(&self, rev: i64, path: &str) -> Result<Vec<u8>>;
    /// List a directory's entries.
    fn directory_entries(&self, rev: i64, path: &str) -> Result<Directory>;
    /// The folded per-path change set for a committed revision.
    fn changed_paths(&self, rev: i64) -> Result<BTreeMap<String, FoldedChange>>;
    /// Copy this repository's committed state into another, live.
    fn hotcopy(&self, dst_root: impl AsRef<Path>, dst_is_fresh: bool, cancel: &CancelFn<'_>) -> Result<i64>;
    /// Migrate this repository's on-disk format in place.
    fn upgrade(&mut self, target_format: i32, on_milestone: Option<&mut dyn FnMut(Milestone)>) -> Result<()>;
}

impl Backend for Fs {
    fn create(root: impl AsRef<Path>, format_number: i32, layout: Layout) -> Result<Self> {
        Fs::create(root, format_number, layout)
    }

    fn open(root: impl AsRef<Path>) -> Result<Self> {
        Fs::open(root)
    }

    fn youngest_revision(&self) -> Result<i64> {
        Fs::youngest_revision(self)
    }

    fn revision_root(&self, rev: i64) -> Result<i64> {
        Fs::revision_root(self, rev)
    }

    fn begin_transaction(&self, base_rev: i64) -> Result<Transaction<'_>> {
        Fs::begin_transaction(self, base_rev)
    }

    fn abort_transaction(&self, txn: Transaction<'_>) -> Result<()> {
        Fs::abort_transaction(self, txn)
    }

    fn commit(&self, txn: &Transaction<'_>) -> Result<i64> {
        Fs::commit(self, txn)
    }

    fn node_revision(&self, rev: i64, path: &str) -> Result<NodeRevision> {
        Fs::node_revision(self, rev, path)
    }

    fn file_contents(&self, rev: i64, path: &str) -> Result<Vec<u8>> {
        Fs::file_contents(self, rev, path)
    }

    fn directory_entries(&self, rev: i64, path: &str) -> Result<Directory> {
        Fs::directory_entries(self, rev, path)
    }

    fn changed_paths(&self, rev: i64) -> Result<BTreeMap<String, FoldedChange>> {
        Fs::changed_paths(self, rev)
    }

    fn hotcopy(&self, dst_root: impl AsRef<Path>, dst_is_fresh: bool, cancel: &CancelFn<'_>) -> Result<i64> {
        Fs::hotcopy(self, dst_root, dst_is_fresh, cancel)
    }

    fn upgrade(&mut self, target_format: i32, on_milestone: Option<&mut dyn FnMut(Milestone)>) -> Result<()> {
        Fs::upgrade(self, target_format, on_milestone)
    }
}
