//! The transaction layer: a single open, still-mutable revision-in-waiting
//! (spec.md §4.8).
//!
//! A [`Transaction`] is a thin facade over its on-disk scratch directory
//! ([`scratch::TxnScratch`]) and the handful of append-only files inside
//! it: node-revisions ([`nodes`]), directory deltas ([`dirs`]), streamed
//! file content ([`content`]), the changes log ([`changes`]), and
//! transaction properties ([`props`]). It holds no cached filesystem
//! state of its own — every call reads or writes straight through to
//! disk, so a transaction can be resumed from its scratch directory after
//! a crash with no in-memory state to reconstruct.
//!
//! [`alloc::next_txn_id`] mints the transaction-id a [`Transaction`] is
//! then built from (spec.md §4.3).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alloc;
pub mod changes;
pub mod content;
pub mod dirs;
pub mod node_props;
pub mod nodes;
pub mod props;
pub mod scratch;

pub use alloc::next_txn_id;
pub use changes::{ChangeRecord, FoldedChange, FoldedKind, RawChange};
pub use scratch::TxnScratch;

use std::sync::atomic::{AtomicU64, Ordering};

use svnfs_core::ids::{NextIds, NodeRevisionId, OpaqueId, TxnId, Uniquifier};
use svnfs_core::{RepoPaths, Result};
use svnfs_lock::{ProtoRevLockGuard, RepoLocks};
use svnfs_storage::dirent::{DirChange, Directory};
use svnfs_storage::noderev::NodeRevision;
use svnfs_storage::proplist::PropList;
use svnfs_storage::rep::RepPointer;
use svnfs_storage::repstore::BaseLoc;

/// A single open transaction: the base revision it forked from, its
/// scratch directory, and the handful of id/lock plumbing every mutation
/// needs.
pub struct Transaction<'a> {
    id: TxnId,
    base_rev: i64,
    scratch: TxnScratch,
    locks: &'a RepoLocks,
    next_content_suffix: AtomicU64,
}

impl<'a> Transaction<'a> {
    /// Start a brand-new transaction against `base_rev`.
    pub fn begin(
        paths: &RepoPaths,
        locks: &'a RepoLocks,
        id: TxnId,
        base_rev: i64,
        dedicated_protorevs_dir: bool,
    ) -> Result<Self> {
        let scratch = TxnScratch::create(paths, &id, dedicated_protorevs_dir)?;
        Ok(Transaction {
            id,
            base_rev,
            scratch,
            locks,
            next_content_suffix: AtomicU64::new(0),
        })
    }

    /// Resume an existing transaction from its scratch directory.
    pub fn open(
        paths: &RepoPaths,
        locks: &'a RepoLocks,
        id: TxnId,
        base_rev: i64,
        dedicated_protorevs_dir: bool,
    ) -> Result<Self> {
        let scratch = TxnScratch::open_existing(paths, &id, dedicated_protorevs_dir)?;
        Ok(Transaction {
            id,
            base_rev,
            scratch,
            locks,
            next_content_suffix: AtomicU64::new(0),
        })
    }

    /// This transaction's id.
    pub fn id(&self) -> &TxnId {
        &self.id
    }

    /// The revision this transaction was opened against.
    pub fn base_rev(&self) -> i64 {
        self.base_rev
    }

    /// The transaction's on-disk scratch directory.
    pub fn scratch(&self) -> &TxnScratch {
        &self.scratch
    }

    /// Acquire this transaction's proto-revision lock for the duration of
    /// a content-writing critical section (spec.md §4.2).
    fn lock_proto_rev(&self) -> std::result::Result<ProtoRevLockGuard<'a>, svnfs_lock::LockError> {
        self.locks.lock_proto_rev(&self.id.to_string())
    }

    /// Allocate a fresh node-id.
    pub fn alloc_node_id(&self) -> Result<OpaqueId> {
        let mut ids = self.scratch.load_next_ids()?;
        let id = ids.next_node_id();
        self.scratch.save_next_ids(ids)?;
        Ok(id)
    }

    /// Allocate a fresh copy-id.
    pub fn alloc_copy_id(&self) -> Result<OpaqueId> {
        let mut ids = self.scratch.load_next_ids()?;
        let id = ids.next_copy_id();
        self.scratch.save_next_ids(ids)?;
        Ok(id)
    }

    /// Current id sequence counters, without allocating.
    pub fn next_ids(&self) -> Result<NextIds> {
        self.scratch.load_next_ids()
    }

    /// Write (or overwrite) a mutable node-revision.
    pub fn put_node_revision(&self, node_rev: &NodeRevision, emit_merge_info: bool) -> Result<()> {
        nodes::put(&self.scratch, node_rev, emit_merge_info)
    }

    /// Read a mutable node-revision back by id.
    pub fn get_node_revision(&self, id: &NodeRevisionId) -> Result<NodeRevision> {
        nodes::get(&self.scratch, id)
    }

    /// Discard a mutable node-revision's scratch record.
    pub fn delete_node_revision(&self, id: &NodeRevisionId) -> Result<()> {
        nodes::delete(&self.scratch, id)
    }

    /// Append a directory entry change to a mutable directory's delta
    /// file (spec.md §4.8's directory-edit path).
    pub fn set_dir_entry(
        &self,
        node_id: &OpaqueId,
        copy_id: &OpaqueId,
        name: &str,
        entry: svnfs_storage::dirent::DirEntry,
    ) -> Result<()> {
        dirs::append_change(
            &self.scratch,
            node_id,
            copy_id,
            &DirChange::Set {
                name: name.to_string(),
                entry,
            },
        )
    }

    /// Append a directory entry removal to a mutable directory's delta
    /// file.
    pub fn delete_dir_entry(&self, node_id: &OpaqueId, copy_id: &OpaqueId, name: &str) -> Result<()> {
        dirs::append_change(
            &self.scratch,
            node_id,
            copy_id,
            &DirChange::Delete {
                name: name.to_string(),
            },
        )
    }

    /// Replay a mutable directory's accumulated changes over `base`.
    pub fn materialize_dir(
        &self,
        node_id: &OpaqueId,
        copy_id: &OpaqueId,
        base: &Directory,
    ) -> Result<Directory> {
        dirs::materialize(&self.scratch, node_id, copy_id, base)
    }

    /// Mint a fresh per-representation uniquifier suffix, unique within
    /// this transaction (spec.md §4.3, "Representation uniquifier").
    pub fn alloc_content_suffix(&self) -> u64 {
        self.next_content_suffix.fetch_add(1, Ordering::SeqCst)
    }

    /// Stream a fresh `PLAIN` representation of `content` into the
    /// proto-revision file, under the proto-revision lock.
    pub fn write_plain_contents(&self, content: &[u8], suffix: u64) -> Result<RepPointer> {
        let _guard = self
            .lock_proto_rev()
            .map_err(|e| svnfs_core::Error::RepBeingWritten(e.to_string()))?;
        content::append_plain(
            &self.scratch,
            content,
            Uniquifier {
                txn_id: self.id.clone(),
                suffix,
            },
        )
    }

    /// Stream a fresh `DELTA` representation of `content` against an
    /// already-committed base, under the proto-revision lock.
    pub fn write_delta_contents(
        &self,
        base_content: &[u8],
        base: Option<BaseLoc>,
        content: &[u8],
        suffix: u64,
    ) -> Result<RepPointer> {
        let _guard = self
            .lock_proto_rev()
            .map_err(|e| svnfs_core::Error::RepBeingWritten(e.to_string()))?;
        content::append_delta(
            &self.scratch,
            base_content,
            base,
            content,
            Uniquifier {
                txn_id: self.id.clone(),
                suffix,
            },
        )
    }

    /// Record a raw change against `path` (spec.md §4.8's `add_change`).
    pub fn add_change(&self, record: &ChangeRecord) -> Result<()> {
        changes::append_change(&self.scratch.changes_path(), record)
    }

    /// Read back every raw change recorded so far, in order.
    pub fn raw_changes(&self) -> Result<Vec<ChangeRecord>> {
        changes::read_changes(&self.scratch.changes_path())
    }

    /// Fold every raw change recorded so far into the final per-path
    /// change set (spec.md §4.8, §8.6).
    pub fn folded_changes(&self) -> Result<std::collections::BTreeMap<String, FoldedChange>> {
        changes::fold(&self.raw_changes()?)
    }

    /// Read this transaction's property list (author, log message, and
    /// any `svn:txn-*` bookkeeping flags).
    pub fn proplist(&self) -> Result<PropList> {
        props::read(&self.scratch)
    }

    /// Overwrite this transaction's property list in full.
    pub fn set_proplist(&self, props: &PropList) -> Result<()> {
        props::write(&self.scratch, props)
    }

    /// Set or clear a single transaction property.
    pub fn set_prop(&self, name: &str, value: Option<Vec<u8>>) -> Result<()> {
        props::set(&self.scratch, name, value)
    }

    /// A mutable node's property list, if it has been touched in this
    /// transaction; `None` means the node-revision still inherits its
    /// predecessor's `prop_rep` unchanged.
    pub fn node_props(&self, node_id: &OpaqueId, copy_id: &OpaqueId) -> Result<Option<PropList>> {
        node_props::read(&self.scratch, node_id, copy_id)
    }

    /// Overwrite a mutable node's property list in full.
    pub fn set_node_props(
        &self,
        node_id: &OpaqueId,
        copy_id: &OpaqueId,
        props: &PropList,
    ) -> Result<()> {
        node_props::write(&self.scratch, node_id, copy_id, props)
    }

    /// Abandon this transaction: permanently destroy its scratch state.
    pub fn abort(self) -> Result<()> {
        self.scratch.purge()
    }
}
