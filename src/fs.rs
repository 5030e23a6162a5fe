//! The repository handle: the one object a caller opens or creates, and
//! the public "dozen operations" surface everything else in this crate
//! sits behind (spec.md §9, "Backend interface").
//!
//! [`Fs`] owns the paths, the locks, the parsed `format`/`fsfs.conf`, and
//! (if rep-sharing is enabled) the shared rep-cache index. Every method
//! either reads already-committed bytes straight through [`crate::tree`],
//! or drives a [`Transaction`] through [`crate::editor`] and
//! [`svnfs_commit::commit`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use uuid::Uuid;

use svnfs_admin::{hotcopy as run_hotcopy, upgrade as run_upgrade, CancelFn, Milestone};
use svnfs_commit::{changed_paths, commit as run_commit, current, root_id, trailer, CommitEnv};
use svnfs_core::format::{Format, FormatFeatures, Layout};
use svnfs_core::ids::TxnId;
use svnfs_core::{Error, FsfsConfig, RepoPaths, Result};
use svnfs_lock::RepoLocks;
use svnfs_repcache::RepCache;
use svnfs_storage::deltify::DeltifyConfig;
use svnfs_storage::dirent::Directory;
use svnfs_storage::noderev::{Kind, NodeRevision, RevPath};
use svnfs_transaction::{next_txn_id, FoldedChange, Transaction};

use crate::tree;

fn open_rep_cache(
    paths: &RepoPaths,
    features: FormatFeatures,
    config: &FsfsConfig,
) -> Result<Option<Mutex<RepCache>>> {
    if !features.rep_sharing || !config.enable_rep_sharing {
        return Ok(None);
    }
    let cache = RepCache::open(&paths.rep_cache_db()).map_err(|e| Error::RepCache(e.to_string()))?;
    Ok(Some(Mutex::new(cache)))
}

fn read_format(paths: &RepoPaths) -> Result<Format> {
    match fs::read_to_string(paths.format_file()) {
        Ok(s) => Format::parse(&paths.format_file(), &s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Format::legacy()),
        Err(e) => Err(e.into()),
    }
}

fn read_config(paths: &RepoPaths) -> Result<FsfsConfig> {
    match fs::read_to_string(paths.config_file()) {
        Ok(s) => Ok(FsfsConfig::parse(&s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FsfsConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// A handle to a single repository rooted at some directory on disk.
pub struct Fs {
    paths: RepoPaths,
    locks: RepoLocks,
    format: Format,
    config: FsfsConfig,
    rep_cache: Option<Mutex<RepCache>>,
}

impl Fs {
    fn open_locks(paths: &RepoPaths) -> Result<RepoLocks> {
        RepoLocks::open(
            paths.write_lock_file(),
            paths.txn_current_lock_file(),
            paths.txn_protorevs_dir(),
        )
        .map_err(|e| Error::FsGeneral(e.to_string()))
    }

    fn commit_env(&self) -> CommitEnv<'_> {
        CommitEnv {
            paths: &self.paths,
            locks: &self.locks,
            format: self.format,
            rep_cache: self.rep_cache.as_ref(),
            deltify: DeltifyConfig {
                max_linear_deltification: self.config.max_linear_deltification,
                max_deltification_walk: self.config.max_deltification_walk,
            },
            enable_dir_deltification: self.config.enable_dir_deltification,
            enable_props_deltification: self.config.enable_props_deltification,
            emit_merge_info: false,
        }
    }

    /// Create a brand-new, empty repository at `root`, formatted as
    /// `format_number` with the given on-disk layout, and commit its
    /// empty revision 0 (spec.md §4.1: "revision 0 is an empty directory
    /// with no properties, always present").
    pub fn create(root: impl AsRef<Path>, format_number: i32, layout: Layout) -> Result<Self> {
        Format::check_supported(format_number)?;
        let paths = RepoPaths::from_root(root.as_ref());
        fs::create_dir_all(paths.root())?;

        let format = Format {
            number: format_number,
            layout,
        };
        let features = format.features();
        let config = FsfsConfig::default();

        fs::write(paths.format_file(), format.render())?;
        fs::write(paths.uuid_file(), format!("{}\n", Uuid::new_v4()))?;
        fs::write(paths.config_file(), config.render())?;
        fs::create_dir_all(paths.revs_dir())?;
        fs::create_dir_all(paths.revprops_dir())?;
        fs::create_dir_all(paths.transactions_dir())?;
        if features.dedicated_protorevs_dir {
            fs::create_dir_all(paths.txn_protorevs_dir())?;
        }

        let locks = Self::open_locks(&paths)?;
        let rep_cache = open_rep_cache(&paths, features, &config)?;

        // Build the handle itself first so the transaction below borrows
        // its `paths`/`locks` fields rather than locals that would need to
        // move afterward.
        let fs_handle = Fs {
            paths,
            locks,
            format,
            config,
            rep_cache,
        };

        let txn_id = next_txn_id(&fs_handle.paths, &fs_handle.locks, 0, features.has_txn_current_file)?;
        let txn = Transaction::begin(
            &fs_handle.paths,
            &fs_handle.locks,
            txn_id.clone(),
            0,
            features.dedicated_protorevs_dir,
        )?;
        let root_noderev = NodeRevision {
            id: root_id(&txn_id),
            kind: Kind::Dir,
            predecessor_count: 1,
            predecessor: None,
            copyroot: RevPath {
                revision: 0,
                path: "/".into(),
            },
            copyfrom: None,
            created_path: "/".into(),
            data_rep: None,
            prop_rep: None,
            merge_info: None,
            fresh_txn_root: true,
        };
        txn.put_node_revision(&root_noderev, false)?;
        run_commit(&fs_handle.commit_env(), &txn)?;
        Ok(fs_handle)
    }

    /// Open an already-existing repository rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let paths = RepoPaths::from_root(root.as_ref());
        let format = read_format(&paths)?;
        let config = read_config(&paths)?;
        let locks = Self::open_locks(&paths)?;
        let rep_cache = open_rep_cache(&paths, format.features(), &config)?;
        Ok(Fs {
            paths,
            locks,
            format,
            config,
            rep_cache,
        })
    }

    /// Path accessors for this repository's root.
    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// This repository's parsed `format` file.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The youngest committed revision (0 for a brand-new repository).
    pub fn youngest_revision(&self) -> Result<i64> {
        current::read(&self.paths)
    }

    /// Validate `rev` against the youngest committed revision, returning it
    /// unchanged — the cheap "does this revision exist" check every public
    /// read/write operation needs before touching disk.
    pub fn revision_root(&self, rev: i64) -> Result<i64> {
        let youngest = self.youngest_revision()?;
        if rev < 0 || rev > youngest {
            return Err(Error::NoSuchRevision(rev));
        }
        Ok(rev)
    }

    /// Read the node-revision that `path` names in revision `rev`.
    pub fn node_revision(&self, rev: i64, path: &str) -> Result<NodeRevision> {
        let rev = self.revision_root(rev)?;
        tree::resolve(&self.paths, self.format.layout, rev, path)
    }

    /// Read a file's full contents at `(rev, path)`.
    pub fn file_contents(&self, rev: i64, path: &str) -> Result<Vec<u8>> {
        let noderev = self.node_revision(rev, path)?;
        if noderev.kind != Kind::File {
            return Err(Error::NotFile(path.to_string()));
        }
        tree::load_file_contents(&self.paths, self.format.layout, noderev.data_rep.as_ref())
    }

    /// List a directory's entries at `(rev, path)`.
    pub fn directory_entries(&self, rev: i64, path: &str) -> Result<Directory> {
        let noderev = self.node_revision(rev, path)?;
        if noderev.kind != Kind::Dir {
            return Err(Error::NotDirectory(path.to_string()));
        }
        tree::load_dir(&self.paths, self.format.layout, noderev.data_rep.as_ref())
    }

    /// Read a node's property list at `(rev, path)`.
    pub fn node_properties(&self, rev: i64, path: &str) -> Result<svnfs_storage::proplist::PropList> {
        let noderev = self.node_revision(rev, path)?;
        tree::load_props(&self.paths, self.format.layout, noderev.prop_rep.as_ref())
    }

    /// The folded per-path change set recorded for an already-committed
    /// revision (spec.md §4.9 step 5).
    pub fn changed_paths(&self, rev: i64) -> Result<BTreeMap<String, FoldedChange>> {
        let rev = self.revision_root(rev)?;
        let bytes = fs::read(self.paths.rev_file(self.format.layout, rev))?;
        let (_, changed_paths_offset) = trailer::parse(&bytes)?;
        changed_paths::read_section(&bytes, changed_paths_offset)
    }

    /// Begin a fresh transaction rooted at `base_rev`, with its mutable
    /// root already cloned in (spec.md §4.8, "Begin a transaction" steps
    /// 1-3).
    pub fn begin_transaction(&self, base_rev: i64) -> Result<Transaction<'_>> {
        let base_rev = self.revision_root(base_rev)?;
        let features = self.format.features();
        let txn_id = next_txn_id(&self.paths, &self.locks, base_rev, features.has_txn_current_file)?;
        let txn = Transaction::begin(&self.paths, &self.locks, txn_id.clone(), base_rev, features.dedicated_protorevs_dir)?;

        let old_root = tree::root_node_revision(&self.paths, self.format.layout, base_rev)?;
        let new_root = NodeRevision {
            id: root_id(&txn_id),
            kind: Kind::Dir,
            predecessor_count: old_root.predecessor_count + 1,
            predecessor: Some(old_root.id.clone()),
            copyroot: old_root.copyroot.clone(),
            copyfrom: None,
            created_path: old_root.created_path.clone(),
            data_rep: old_root.data_rep.clone(),
            prop_rep: old_root.prop_rep.clone(),
            merge_info: old_root.merge_info,
            fresh_txn_root: true,
        };
        txn.put_node_revision(&new_root, false)?;
        Ok(txn)
    }

    /// Resume a transaction that was previously begun and whose id is
    /// already known (e.g. after a crash, or across a process boundary).
    pub fn open_transaction(&self, txn_id: TxnId, base_rev: i64) -> Result<Transaction<'_>> {
        let base_rev = self.revision_root(base_rev)?;
        let features = self.format.features();
        Transaction::open(&self.paths, &self.locks, txn_id, base_rev, features.dedicated_protorevs_dir)
    }

    /// Abandon a transaction, permanently destroying its scratch state.
    pub fn abort_transaction(&self, txn: Transaction<'_>) -> Result<()> {
        txn.abort()
    }

    /// Commit a transaction, turning it into a new, immutable revision.
    pub fn commit(&self, txn: &Transaction<'_>) -> Result<i64> {
        run_commit(&self.commit_env(), txn)
    }

    /// Copy this repository's committed state into a fresh or
    /// partially-populated destination without taking it offline.
    pub fn hotcopy(&self, dst_root: impl AsRef<Path>, dst_is_fresh: bool, cancel: &CancelFn<'_>) -> Result<i64> {
        let dst_paths = RepoPaths::from_root(dst_root.as_ref());
        fs::create_dir_all(dst_paths.root())?;
        let dst_locks = Self::open_locks(&dst_paths)?;
        run_hotcopy(&self.paths, &dst_paths, &dst_locks, dst_is_fresh, cancel)
    }

    /// Upgrade this repository in place to `target_format`.
    pub fn upgrade(&mut self, target_format: i32, on_milestone: Option<&mut dyn FnMut(Milestone)>) -> Result<()> {
        run_upgrade(&self.paths, &self.locks, target_format, on_milestone)?;
        self.format = read_format(&self.paths)?;
        self.rep_cache = open_rep_cache(&self.paths, self.format.features(), &self.config)?;
        Ok(())
    }
}
