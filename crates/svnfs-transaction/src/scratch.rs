//! A transaction's on-disk scratch directory: the proto-revision file, its
//! lock, the changes file, the `next-ids` counter file, and one file per
//! mutable node-revision (spec.md §4.8, step 2).

use svnfs_core::ids::{NextIds, NodeRevisionId, OpaqueId, TxnId};
use svnfs_core::{Error, Result, RepoPaths};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Paths and small helpers around a single transaction's scratch
/// directory. Owns no in-memory state beyond the directory path — every
/// read/write goes straight to disk, matching the teacher's preference for
/// explicit I/O over cached transaction state (spec.md §9: transaction
/// scratch state is purged wholesale on abort or commit, never patched
/// in-memory across process restarts).
#[derive(Debug, Clone)]
pub struct TxnScratch {
    dir: PathBuf,
    dedicated_protorevs_dir: bool,
    protorevs_dir: PathBuf,
}

impl TxnScratch {
    /// Create a brand-new scratch directory for `txn_id`: an empty
    /// proto-revision file, its lock file, an empty changes file, and a
    /// `next-ids` file seeded at `"0 0\n"` (spec.md §4.8 step 2).
    pub fn create(paths: &RepoPaths, txn_id: &TxnId, dedicated_protorevs_dir: bool) -> Result<Self> {
        let dir = paths.txn_dir(txn_id);
        fs::create_dir_all(&dir)?;

        let scratch = TxnScratch {
            dir,
            dedicated_protorevs_dir,
            protorevs_dir: paths.txn_protorevs_dir(),
        };

        if dedicated_protorevs_dir {
            fs::create_dir_all(&scratch.protorevs_dir)?;
        }

        File::create(scratch.proto_rev_path())?;
        File::create(scratch.proto_rev_lock_path())?;
        File::create(scratch.changes_path())?;
        let mut next_ids = File::create(scratch.next_ids_path())?;
        next_ids.write_all(NextIds::default().to_line().as_bytes())?;

        Ok(scratch)
    }

    /// Re-open an existing scratch directory (e.g. after a restart, to
    /// purge or resume against an abandoned transaction).
    pub fn open_existing(
        paths: &RepoPaths,
        txn_id: &TxnId,
        dedicated_protorevs_dir: bool,
    ) -> Result<Self> {
        let dir = paths.txn_dir(txn_id);
        if !dir.is_dir() {
            return Err(Error::NoSuchTransaction(txn_id.to_string()));
        }
        Ok(TxnScratch {
            dir,
            dedicated_protorevs_dir,
            protorevs_dir: paths.txn_protorevs_dir(),
        })
    }

    /// The scratch directory itself.
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn txn_key(&self) -> String {
        self.dir
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string()
    }

    /// The proto-revision file, honoring the dedicated-directory feature
    /// gate (spec.md §4.1, §6).
    pub fn proto_rev_path(&self) -> PathBuf {
        if self.dedicated_protorevs_dir {
            self.protorevs_dir.join(format!("{}.rev", self.txn_key()))
        } else {
            self.dir.join("rev")
        }
    }

    /// The proto-revision lock file.
    pub fn proto_rev_lock_path(&self) -> PathBuf {
        if self.dedicated_protorevs_dir {
            self.protorevs_dir.join(format!("{}.rev-lock", self.txn_key()))
        } else {
            self.dir.join("rev-lock")
        }
    }

    /// The changes file.
    pub fn changes_path(&self) -> PathBuf {
        self.dir.join("changes")
    }

    /// The `next-ids` counter file.
    pub fn next_ids_path(&self) -> PathBuf {
        self.dir.join("next-ids")
    }

    /// The initial transaction property file (author, date, flags).
    pub fn props_path(&self) -> PathBuf {
        self.dir.join("props")
    }

    /// File naming a single mutable node-revision's serialized record.
    pub fn node_rev_path(&self, id: &NodeRevisionId) -> PathBuf {
        self.dir
            .join(format!("{}.{}.noderev", id.node_id, id.copy_id))
    }

    /// File accumulating a mutable directory's incremental K/V/D records.
    pub fn dir_delta_path(&self, node_id: &OpaqueId, copy_id: &OpaqueId) -> PathBuf {
        self.dir.join(format!("{node_id}.{copy_id}.dir-delta"))
    }

    /// File holding a node's property-list skel.
    pub fn props_file_for(&self, node_id: &OpaqueId, copy_id: &OpaqueId) -> PathBuf {
        self.dir.join(format!("{node_id}.{copy_id}.props"))
    }

    /// Load the current node/copy id sequence counters.
    pub fn load_next_ids(&self) -> Result<NextIds> {
        let contents = fs::read_to_string(self.next_ids_path())?;
        NextIds::parse(&contents)
    }

    /// Persist updated node/copy id sequence counters atomically
    /// (open-truncate-write-close, per spec.md §4.4's `put` contract).
    pub fn save_next_ids(&self, ids: NextIds) -> Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(self.next_ids_path())?;
        f.write_all(ids.to_line().as_bytes())?;
        Ok(())
    }

    /// Permanently destroy this transaction's scratch state: everything
    /// under its directory, plus its dedicated proto-rev files if any
    /// (spec.md §4.9 step 14, and the abort path).
    pub fn purge(&self) -> Result<()> {
        if self.dedicated_protorevs_dir {
            let _ = fs::remove_file(self.proto_rev_path());
            let _ = fs::remove_file(self.proto_rev_lock_path());
        }
        if self.dir.is_dir() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::ids::TxnId;
    use tempfile::tempdir;

    #[test]
    fn create_seeds_expected_files() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();

        assert!(scratch.proto_rev_path().is_file());
        assert!(scratch.proto_rev_lock_path().is_file());
        assert!(scratch.changes_path().is_file());
        assert!(scratch.next_ids_path().is_file());

        let ids = scratch.load_next_ids().unwrap();
        assert_eq!(ids.node_seq, 0);
        assert_eq!(ids.copy_seq, 0);
    }

    #[test]
    fn dedicated_protorevs_dir_honored() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, true).unwrap();
        assert!(scratch.proto_rev_path().starts_with(paths.txn_protorevs_dir()));
    }

    #[test]
    fn save_and_reload_next_ids() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        scratch
            .save_next_ids(NextIds {
                node_seq: 3,
                copy_seq: 1,
            })
            .unwrap();
        let ids = scratch.load_next_ids().unwrap();
        assert_eq!(ids.node_seq, 3);
        assert_eq!(ids.copy_seq, 1);
    }

    #[test]
    fn purge_removes_directory() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        scratch.purge().unwrap();
        assert!(!scratch.dir().is_dir());
    }

    #[test]
    fn open_existing_fails_for_missing_txn() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 99);
        assert!(TxnScratch::open_existing(&paths, &txn_id, false).is_err());
    }
}
