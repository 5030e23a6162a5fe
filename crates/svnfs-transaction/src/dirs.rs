//! Accumulating a mutable directory's entry changes during a transaction.
//!
//! Unlike file contents, a directory's final representation is not written
//! until commit (spec.md §4.9 step 4: "directories are materialized and
//! deltified only once their contents stop changing"). While the
//! transaction is open, every `set_entry`/`delete_entry` call is appended
//! as an incremental K/V/D record to a per-node scratch file; commit
//! replays them over the node's base directory (or an empty one, for a
//! freshly-added directory) to get the final [`Directory`].

use crate::scratch::TxnScratch;
use std::fs::OpenOptions;
use std::io::Write;
use svnfs_core::ids::OpaqueId;
use svnfs_core::Result;
use svnfs_storage::dirent::{self, DirChange, Directory};

/// Append one incremental change to a directory's scratch delta file.
pub fn append_change(
    scratch: &TxnScratch,
    node_id: &OpaqueId,
    copy_id: &OpaqueId,
    change: &DirChange,
) -> Result<()> {
    let path = scratch.dir_delta_path(node_id, copy_id);
    let mut f = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    f.write_all(&dirent::encode_change(change))?;
    Ok(())
}

/// Replay every accumulated change for this node over `base`, yielding the
/// directory's current (still-mutable) contents.
pub fn materialize(
    scratch: &TxnScratch,
    node_id: &OpaqueId,
    copy_id: &OpaqueId,
    base: &Directory,
) -> Result<Directory> {
    let path = scratch.dir_delta_path(node_id, copy_id);
    match std::fs::read(&path) {
        Ok(bytes) => dirent::apply_changes(base, &bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(base.clone()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::ids::{Origin, TxnId};
    use svnfs_core::RepoPaths;
    use svnfs_storage::dirent::DirEntry;
    use svnfs_storage::noderev::Kind;
    use tempfile::tempdir;

    fn child_id(node: &str) -> svnfs_core::ids::NodeRevisionId {
        svnfs_core::ids::NodeRevisionId::new(
            node.parse().unwrap(),
            "0".parse().unwrap(),
            Origin::Txn(TxnId::new(0, 1)),
        )
    }

    #[test]
    fn materialize_with_no_delta_file_returns_base() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let node_id: OpaqueId = "_0".parse().unwrap();
        let copy_id: OpaqueId = "_0".parse().unwrap();

        let mut base = Directory::new();
        base.insert(
            "existing".into(),
            DirEntry {
                kind: Kind::File,
                id: child_id("k1"),
            },
        );
        let result = materialize(&scratch, &node_id, &copy_id, &base).unwrap();
        assert_eq!(result, base);
    }

    #[test]
    fn append_and_materialize_add_and_delete() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let node_id: OpaqueId = "_0".parse().unwrap();
        let copy_id: OpaqueId = "_0".parse().unwrap();

        append_change(
            &scratch,
            &node_id,
            &copy_id,
            &DirChange::Set {
                name: "new".into(),
                entry: DirEntry {
                    kind: Kind::File,
                    id: child_id("k2"),
                },
            },
        )
        .unwrap();
        append_change(
            &scratch,
            &node_id,
            &copy_id,
            &DirChange::Delete { name: "new".into() },
        )
        .unwrap();

        let base = Directory::new();
        let result = materialize(&scratch, &node_id, &copy_id, &base).unwrap();
        assert!(result.is_empty());
    }
}
