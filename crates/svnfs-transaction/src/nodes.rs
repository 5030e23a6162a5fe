//! Reading and writing a transaction's mutable node-revisions: one
//! `.noderev` scratch file per mutable node-revision (spec.md §4.8 step 2).

use crate::scratch::TxnScratch;
use std::fs;
use std::io;
use svnfs_core::ids::NodeRevisionId;
use svnfs_core::{Error, Result};
use svnfs_storage::noderev::NodeRevision;

/// Write (or overwrite) a mutable node-revision's scratch record.
pub fn put(scratch: &TxnScratch, node_rev: &NodeRevision, emit_merge_info: bool) -> Result<()> {
    let bytes = node_rev.encode(emit_merge_info);
    fs::write(scratch.node_rev_path(&node_rev.id), bytes)?;
    Ok(())
}

/// Read a mutable node-revision back by id.
pub fn get(scratch: &TxnScratch, id: &NodeRevisionId) -> Result<NodeRevision> {
    let bytes = fs::read(scratch.node_rev_path(id)).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::Corrupt(format!("no mutable node-revision for {id}")),
        _ => Error::Io(e),
    })?;
    NodeRevision::parse(&bytes)
}

/// Remove a mutable node-revision's scratch record (a node line was
/// replaced by a fresh one, or the transaction is being aborted).
pub fn delete(scratch: &TxnScratch, id: &NodeRevisionId) -> Result<()> {
    match fs::remove_file(scratch.node_rev_path(id)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::ids::{Origin, TxnId};
    use svnfs_core::RepoPaths;
    use svnfs_storage::noderev::{Kind, RevPath};
    use tempfile::tempdir;

    fn sample(scratch_txn: &TxnId) -> NodeRevision {
        NodeRevision {
            id: NodeRevisionId::new(
                "_0".parse().unwrap(),
                "_0".parse().unwrap(),
                Origin::Txn(scratch_txn.clone()),
            ),
            kind: Kind::File,
            predecessor_count: 0,
            predecessor: None,
            copyroot: RevPath {
                revision: 0,
                path: "/".into(),
            },
            copyfrom: None,
            created_path: "/hello".into(),
            data_rep: None,
            prop_rep: None,
            merge_info: None,
            fresh_txn_root: false,
        }
    }

    #[test]
    fn put_then_get_roundtrip() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let nr = sample(&txn_id);
        put(&scratch, &nr, false).unwrap();
        assert_eq!(get(&scratch, &nr.id).unwrap(), nr);
    }

    #[test]
    fn get_missing_is_corrupt() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let missing = NodeRevisionId::new(
            "_9".parse().unwrap(),
            "_0".parse().unwrap(),
            Origin::Txn(txn_id),
        );
        assert!(get(&scratch, &missing).unwrap_err().is_corrupt());
    }

    #[test]
    fn delete_is_idempotent() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let nr = sample(&txn_id);
        put(&scratch, &nr, false).unwrap();
        delete(&scratch, &nr.id).unwrap();
        delete(&scratch, &nr.id).unwrap();
        assert!(get(&scratch, &nr.id).is_err());
    }
}
