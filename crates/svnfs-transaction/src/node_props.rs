//! A mutable node's property list scratch file: `<node-id>.<copy-id>.props`.
//!
//! Unlike directory entries (which accumulate as an incremental delta,
//! [`crate::dirs`]), a node's property list has no partial-update form on
//! disk — a property change always replaces the whole map, so this file is
//! simply overwritten in full on every `set_node_props`, the same way
//! [`crate::props`] handles the transaction's own properties. Its presence
//! is itself the signal commit uses to tell "this node's properties were
//! touched in this transaction" from "this node-revision inherits its
//! predecessor's unchanged `prop_rep`".

use crate::scratch::TxnScratch;
use svnfs_core::ids::OpaqueId;
use svnfs_core::Result;
use svnfs_storage::proplist::{self, PropList};

/// Read a mutable node's current property list, if it has been touched in
/// this transaction at all.
pub fn read(scratch: &TxnScratch, node_id: &OpaqueId, copy_id: &OpaqueId) -> Result<Option<PropList>> {
    match std::fs::read(scratch.props_file_for(node_id, copy_id)) {
        Ok(bytes) => Ok(Some(proplist::decode(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Overwrite a mutable node's property list in full.
pub fn write(
    scratch: &TxnScratch,
    node_id: &OpaqueId,
    copy_id: &OpaqueId,
    props: &PropList,
) -> Result<()> {
    std::fs::write(scratch.props_file_for(node_id, copy_id), proplist::encode(props))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::ids::TxnId;
    use svnfs_core::RepoPaths;
    use tempfile::tempdir;

    #[test]
    fn unset_reads_as_none() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let node_id: OpaqueId = "_0".parse().unwrap();
        let copy_id: OpaqueId = "_0".parse().unwrap();
        assert_eq!(read(&scratch, &node_id, &copy_id).unwrap(), None);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        let node_id: OpaqueId = "_0".parse().unwrap();
        let copy_id: OpaqueId = "_0".parse().unwrap();
        let mut props = PropList::new();
        props.insert("svn:executable".into(), b"*".to_vec());
        write(&scratch, &node_id, &copy_id, &props).unwrap();
        assert_eq!(read(&scratch, &node_id, &copy_id).unwrap(), Some(props));
    }
}
