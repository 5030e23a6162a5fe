//! Initial transaction properties: author, log message, and the
//! `svn:txn-*` bookkeeping flags a transaction carries before it becomes a
//! revision (spec.md §4.8 step 1).

use crate::scratch::TxnScratch;
use svnfs_core::Result;
use svnfs_storage::proplist::{self, PropList};

/// Read a transaction's current property list, or an empty one if it has
/// never had properties set.
pub fn read(scratch: &TxnScratch) -> Result<PropList> {
    match std::fs::read(scratch.props_path()) {
        Ok(bytes) if !bytes.is_empty() => proplist::decode(&bytes),
        _ => Ok(PropList::new()),
    }
}

/// Overwrite a transaction's property list in full.
pub fn write(scratch: &TxnScratch, props: &PropList) -> Result<()> {
    std::fs::write(scratch.props_path(), proplist::encode(props))?;
    Ok(())
}

/// Set (or clear, with `value: None`) a single property.
pub fn set(scratch: &TxnScratch, name: &str, value: Option<Vec<u8>>) -> Result<()> {
    let mut props = read(scratch)?;
    match value {
        Some(v) => {
            props.insert(name.to_string(), v);
        }
        None => {
            props.remove(name);
        }
    }
    write(scratch, &props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::ids::TxnId;
    use svnfs_core::RepoPaths;
    use tempfile::tempdir;

    #[test]
    fn unset_props_file_reads_as_empty() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        assert!(read(&scratch).unwrap().is_empty());
    }

    #[test]
    fn set_then_read_roundtrip() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        set(&scratch, "svn:author", Some(b"jrandom".to_vec())).unwrap();
        set(&scratch, "svn:log", Some(b"hello".to_vec())).unwrap();
        let props = read(&scratch).unwrap();
        assert_eq!(props.get("svn:author"), Some(&b"jrandom".to_vec()));
        assert_eq!(props.get("svn:log"), Some(&b"hello".to_vec()));
    }

    #[test]
    fn clearing_a_property_removes_it() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();
        set(&scratch, "svn:author", Some(b"jrandom".to_vec())).unwrap();
        set(&scratch, "svn:author", None).unwrap();
        assert!(!read(&scratch).unwrap().contains_key("svn:author"));
    }
}
