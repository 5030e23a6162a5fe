//! Reading a committed tree: resolving a repository path against a
//! revision's root and reconstructing the bytes or directory entries it
//! names (spec.md §4.5, §4.9's reconstruction half).
//!
//! Everything here reads already-committed, immutable bytes — it never
//! touches a transaction's scratch state. [`crate::editor`] is the
//! mutable-side counterpart used while a transaction is still open.

use std::fs;

use svnfs_commit::{source, trailer};
use svnfs_core::format::Layout;
use svnfs_core::ids::{NodeRevisionId, Origin};
use svnfs_core::{Error, RepoPaths, Result};
use svnfs_storage::dirent::{self, Directory};
use svnfs_storage::noderev::{Kind, NodeRevision};
use svnfs_storage::proplist::{self, PropList};
use svnfs_storage::rep::RepPointer;
use svnfs_storage::repstore;

/// Split a repository path (`"/"`, `"/a"`, `"/a/b"`) into its non-empty
/// components. The root itself has no components.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Read the root node-revision of an already-committed revision.
pub fn root_node_revision(paths: &RepoPaths, layout: Layout, rev: i64) -> Result<NodeRevision> {
    let bytes = fs::read(paths.rev_file(layout, rev)).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NoSuchRevision(rev),
        _ => Error::Io(e),
    })?;
    let (root_offset, _) = trailer::parse(&bytes)?;
    source::read_node_revision_at(paths, layout, rev, root_offset)
}

/// Read an already-committed node-revision by its id (must carry a
/// revision-located origin).
pub fn read_committed(paths: &RepoPaths, layout: Layout, id: &NodeRevisionId) -> Result<NodeRevision> {
    match id.origin {
        Origin::Rev { rev, offset } => source::read_node_revision_at(paths, layout, rev, offset),
        Origin::Txn(_) => Err(Error::Corrupt(format!(
            "expected a committed node-revision id, found transaction-located {id}"
        ))),
    }
}

/// Reconstruct a directory's entries from its (possibly absent) `data_rep`.
pub fn load_dir(paths: &RepoPaths, layout: Layout, data_rep: Option<&RepPointer>) -> Result<Directory> {
    match data_rep {
        Some(rep) => {
            let src = source::RevisionFileSource::new(paths, layout);
            let bytes = repstore::reconstruct(&src, rep.revision, rep.offset, rep.size)?;
            dirent::parse_final(&bytes)
        }
        None => Ok(Directory::new()),
    }
}

/// Reconstruct a node-revision's property list from its (possibly absent)
/// `prop_rep`.
pub fn load_props(paths: &RepoPaths, layout: Layout, prop_rep: Option<&RepPointer>) -> Result<PropList> {
    match prop_rep {
        Some(rep) => {
            let src = source::RevisionFileSource::new(paths, layout);
            let bytes = repstore::reconstruct(&src, rep.revision, rep.offset, rep.size)?;
            proplist::decode(&bytes)
        }
        None => Ok(PropList::new()),
    }
}

/// Reconstruct a file node-revision's contents from its (possibly absent)
/// `data_rep` — absent means an empty file.
pub fn load_file_contents(paths: &RepoPaths, layout: Layout, data_rep: Option<&RepPointer>) -> Result<Vec<u8>> {
    match data_rep {
        Some(rep) => {
            let src = source::RevisionFileSource::new(paths, layout);
            repstore::reconstruct(&src, rep.revision, rep.offset, rep.size)
        }
        None => Ok(Vec::new()),
    }
}

/// Walk `path` down from revision `rev`'s root, returning the
/// node-revision it names.
pub fn resolve(paths: &RepoPaths, layout: Layout, rev: i64, path: &str) -> Result<NodeRevision> {
    let mut current = root_node_revision(paths, layout, rev)?;
    let mut walked = String::from("/");
    for comp in components(path) {
        if current.kind != Kind::Dir {
            return Err(Error::NotDirectory(walked));
        }
        let dir = load_dir(paths, layout, current.data_rep.as_ref())?;
        let entry = dir
            .get(comp)
            .ok_or_else(|| Error::UnversionedResource(path.to_string()))?;
        current = read_committed(paths, layout, &entry.id)?;
        if walked != "/" {
            walked.push('/');
        }
        walked.push_str(comp);
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_components() {
        assert_eq!(components("/"), Vec::<&str>::new());
        assert_eq!(components("/a/b"), vec!["a", "b"]);
        assert_eq!(components("a/b/"), vec!["a", "b"]);
    }
}
