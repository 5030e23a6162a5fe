//! Reading raw bytes out of already-committed revision files on disk, for
//! the deltification engine's "reconstruct the predecessor's content"
//! needs (spec.md §4.5, §4.6).
//!
//! This is the counterpart to the transaction layer's proto-revision file:
//! once a revision has been renamed into `revs/`, its bytes are immutable,
//! so there's no locking concern here beyond an ordinary file read.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use svnfs_core::format::Layout;
use svnfs_core::ids::{NodeRevisionId, Origin};
use svnfs_core::{Error, RepoPaths, Result};
use svnfs_storage::noderev::NodeRevision;
use svnfs_storage::repstore::RawByteSource;

/// A [`RawByteSource`] reading committed revision files off disk, honoring
/// the repository's configured shard layout.
pub struct RevisionFileSource<'a> {
    paths: &'a RepoPaths,
    layout: Layout,
}

impl<'a> RevisionFileSource<'a> {
    /// Build a source rooted at `paths`, honoring `layout`.
    pub fn new(paths: &'a RepoPaths, layout: Layout) -> Self {
        RevisionFileSource { paths, layout }
    }
}

impl RawByteSource for RevisionFileSource<'_> {
    fn read_at(&self, revision: i64, offset: u64, len: u64) -> Result<Vec<u8>> {
        let path = self.paths.rev_file(self.layout, revision);
        let mut f = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NoSuchRevision(revision),
            _ => Error::Io(e),
        })?;
        let file_len = f.metadata()?.len();
        let start = offset.min(file_len);
        let end = offset.saturating_add(len).min(file_len);
        f.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Read a node-revision record starting at a known offset inside a
/// committed revision file.
///
/// The record's own balanced parentheses mark where it ends, so only a
/// prefix of the file (from `offset` to EOF) needs to be read; trailing
/// bytes — more records, the changed-paths section, the trailer — are
/// parsed and discarded by [`svnfs_storage::skel::Skel::parse`]'s
/// non-complete form.
pub fn read_node_revision_at(
    paths: &RepoPaths,
    layout: Layout,
    revision: i64,
    offset: u64,
) -> Result<svnfs_storage::noderev::NodeRevision> {
    let path = paths.rev_file(layout, revision);
    let mut f = File::open(&path)?;
    f.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let (skel, _consumed) = svnfs_storage::skel::Skel::parse(&buf).map_err(|e| {
        Error::Corrupt(format!(
            "malformed node-revision at r{revision}/{offset}: {e}"
        ))
    })?;
    svnfs_storage::noderev::NodeRevision::from_skel(&skel)
}

/// Read the already-committed node-revision `id` names.
///
/// Used to follow predecessor links: once a node-revision is committed,
/// `id.origin` is always `Origin::Rev`, so this is a thin wrapper over
/// [`read_node_revision_at`].
fn read_committed_node_revision(paths: &RepoPaths, layout: Layout, id: &NodeRevisionId) -> Result<NodeRevision> {
    match id.origin {
        Origin::Rev { rev, offset } => read_node_revision_at(paths, layout, rev, offset),
        Origin::Txn(_) => Err(Error::Corrupt(format!(
            "expected a committed node-revision id while walking the predecessor chain, found transaction-located {id}"
        ))),
    }
}

/// Follow a node-revision's `predecessor` chain `distance` steps back from
/// `first` (the *immediate* predecessor, i.e. the ancestor one step back),
/// returning the node-revision `distance` steps back in total.
///
/// This is the walk spec.md §4.6 calls for: "Walk back that many
/// predecessors; the base is that ancestor's `data-rep` (or `prop-rep` if
/// deltifying properties)." `distance` is always `>= 1`; `distance == 1`
/// returns `first` itself without any further reads.
pub fn walk_predecessors(paths: &RepoPaths, layout: Layout, first: &NodeRevisionId, distance: u64) -> Result<NodeRevision> {
    let mut current = read_committed_node_revision(paths, layout, first)?;
    for _ in 1..distance {
        let next = current.predecessor.clone().ok_or_else(|| {
            Error::Corrupt(format!(
                "predecessor chain ended before walking {distance} steps back from {first}"
            ))
        })?;
        current = read_committed_node_revision(paths, layout, &next)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::format::Layout;
    use tempfile::tempdir;

    #[test]
    fn reads_clamped_range_at_eof() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        std::fs::create_dir_all(paths.revs_dir()).unwrap();
        std::fs::write(paths.rev_file(Layout::Linear, 1), b"hello world").unwrap();
        let source = RevisionFileSource::new(&paths, Layout::Linear);
        let bytes = source.read_at(1, 6, 100).unwrap();
        assert_eq!(bytes, b"world");
    }

    #[test]
    fn missing_revision_file_is_no_such_revision() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let source = RevisionFileSource::new(&paths, Layout::Linear);
        let err = source.read_at(9, 0, 10).unwrap_err();
        assert!(matches!(err, Error::NoSuchRevision(9)));
    }
}
