//! Streaming file content into a transaction's proto-revision file
//! (spec.md §4.8 step 2, §4.9 step 4: "file contents are already final by
//! the time commit runs — commit only has to check the offsets land
//! inside the proto-revision file").
//!
//! Directory contents are handled differently (see [`crate::dirs`]): they
//! accumulate as incremental K/V/D records and are only turned into a
//! representation segment at commit time, because a directory's final
//! shape (and therefore whether it is worth deltifying at all) isn't known
//! until the transaction stops mutating it.

use crate::scratch::TxnScratch;
use std::fs::{self, OpenOptions};
use std::io::Write;
use svnfs_core::ids::Uniquifier;
use svnfs_core::Result;
use svnfs_storage::rep::RepPointer;
use svnfs_storage::repstore::{write_delta, write_plain, BaseLoc};

/// Revision-number placeholder stamped into a still-mutable
/// [`RepPointer`]. The commit pipeline rewrites this to the newly
/// allocated revision number for every pointer it finds still carrying a
/// `uniquifier` (spec.md §4.9 step 4).
pub const MUTABLE_REVISION_PLACEHOLDER: i64 = 0;

fn append_segment(scratch: &TxnScratch, bytes: &[u8]) -> Result<u64> {
    let offset = fs::metadata(scratch.proto_rev_path())
        .map(|m| m.len())
        .unwrap_or(0);
    let mut f = OpenOptions::new().append(true).open(scratch.proto_rev_path())?;
    f.write_all(bytes)?;
    Ok(offset)
}

/// Append `content` as a `PLAIN` segment to the proto-revision file and
/// return a mutable pointer to it.
pub fn append_plain(
    scratch: &TxnScratch,
    content: &[u8],
    uniquifier: Uniquifier,
) -> Result<RepPointer> {
    let seg = write_plain(content);
    let offset = append_segment(scratch, &seg.bytes)?;
    Ok(RepPointer {
        revision: MUTABLE_REVISION_PLACEHOLDER,
        offset,
        size: seg.on_disk_len,
        expanded_size: seg.expanded_len,
        md5: seg.md5,
        sha1: Some(seg.sha1),
        uniquifier: Some(uniquifier),
    })
}

/// Append `content` as a `DELTA` segment against `base_content` (whose
/// already-committed location is `base`, or `None` for a self-delta) and
/// return a mutable pointer to it.
pub fn append_delta(
    scratch: &TxnScratch,
    base_content: &[u8],
    base: Option<BaseLoc>,
    content: &[u8],
    uniquifier: Uniquifier,
) -> Result<RepPointer> {
    let seg = write_delta(base_content, base, content);
    let offset = append_segment(scratch, &seg.bytes)?;
    Ok(RepPointer {
        revision: MUTABLE_REVISION_PLACEHOLDER,
        offset,
        size: seg.on_disk_len,
        expanded_size: seg.expanded_len,
        md5: seg.md5,
        sha1: Some(seg.sha1),
        uniquifier: Some(uniquifier),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::ids::TxnId;
    use svnfs_core::RepoPaths;
    use tempfile::tempdir;

    fn uniquifier() -> Uniquifier {
        Uniquifier {
            txn_id: TxnId::new(0, 1),
            suffix: 0,
        }
    }

    #[test]
    fn appends_grow_the_proto_rev_file() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();

        let p1 = append_plain(&scratch, b"hello", uniquifier()).unwrap();
        assert_eq!(p1.offset, 0);
        let p2 = append_plain(&scratch, b"world", uniquifier()).unwrap();
        assert!(p2.offset > p1.offset);
        assert_eq!(p1.uniquifier, Some(uniquifier()));
    }

    #[test]
    fn delta_against_committed_base() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        let txn_id = TxnId::new(0, 1);
        let scratch = TxnScratch::create(&paths, &txn_id, false).unwrap();

        let base = b"The quick brown fox jumps over the lazy dog.";
        let target = b"The quick brown fox jumps over the lazy cat.";
        let base_loc = BaseLoc {
            revision: 3,
            offset: 128,
            len: 45,
        };
        let pointer = append_delta(&scratch, base, Some(base_loc), target, uniquifier()).unwrap();
        assert_eq!(pointer.expanded_size, target.len() as u64);
        assert!(pointer.size > 0);
    }
}
