//! The representation store: reading/writing the string representations
//! (property lists, directory contents, file contents) that live inside
//! revision files, plus node-revision records and the deltification policy
//! that decides how they're encoded.
//!
//! Depends only on `svnfs-core` for ids, errors and path derivation; has no
//! knowledge of transactions or commits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod deltify;
pub mod dirent;
pub mod noderev;
pub mod proplist;
pub mod rep;
pub mod repstore;
pub mod skel;
pub mod svndiff;

pub use deltify::{DeltaBaseChoice, DeltifyConfig};
pub use dirent::{DirChange, DirEntry, Directory};
pub use noderev::{Kind, MergeInfo, NodeRevision, RevPath};
pub use proplist::PropList;
pub use rep::RepPointer;
pub use repstore::{BaseLoc, RawByteSource, SegmentHeader, WrittenSegment};
pub use skel::{Skel, SkelError};
