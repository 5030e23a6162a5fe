//! # svnfs
//!
//! An append-only versioned filesystem storage engine — a from-scratch
//! rewrite of the on-disk half of Subversion's FSFS backend: revision
//! files, proto-revision commits, skip-delta deltification, SHA-1 backed
//! representation sharing, live hotcopy, and in-place format upgrade.
//!
//! # Quick start
//!
//! ```no_run
//! use svnfs::Fs;
//! use svnfs_core::format::Layout;
//!
//! fn main() -> svnfs::Result<()> {
//!     let repo = Fs::create("./my-repo", 7, Layout::Linear)?;
//!
//!     let txn = repo.begin_transaction(repo.youngest_revision()?)?;
//!     svnfs::editor::make_dir(repo.paths(), repo.format().layout, &txn, "/trunk")?;
//!     svnfs::editor::make_file(repo.paths(), repo.format().layout, &txn, "/trunk/README", b"hello")?;
//!     let rev = repo.commit(&txn)?;
//!
//!     assert_eq!(repo.file_contents(rev, "/trunk/README")?, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Fs`] is the single entry point a caller needs; it wires together the
//! workspace's seven library crates:
//!
//! | Crate | Covers |
//! |---|---|
//! | `svnfs-core` | ids, the `format` file, `fsfs.conf`, path derivation, the shared error type |
//! | `svnfs-lock` | the three-lock discipline (write, transaction-id allocator, proto-revision) |
//! | `svnfs-storage` | node-revision/representation/directory encodings, deltification policy, svndiff |
//! | `svnfs-repcache` | the SHA-1 rep-sharing index |
//! | `svnfs-transaction` | the mutable scratch area a transaction writes into |
//! | `svnfs-commit` | turning a transaction into a durable revision |
//! | `svnfs-admin` | hotcopy and format upgrade |
//!
//! This crate's own modules are the glue between that stack and [`Fs`]'s
//! public operations: [`tree`] reads committed state, [`editor`] builds a
//! transaction's mutable tree by path, and [`backend`] names the dozen-odd
//! operations above as a trait (spec.md §9) that [`Fs`] implements.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod editor;
pub mod fs;
pub mod tree;

pub use backend::Backend;
pub use fs::Fs;
pub use svnfs_core::format::Layout;
pub use svnfs_core::{Error, Result};
pub use svnfs_transaction::Transaction;
