//! Administrative operations that run outside the normal read/commit path:
//! live hotcopy (spec.md §4.10) and format upgrade (spec.md §4.11).
//!
//! Both operations hold the destination repository's global write lock for
//! their duration and are built to be safely re-run after cancellation or a
//! crash: every artifact that matters for correctness is either written
//! atomically (rename into place) or stamped last.

#![warn(missing_docs)]

pub mod hotcopy;
pub mod upgrade;

pub use hotcopy::{hotcopy, CancelFn};
pub use upgrade::{upgrade, Milestone};
