//! Minting a fresh transaction-id (spec.md §4.3, "Transaction-id").
//!
//! Two strategies, selected by [`svnfs_core::format::FormatFeatures::has_txn_current_file`]:
//!
//! - newer formats keep a single `txn-current` counter file holding a
//!   base36 number; allocation is an atomic read-bump-write under the
//!   allocator lock.
//! - legacy stores (no counter file) mint an id by probing for the first
//!   `r-<i>.txn` scratch directory name not already in use, `i = 1..99999`,
//!   reporting [`svnfs_core::Error::UniqueNamesExhausted`] on exhaustion.

use std::fs;

use svnfs_core::ids::{from_base36, to_base36, TxnId};
use svnfs_core::{Error, RepoPaths, Result};
use svnfs_lock::RepoLocks;

const LEGACY_PROBE_LIMIT: u64 = 99_999;

/// Allocate a fresh transaction-id rooted at `base_rev`.
pub fn next_txn_id(
    paths: &RepoPaths,
    locks: &RepoLocks,
    base_rev: i64,
    has_txn_current_file: bool,
) -> Result<TxnId> {
    if has_txn_current_file {
        next_txn_id_counted(paths, locks, base_rev)
    } else {
        next_txn_id_legacy(paths, base_rev)
    }
}

/// Newer-format path: atomically read-modify-write the `txn-current`
/// counter file under the transaction-id allocator lock (spec.md §4.2
/// lock #2, §4.3).
fn next_txn_id_counted(paths: &RepoPaths, locks: &RepoLocks, base_rev: i64) -> Result<TxnId> {
    let _guard = locks
        .lock_txn_alloc()
        .map_err(|e| Error::FsGeneral(e.to_string()))?;

    let path = paths.txn_current_file();
    let seq = match fs::read_to_string(&path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                0
            } else {
                from_base36(trimmed)?
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };
    let next = seq + 1;
    fs::write(&path, format!("{}\n", to_base36(next)))?;
    Ok(TxnId::new(base_rev, next))
}

/// Legacy-format path: probe for the first unused `r-<i>.txn` directory
/// name (spec.md §4.3: "mint ids by attempting `r-<i>.txn` directory
/// creation").
fn next_txn_id_legacy(paths: &RepoPaths, base_rev: i64) -> Result<TxnId> {
    for i in 1..=LEGACY_PROBE_LIMIT {
        let candidate = TxnId::new(base_rev, i);
        let dir = paths.txn_dir(&candidate);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::UniqueNamesExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_locks(root: &RepoPaths) -> RepoLocks {
        RepoLocks::open(
            root.write_lock_file(),
            root.txn_current_lock_file(),
            root.txn_protorevs_dir(),
        )
        .unwrap()
    }

    #[test]
    fn counted_allocation_is_monotonic() {
        let dir = tempdir().unwrap();
        let paths = RepoPaths::from_root(dir.path());
        let locks = fresh_locks(&paths);

        let a = next_txn_id(&paths, &locks, 3, true).unwrap();
        let b = next_txn_id(&paths, &locks, 3, true).unwrap();
        assert_eq!(a, TxnId::new(3, 1));
        assert_eq!(b, TxnId::new(3, 2));
    }

    #[test]
    fn counted_allocation_survives_missing_counter_file() {
        let dir = tempdir().unwrap();
        let paths = RepoPaths::from_root(dir.path());
        let locks = fresh_locks(&paths);
        assert!(!paths.txn_current_file().is_file());

        let id = next_txn_id(&paths, &locks, 0, true).unwrap();
        assert_eq!(id, TxnId::new(0, 1));
        assert!(paths.txn_current_file().is_file());
    }

    #[test]
    fn legacy_allocation_probes_scratch_directories() {
        let dir = tempdir().unwrap();
        let paths = RepoPaths::from_root(dir.path());
        let locks = fresh_locks(&paths);
        std::fs::create_dir_all(paths.transactions_dir()).unwrap();

        // Pre-occupy the first slot so allocation must skip it.
        std::fs::create_dir_all(paths.txn_dir(&TxnId::new(0, 1))).unwrap();

        let id = next_txn_id(&paths, &locks, 0, false).unwrap();
        assert_eq!(id, TxnId::new(0, 2));
    }
}
