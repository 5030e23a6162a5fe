//! The rep-sharing index: a small embedded SQL database mapping expanded
//! SHA-1 digests to representation locations, plus the per-transaction
//! sidecar files that make intra-transaction lookups cheap before a
//! revision is even committed (spec.md §4.7).
//!
//! Three lookup tiers exist in spec.md §4.7; this crate implements the
//! cheaper two of them directly (sidecar files are just files) and the
//! index database itself. The cheapest tier — a fresh SHA-1 already
//! accumulated within the *same* uncommitted revision — has no persistent
//! state and lives as an in-memory map inside the transaction layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

use rusqlite::{params, Connection, OptionalExtension};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::fs;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by the rep-sharing index.
#[derive(Debug, Error)]
pub enum RepCacheError {
    /// Underlying SQLite error.
    #[error("rep-cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// I/O error reading/writing a sidecar file.
    #[error("rep-cache sidecar I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where a representation's bytes live, as recorded by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepLocation {
    /// Owning revision.
    pub revision: i64,
    /// Byte offset of the representation segment within that revision.
    pub offset: u64,
    /// On-disk segment length.
    pub size: u64,
    /// Expanded (logical) length.
    pub expanded_size: u64,
}

/// A handle to the `rep-cache.db` SQLite database for one repository.
pub struct RepCache {
    conn: Connection,
}

impl RepCache {
    /// Open (creating if necessary) the rep-cache database at `path`,
    /// opened in WAL mode so readers never block behind a writer's short
    /// insert transaction (spec.md §5).
    pub fn open(path: &Path) -> Result<Self, RepCacheError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS reps (
                sha1 TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                offset INTEGER NOT NULL,
                size INTEGER NOT NULL,
                expanded_size INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(RepCache { conn })
    }

    /// Open an in-memory database, for tests that don't need persistence.
    pub fn open_in_memory() -> Result<Self, RepCacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE reps (
                sha1 TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                offset INTEGER NOT NULL,
                size INTEGER NOT NULL,
                expanded_size INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(RepCache { conn })
    }

    /// Look up a SHA-1 digest (hex), returning its recorded location if
    /// present.
    pub fn lookup(&self, sha1: &str) -> Result<Option<RepLocation>, RepCacheError> {
        self.conn
            .query_row(
                "SELECT revision, offset, size, expanded_size FROM reps WHERE sha1 = ?1",
                params![sha1],
                |row| {
                    Ok(RepLocation {
                        revision: row.get(0)?,
                        offset: row.get(1)?,
                        size: row.get(2)?,
                        expanded_size: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(RepCacheError::from)
    }

    /// Batch-insert newly-written representations in one transaction,
    /// using insert-or-ignore semantics: a concurrent commit may have
    /// written the same SHA-1 first, which is not an error (spec.md §4.7).
    pub fn insert_batch(&mut self, entries: &[(String, RepLocation)]) -> Result<(), RepCacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.conn.transaction()?;
        {
            let mut stmt = txn.prepare(
                "INSERT OR IGNORE INTO reps (sha1, revision, offset, size, expanded_size)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (sha1, loc) in entries {
                stmt.execute(params![sha1, loc.revision, loc.offset, loc.size, loc.expanded_size])?;
            }
        }
        txn.commit()?;
        debug!(count = entries.len(), "inserted rep-sharing entries");
        Ok(())
    }

    /// Remove every entry whose revision exceeds `max_revision` — used by
    /// hotcopy after copying the database, to drop entries that refer to
    /// revisions the destination doesn't have yet (spec.md §4.10).
    pub fn prune_above(&mut self, max_revision: i64) -> Result<usize, RepCacheError> {
        let removed = self
            .conn
            .execute("DELETE FROM reps WHERE revision > ?1", params![max_revision])?;
        if removed > 0 {
            warn!(removed, max_revision, "pruned rep-cache entries beyond destination's youngest revision");
        }
        Ok(removed)
    }
}

/// Path of a transaction's sidecar file for `sha1`, inside its scratch
/// directory. Written whenever rep-sharing is enabled and a full
/// representation has just been flushed (spec.md §4.7, tier 2).
pub fn sidecar_path(txn_dir: &Path, sha1: &str) -> PathBuf {
    txn_dir.join(sha1)
}

/// Write a sidecar file recording a representation's location.
pub fn write_sidecar(txn_dir: &Path, sha1: &str, loc: RepLocation) -> Result<(), RepCacheError> {
    let path = sidecar_path(txn_dir, sha1);
    let contents = format!("{} {} {} {}\n", loc.revision, loc.offset, loc.size, loc.expanded_size);
    let mut f = fs::File::create(&path)?;
    f.write_all(contents.as_bytes())?;
    Ok(())
}

/// Read a transaction's sidecar file for `sha1`, if it exists.
pub fn read_sidecar(txn_dir: &Path, sha1: &str) -> Result<Option<RepLocation>, RepCacheError> {
    let path = sidecar_path(txn_dir, sha1);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let mut parts = contents.trim().split(' ');
            let parse_next = |p: &mut std::str::Split<'_, char>| -> Option<i64> { p.next()?.parse().ok() };
            let revision = parse_next(&mut parts).ok_or_else(|| {
                RepCacheError::Io(io::Error::new(io::ErrorKind::InvalidData, "malformed sidecar"))
            })?;
            let offset = parse_next(&mut parts).ok_or_else(|| {
                RepCacheError::Io(io::Error::new(io::ErrorKind::InvalidData, "malformed sidecar"))
            })?;
            let size = parse_next(&mut parts).ok_or_else(|| {
                RepCacheError::Io(io::Error::new(io::ErrorKind::InvalidData, "malformed sidecar"))
            })?;
            let expanded_size = parse_next(&mut parts).ok_or_else(|| {
                RepCacheError::Io(io::Error::new(io::ErrorKind::InvalidData, "malformed sidecar"))
            })?;
            Ok(Some(RepLocation {
                revision,
                offset: offset as u64,
                size: size as u64,
                expanded_size: expanded_size as u64,
            }))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RepCacheError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn loc(revision: i64) -> RepLocation {
        RepLocation {
            revision,
            offset: 10,
            size: 14,
            expanded_size: 14,
        }
    }

    #[test]
    fn lookup_miss_on_empty_db() {
        let cache = RepCache::open_in_memory().unwrap();
        assert_eq!(cache.lookup("deadbeef").unwrap(), None);
    }

    #[test]
    fn insert_then_lookup() {
        let mut cache = RepCache::open_in_memory().unwrap();
        cache.insert_batch(&[("abc123".into(), loc(5))]).unwrap();
        assert_eq!(cache.lookup("abc123").unwrap(), Some(loc(5)));
    }

    #[test]
    fn insert_or_ignore_keeps_first_writer() {
        let mut cache = RepCache::open_in_memory().unwrap();
        cache.insert_batch(&[("abc123".into(), loc(5))]).unwrap();
        cache.insert_batch(&[("abc123".into(), loc(9))]).unwrap();
        assert_eq!(cache.lookup("abc123").unwrap(), Some(loc(5)));
    }

    #[test]
    fn prune_above_removes_newer_revisions() {
        let mut cache = RepCache::open_in_memory().unwrap();
        cache
            .insert_batch(&[("a".into(), loc(1)), ("b".into(), loc(10))])
            .unwrap();
        let removed = cache.prune_above(5).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.lookup("a").unwrap(), Some(loc(1)));
        assert_eq!(cache.lookup("b").unwrap(), None);
    }

    #[test]
    fn sidecar_roundtrip() {
        let dir = tempdir().unwrap();
        write_sidecar(dir.path(), "abc123", loc(7)).unwrap();
        assert_eq!(read_sidecar(dir.path(), "abc123").unwrap(), Some(loc(7)));
    }

    #[test]
    fn sidecar_missing_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(read_sidecar(dir.path(), "nope").unwrap(), None);
    }
}
