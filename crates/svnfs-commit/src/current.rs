//! The `current` pointer file: the single atomic publish barrier that makes
//! a freshly-written revision visible to readers (spec.md §4.1, §4.9 step
//! 13).
//!
//! Bumping it is the only step in the whole commit pipeline that changes
//! what a concurrent reader sees — everything before it (writing the
//! revision file, stamping revprops, the rename into `revs/`) is invisible
//! until this file says so.

use std::fs::{self, OpenOptions};
use std::io::Write;
use svnfs_core::{Error, RepoPaths, Result};

/// Read the repository's current youngest revision. A missing or empty
/// `current` file means a brand-new, empty repository (revision 0).
pub fn read(paths: &RepoPaths) -> Result<i64> {
    match fs::read_to_string(paths.current_file()) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed
                .parse()
                .map_err(|_| Error::Corrupt(format!("malformed current file {trimmed:?}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Atomically bump `current` to `rev`: write to a sibling temp file, fsync,
/// then rename over the real file. The rename is what makes this the sole
/// publish barrier — readers either see the old value or the new one,
/// never a half-written one.
pub fn write(paths: &RepoPaths, rev: i64) -> Result<()> {
    let tmp = paths.current_file().with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(format!("{rev}\n").as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, paths.current_file())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_zero() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        assert_eq!(read(&paths).unwrap(), 0);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let root = tempdir().unwrap();
        let paths = RepoPaths::from_root(root.path());
        write(&paths, 7).unwrap();
        assert_eq!(read(&paths).unwrap(), 7);
        write(&paths, 8).unwrap();
        assert_eq!(read(&paths).unwrap(), 8);
    }
}
