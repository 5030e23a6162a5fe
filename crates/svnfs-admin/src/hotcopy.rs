//! Live online backup: copy a repository's committed state from `SRC` into
//! a fresh or partially-populated `DST` without taking `SRC` offline
//! (spec.md §4.10).
//!
//! The whole operation runs under `DST`'s global write lock; `SRC` is
//! never locked (readers and writers against it are unaffected). A crash
//! at any point leaves `DST` usable at whatever revision its `current`
//! pointer last named — the format file is stamped last specifically so
//! that a partial copy is still recognizable as "old format, incomplete"
//! rather than silently passing for a finished one.

use std::fs;
use std::path::Path;

use tracing::{debug, info, info_span};

use svnfs_commit::current;
use svnfs_core::format::{Format, Layout};
use svnfs_core::{Error, RepoPaths, Result};
use svnfs_lock::RepoLocks;
use svnfs_repcache::RepCache;

/// Invoked between revisions/shards so a caller can abort a long-running
/// hotcopy; returning `true` stops the copy with the destination left at
/// whatever it last committed to (spec.md §5, cancellation semantics).
pub type CancelFn<'a> = dyn Fn() -> bool + 'a;

fn copy_file_if_exists(src: &Path, dst: &Path) -> Result<bool> {
    match fs::metadata(src) {
        Ok(_) => {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(src, dst)?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

fn read_uuid(paths: &RepoPaths) -> Result<String> {
    Ok(fs::read_to_string(paths.uuid_file())?.trim().to_string())
}

fn read_min_unpacked_rev(paths: &RepoPaths) -> Result<i64> {
    match fs::read_to_string(paths.min_unpacked_rev_file()) {
        Ok(s) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(0)
            } else {
                t.parse()
                    .map_err(|_| Error::Corrupt(format!("malformed min-unpacked-rev {t:?}")))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Copy `src`'s committed state into `dst`, returning the destination's
/// new youngest revision.
///
/// `dst_is_fresh` distinguishes a brand-new destination (no preconditions
/// to check) from an incremental re-copy against a destination that has
/// already been hotcopied from the same source at least once (spec.md
/// §4.10's precondition list applies only to the incremental case).
pub fn hotcopy(
    src: &RepoPaths,
    dst: &RepoPaths,
    dst_locks: &RepoLocks,
    dst_is_fresh: bool,
    cancel: &CancelFn<'_>,
) -> Result<i64> {
    let _span = info_span!("hotcopy", src = %src.root().display(), dst = %dst.root().display())
        .entered();
    let _write_guard = dst_locks
        .lock_write()
        .map_err(|e| Error::FsGeneral(e.to_string()))?;

    // Config file first; a missing config in a legacy hotcopy-of-hotcopy
    // source is user-actionable, not something we silently paper over.
    if !copy_file_if_exists(&src.config_file(), &dst.config_file())? {
        return Err(Error::FsGeneral(format!(
            "source repository at {} has no configuration file to copy",
            src.root().display()
        )));
    }

    let src_format_text = match fs::read_to_string(src.format_file()) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "1\n".to_string(),
        Err(e) => return Err(e.into()),
    };
    let src_format = Format::parse(&src.format_file(), &src_format_text)?;
    let src_uuid = read_uuid(src)?;
    let src_youngest = current::read(src)?;
    let src_min_unpacked = read_min_unpacked_rev(src)?;

    if !dst_is_fresh {
        let dst_format_text = fs::read_to_string(dst.format_file())?;
        let dst_format = Format::parse(&dst.format_file(), &dst_format_text)?;
        if dst_format.number != src_format.number {
            return Err(Error::UnsupportedFeature(format!(
                "format mismatch: source {} vs destination {}",
                src_format.number, dst_format.number
            )));
        }
        if dst_format.layout != src_format.layout {
            return Err(Error::UnsupportedFeature(
                "shard layout mismatch between source and destination".into(),
            ));
        }
        let dst_uuid = read_uuid(dst)?;
        if dst_uuid != src_uuid {
            return Err(Error::UuidMismatch {
                source_uuid: src_uuid.clone(),
                dest_uuid: dst_uuid,
            });
        }
        let dst_youngest = current::read(dst)?;
        if src_youngest < dst_youngest {
            return Err(Error::UnsupportedFeature(format!(
                "source youngest revision {src_youngest} is behind destination's {dst_youngest}"
            )));
        }
        let dst_min_unpacked = read_min_unpacked_rev(dst)?;
        if src_min_unpacked < dst_min_unpacked {
            return Err(Error::UnsupportedFeature(
                "source has fewer packed revisions than destination (destination was packed independently)".into(),
            ));
        }
    } else {
        fs::write(dst.uuid_file(), format!("{src_uuid}\n"))?;
    }

    fs::create_dir_all(dst.revs_dir())?;
    fs::create_dir_all(dst.revprops_dir())?;

    // Packed shards: copy whole shard directories the destination lacks.
    if let Layout::Sharded {
        max_files_per_shard,
    } = src_format.layout
    {
        let packed_through = src_min_unpacked;
        let mut shard = 0i64;
        while shard * (max_files_per_shard as i64) < packed_through {
            if cancel() {
                return Ok(current::read(dst)?);
            }
            let src_pack = src
                .revs_dir()
                .join(format!("{shard}.pack"));
            let dst_pack = dst.revs_dir().join(format!("{shard}.pack"));
            if src_pack.is_dir() && !dst_pack.is_dir() {
                copy_dir_recursive(&src_pack, &dst_pack)?;
                let src_revprops_pack = src
                    .revprops_dir()
                    .join(format!("{shard}.pack"));
                let dst_revprops_pack = dst.revprops_dir().join(format!("{shard}.pack"));
                copy_dir_recursive(&src_revprops_pack, &dst_revprops_pack)?;

                let last_in_shard = (shard + 1) * (max_files_per_shard as i64) - 1;
                current::write(dst, last_in_shard.min(src_youngest))?;
                for rev in shard * (max_files_per_shard as i64)..=last_in_shard.min(src_youngest) {
                    let _ = fs::remove_file(dst.rev_file(src_format.layout, rev));
                }
                fs::write(
                    dst.min_unpacked_rev_file(),
                    format!("{}\n", last_in_shard + 1),
                )?;
                debug!(shard, "copied packed shard");
            }
            shard += 1;
        }
    }

    // Remaining unpacked revisions, one at a time. `current::read` returns
    // 0 for a brand-new destination, so this naturally starts at r1 -- r0
    // is the implicit empty root and has no on-disk revision file.
    let mut rev = current::read(dst)? + 1;
    while rev <= src_youngest {
        if cancel() {
            return Ok(current::read(dst)?);
        }
        let src_rev_file = src.rev_file(src_format.layout, rev);
        let src_revprops_file = src.revprops_file(src_format.layout, rev);
        if !src_rev_file.is_file() {
            // The source's shard became packed underneath us mid-copy;
            // nothing more we can resume from at this revision.
            return Err(Error::FsGeneral(format!(
                "source revision file for r{rev} disappeared during hotcopy (packed concurrently)"
            )));
        }
        copy_file_if_exists(&src_rev_file, &dst.rev_file(src_format.layout, rev))?;
        copy_file_if_exists(&src_revprops_file, &dst.revprops_file(src_format.layout, rev))?;
        current::write(dst, rev)?;
        rev += 1;
    }

    // Lock tree: readers listing locks during the brief window this
    // replace happens may observe a transient, accepted race.
    let src_locks_dir = src.root().join("locks");
    if src_locks_dir.is_dir() {
        let dst_locks_dir = dst.root().join("locks");
        let _ = fs::remove_dir_all(&dst_locks_dir);
        copy_dir_recursive(&src_locks_dir, &dst_locks_dir)?;
    }

    copy_dir_recursive(&src.node_origins_dir(), &dst.node_origins_dir())?;

    if src.rep_cache_db().is_file() {
        fs::copy(src.rep_cache_db(), dst.rep_cache_db())?;
        let final_youngest = current::read(dst)?;
        if let Ok(mut cache) = RepCache::open(&dst.rep_cache_db()) {
            match cache.prune_above(final_youngest) {
                Ok(removed) if removed > 0 => {
                    debug!(removed, "pruned rep-cache entries beyond destination's youngest revision")
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "failed to prune rep-cache after hotcopy"),
            }
        }
    }

    if src_format.features().has_txn_current_file {
        copy_file_if_exists(&src.txn_current_file(), &dst.txn_current_file())?;
    }

    // Format file stamped last: a crash before this point leaves the
    // destination recognizable as an older, incomplete copy that a retry
    // can resume.
    fs::write(dst.format_file(), src_format.render())?;

    let final_rev = current::read(dst)?;
    info!(rev = final_rev, "hotcopy complete");
    Ok(final_rev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svnfs_core::format::{Format, Layout};
    use svnfs_core::RepoPaths;
    use svnfs_lock::RepoLocks;
    use tempfile::tempdir;

    fn make_repo(root: &std::path::Path, format: i32) -> RepoPaths {
        let paths = RepoPaths::from_root(root);
        fs::create_dir_all(paths.revs_dir()).unwrap();
        fs::create_dir_all(paths.revprops_dir()).unwrap();
        fs::write(
            paths.format_file(),
            Format {
                number: format,
                layout: Layout::Linear,
            }
            .render(),
        )
        .unwrap();
        fs::write(paths.uuid_file(), "11111111-1111-1111-1111-111111111111\n").unwrap();
        fs::write(paths.config_file(), "[rep-sharing]\nenable-rep-sharing = true\n").unwrap();
        paths
    }

    fn commit_fake_revision(paths: &RepoPaths, rev: i64, layout: Layout) {
        fs::write(paths.rev_file(layout, rev), format!("fake revision {rev} body\n")).unwrap();
        fs::write(paths.revprops_file(layout, rev), b"( ) END\n").unwrap();
        current::write(paths, rev).unwrap();
    }

    fn no_cancel() -> bool {
        false
    }

    #[test]
    fn fresh_hotcopy_copies_every_revision() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = make_repo(src_dir.path(), 7);
        for r in 1..=3 {
            commit_fake_revision(&src, r, Layout::Linear);
        }

        let dst = RepoPaths::from_root(dst_dir.path());
        fs::create_dir_all(dst.revs_dir()).unwrap();
        fs::create_dir_all(dst.revprops_dir()).unwrap();
        let dst_locks = RepoLocks::open(
            dst.write_lock_file(),
            dst.txn_current_lock_file(),
            dst.txn_protorevs_dir(),
        )
        .unwrap();

        let youngest = hotcopy(&src, &dst, &dst_locks, true, &no_cancel).unwrap();
        assert_eq!(youngest, 3);
        assert_eq!(current::read(&dst).unwrap(), 3);
        for r in 1..=3 {
            assert_eq!(
                fs::read(dst.rev_file(Layout::Linear, r)).unwrap(),
                fs::read(src.rev_file(Layout::Linear, r)).unwrap()
            );
        }
        assert_eq!(read_uuid(&dst).unwrap(), read_uuid(&src).unwrap());
    }

    #[test]
    fn incremental_hotcopy_only_copies_new_revisions() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = make_repo(src_dir.path(), 7);
        commit_fake_revision(&src, 1, Layout::Linear);

        let dst = RepoPaths::from_root(dst_dir.path());
        fs::create_dir_all(dst.revs_dir()).unwrap();
        fs::create_dir_all(dst.revprops_dir()).unwrap();
        let dst_locks = RepoLocks::open(
            dst.write_lock_file(),
            dst.txn_current_lock_file(),
            dst.txn_protorevs_dir(),
        )
        .unwrap();
        hotcopy(&src, &dst, &dst_locks, true, &no_cancel).unwrap();

        commit_fake_revision(&src, 2, Layout::Linear);
        commit_fake_revision(&src, 3, Layout::Linear);
        let youngest = hotcopy(&src, &dst, &dst_locks, false, &no_cancel).unwrap();
        assert_eq!(youngest, 3);
    }

    #[test]
    fn incremental_hotcopy_rejects_uuid_mismatch() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = make_repo(src_dir.path(), 7);
        commit_fake_revision(&src, 1, Layout::Linear);

        let dst = make_repo(dst_dir.path(), 7);
        fs::write(dst.uuid_file(), "22222222-2222-2222-2222-222222222222\n").unwrap();
        current::write(&dst, 0).unwrap();
        let dst_locks = RepoLocks::open(
            dst.write_lock_file(),
            dst.txn_current_lock_file(),
            dst.txn_protorevs_dir(),
        )
        .unwrap();

        let err = hotcopy(&src, &dst, &dst_locks, false, &no_cancel).unwrap_err();
        assert!(matches!(err, Error::UuidMismatch { .. }));
    }

    #[test]
    fn cancellation_stops_mid_copy() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = make_repo(src_dir.path(), 7);
        for r in 1..=5 {
            commit_fake_revision(&src, r, Layout::Linear);
        }

        let dst = RepoPaths::from_root(dst_dir.path());
        fs::create_dir_all(dst.revs_dir()).unwrap();
        fs::create_dir_all(dst.revprops_dir()).unwrap();
        let dst_locks = RepoLocks::open(
            dst.write_lock_file(),
            dst.txn_current_lock_file(),
            dst.txn_protorevs_dir(),
        )
        .unwrap();

        let seen = std::cell::Cell::new(0);
        let cancel = || {
            seen.set(seen.get() + 1);
            seen.get() > 2
        };
        let youngest = hotcopy(&src, &dst, &dst_locks, true, &cancel).unwrap();
        assert!(youngest < 5);
        assert!(youngest >= 1);
    }
}
