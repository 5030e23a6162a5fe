//! Lock manager: the global write lock, the transaction-id allocator lock,
//! and per-proto-revision locks.
//!
//! Three distinct locks (spec.md §4.2), each pairing an in-process
//! `parking_lot::Mutex` (so a threaded process doesn't race itself) with an
//! OS file lock via `fd-lock` (so separate processes are serialized too).
//! The in-process mutex is always acquired first, then the file lock —
//! fixed ordering prevents deadlock between the two layers.
//!
//! Every lock is released through an RAII guard so every exit path —
//! success, early return, or panic unwind — releases it. This is the
//! idiomatic-Rust equivalent of the source's pool-cleanup-callback
//! discipline (spec.md §9, Scoped resources).

#![warn(missing_docs)]
#![warn(clippy::all)]

use fd_lock::{RwLock as FileRwLock, RwLockWriteGuard as FileWriteGuard};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by the lock manager.
#[derive(Debug, Error)]
pub enum LockError {
    /// Underlying I/O error opening or locking a file.
    #[error("lock I/O error: {0}")]
    Io(#[from] io::Error),

    /// A second writer (process or thread) is already writing the same
    /// transaction's proto-revision file.
    #[error("representation is already being written for transaction {0}")]
    RepBeingWritten(String),
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).write(true).open(path)
}

/// A single file-backed lock plus an in-process mutex guarding the critical
/// section around it.
struct GuardedFileLock {
    mutex: Mutex<()>,
    file_lock: FileRwLock<File>,
}

impl GuardedFileLock {
    fn open(path: &Path) -> Result<Self, LockError> {
        let file = open_lock_file(path)?;
        Ok(GuardedFileLock {
            mutex: Mutex::new(()),
            file_lock: FileRwLock::new(file),
        })
    }
}

/// RAII guard for the global write lock. Held for the duration of commit,
/// upgrade, hotcopy-destination mutation, or a UUID change. Clears the
/// `has_write_lock` flag on drop.
pub struct WriteLockGuard<'a> {
    _mutex_guard: MutexGuard<'a, ()>,
    _file_guard: FileWriteGuard<'a, File>,
    has_write_lock: &'a AtomicBool,
}

impl<'a> Drop for WriteLockGuard<'a> {
    fn drop(&mut self) {
        self.has_write_lock.store(false, Ordering::SeqCst);
        trace!("released global write lock");
    }
}

/// RAII guard for the transaction-id allocator lock.
pub struct TxnAllocLockGuard<'a> {
    _mutex_guard: MutexGuard<'a, ()>,
    _file_guard: FileWriteGuard<'a, File>,
}

/// RAII guard for a single transaction's proto-revision lock. Dropping it
/// clears the in-process "being written" flag as well as releasing the file
/// lock, so both layers always agree once the critical section ends.
///
/// The guard owns a clone of the `Arc<GuardedFileLock>` it locked, so the
/// locked `File` is guaranteed to outlive the write guard borrowed from it.
/// Field order matters: `_file_guard` must drop before `_lock` so the
/// borrow is released before its owner.
pub struct ProtoRevLockGuard<'a> {
    _file_guard: FileWriteGuard<'static, File>,
    _lock: Arc<GuardedFileLock>,
    being_written: &'a Mutex<HashSet<String>>,
    txn_key: String,
}

impl<'a> Drop for ProtoRevLockGuard<'a> {
    fn drop(&mut self) {
        self.being_written.lock().remove(&self.txn_key);
        trace!(txn = %self.txn_key, "released proto-revision lock");
    }
}

/// The three locks of a single open repository handle.
///
/// Holds instance state (not process-global): the shared "being written"
/// set and the `has_write_lock` flag live on this struct, matching
/// spec.md §9's guidance that such state belongs to the filesystem object.
pub struct RepoLocks {
    write_lock: GuardedFileLock,
    has_write_lock: AtomicBool,
    txn_alloc_lock: GuardedFileLock,
    proto_rev_locks: Mutex<std::collections::HashMap<String, Arc<GuardedFileLock>>>,
    being_written: Mutex<HashSet<String>>,
    proto_revs_dir: PathBuf,
}

impl RepoLocks {
    /// Open (creating if necessary) the lock files for a repository rooted
    /// at the paths implied by `write_lock_path` / `txn_alloc_lock_path`.
    pub fn open(
        write_lock_path: impl AsRef<Path>,
        txn_alloc_lock_path: impl AsRef<Path>,
        proto_rev_lock_dir: impl AsRef<Path>,
    ) -> Result<Self, LockError> {
        Ok(RepoLocks {
            write_lock: GuardedFileLock::open(write_lock_path.as_ref())?,
            has_write_lock: AtomicBool::new(false),
            txn_alloc_lock: GuardedFileLock::open(txn_alloc_lock_path.as_ref())?,
            proto_rev_locks: Mutex::new(std::collections::HashMap::new()),
            being_written: Mutex::new(HashSet::new()),
            proto_revs_dir: proto_rev_lock_dir.as_ref().to_path_buf(),
        })
    }

    /// True while this handle currently holds the global write lock.
    pub fn has_write_lock(&self) -> bool {
        self.has_write_lock.load(Ordering::SeqCst)
    }

    /// Acquire the global write lock, blocking until available.
    pub fn lock_write(&self) -> Result<WriteLockGuard<'_>, LockError> {
        let mutex_guard = self.write_lock.mutex.lock();
        let file_guard = self.write_lock.file_lock.write()?;
        self.has_write_lock.store(true, Ordering::SeqCst);
        debug!("acquired global write lock");
        Ok(WriteLockGuard {
            _mutex_guard: mutex_guard,
            _file_guard: file_guard,
            has_write_lock: &self.has_write_lock,
        })
    }

    /// Acquire the transaction-id allocator lock, blocking until available.
    pub fn lock_txn_alloc(&self) -> Result<TxnAllocLockGuard<'_>, LockError> {
        let mutex_guard = self.txn_alloc_lock.mutex.lock();
        let file_guard = self.txn_alloc_lock.file_lock.write()?;
        Ok(TxnAllocLockGuard {
            _mutex_guard: mutex_guard,
            _file_guard: file_guard,
        })
    }

    /// Acquire the proto-revision lock for `txn_key` (the transaction-id's
    /// string form). Fails immediately with [`LockError::RepBeingWritten`]
    /// if another thread in this process, or another process, already holds
    /// it — it never blocks.
    pub fn lock_proto_rev(&self, txn_key: &str) -> Result<ProtoRevLockGuard<'_>, LockError> {
        {
            let mut being_written = self.being_written.lock();
            if !being_written.insert(txn_key.to_string()) {
                return Err(LockError::RepBeingWritten(txn_key.to_string()));
            }
        }

        let lock: Arc<GuardedFileLock> = {
            let mut locks = self.proto_rev_locks.lock();
            match locks.entry(txn_key.to_string()) {
                std::collections::hash_map::Entry::Occupied(e) => e.get().clone(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    let path = self.proto_revs_dir.join(format!("{txn_key}.rev-lock"));
                    let opened = Arc::new(GuardedFileLock::open(&path)?);
                    e.insert(opened.clone());
                    opened
                }
            }
        };

        // SAFETY: `file_guard` borrows `lock.file_lock`. We keep `lock`
        // (the `Arc` that owns it) alive for at least as long inside the
        // same guard struct, and `_file_guard` is declared before `_lock`
        // so it drops first — the borrow never outlives its referent.
        let file_lock_ref: &'static FileRwLock<File> =
            unsafe { &*(&lock.file_lock as *const FileRwLock<File>) };
        match file_lock_ref.try_write() {
            Ok(file_guard) => {
                debug!(txn = %txn_key, "acquired proto-revision lock");
                Ok(ProtoRevLockGuard {
                    _file_guard: file_guard,
                    _lock: lock,
                    being_written: &self.being_written,
                    txn_key: txn_key.to_string(),
                })
            }
            Err(_) => {
                self.being_written.lock().remove(txn_key);
                Err(LockError::RepBeingWritten(txn_key.to_string()))
            }
        }
    }
}
