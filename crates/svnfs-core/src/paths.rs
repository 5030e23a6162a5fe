//! Deterministic on-disk path derivation from the repository root.
//!
//! Mirrors the on-disk layout in spec.md §6:
//!
//! ```text
//! format
//! uuid
//! current
//! fsfs.conf
//! min-unpacked-rev
//! txn-current
//! txn-current-lock
//! lock
//! rep-cache.db
//! revs/[<shard>/]<rev>
//! revs/<shard>.pack/
//! revprops/[<shard>/]<rev>
//! transactions/<txn>.txn/
//! txn-protorevs/<txn>.rev
//! txn-protorevs/<txn>.rev-lock
//! node-origins/<id-prefix>
//! ```

use crate::format::Layout;
use crate::ids::TxnId;
use std::path::{Path, PathBuf};

/// Path accessors for a single repository root.
#[derive(Debug, Clone)]
pub struct RepoPaths {
    root: PathBuf,
}

impl RepoPaths {
    /// Build path accessors rooted at `root`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        RepoPaths {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `format` file.
    pub fn format_file(&self) -> PathBuf {
        self.root.join("format")
    }

    /// The `uuid` file.
    pub fn uuid_file(&self) -> PathBuf {
        self.root.join("uuid")
    }

    /// The `current` pointer file.
    pub fn current_file(&self) -> PathBuf {
        self.root.join("current")
    }

    /// The `fsfs.conf` configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("fsfs.conf")
    }

    /// The `min-unpacked-rev` file (packed formats only).
    pub fn min_unpacked_rev_file(&self) -> PathBuf {
        self.root.join("min-unpacked-rev")
    }

    /// The transaction-id allocator counter file.
    pub fn txn_current_file(&self) -> PathBuf {
        self.root.join("txn-current")
    }

    /// The lock file guarding `txn-current`.
    pub fn txn_current_lock_file(&self) -> PathBuf {
        self.root.join("txn-current-lock")
    }

    /// The global write lock file.
    pub fn write_lock_file(&self) -> PathBuf {
        self.root.join("lock")
    }

    /// The rep-sharing index database.
    pub fn rep_cache_db(&self) -> PathBuf {
        self.root.join("rep-cache.db")
    }

    /// The node-origins cache directory.
    pub fn node_origins_dir(&self) -> PathBuf {
        self.root.join("node-origins")
    }

    /// The dedicated proto-revisions directory (newer formats).
    pub fn txn_protorevs_dir(&self) -> PathBuf {
        self.root.join("txn-protorevs")
    }

    /// The `revs/` directory root.
    pub fn revs_dir(&self) -> PathBuf {
        self.root.join("revs")
    }

    /// The `revprops/` directory root.
    pub fn revprops_dir(&self) -> PathBuf {
        self.root.join("revprops")
    }

    /// The `transactions/` directory root.
    pub fn transactions_dir(&self) -> PathBuf {
        self.root.join("transactions")
    }

    /// Directory that would hold revision `rev`'s file, honoring sharding.
    fn sharded_dir(base: &Path, layout: Layout, rev: i64) -> PathBuf {
        match layout.shard_of(rev) {
            Some(shard) => base.join(shard.to_string()),
            None => base.to_path_buf(),
        }
    }

    /// The on-disk file for revision `rev`, honoring the configured layout.
    pub fn rev_file(&self, layout: Layout, rev: i64) -> PathBuf {
        Self::sharded_dir(&self.revs_dir(), layout, rev).join(rev.to_string())
    }

    /// The on-disk file for revision `rev`'s properties.
    pub fn revprops_file(&self, layout: Layout, rev: i64) -> PathBuf {
        Self::sharded_dir(&self.revprops_dir(), layout, rev).join(rev.to_string())
    }

    /// The packed-shard directory containing `rev`, if sharding is active.
    pub fn pack_shard_dir(&self, layout: Layout, rev: i64) -> Option<PathBuf> {
        layout
            .shard_of(rev)
            .map(|shard| self.revs_dir().join(format!("{shard}.pack")))
    }

    /// A transaction's scratch directory.
    pub fn txn_dir(&self, txn: &TxnId) -> PathBuf {
        self.transactions_dir().join(format!("{txn}.txn"))
    }

    /// The proto-revision file for `txn`, honoring the format's dedicated
    /// proto-revs directory feature gate.
    pub fn proto_rev_file(&self, txn: &TxnId, dedicated_dir: bool) -> PathBuf {
        if dedicated_dir {
            self.txn_protorevs_dir().join(format!("{txn}.rev"))
        } else {
            self.txn_dir(txn).join("rev")
        }
    }

    /// The proto-revision lock file for `txn`.
    pub fn proto_rev_lock_file(&self, txn: &TxnId, dedicated_dir: bool) -> PathBuf {
        if dedicated_dir {
            self.txn_protorevs_dir().join(format!("{txn}.rev-lock"))
        } else {
            self.txn_dir(txn).join("rev-lock")
        }
    }

    /// Node-origins cache file for a given node-id prefix.
    pub fn node_origin_file(&self, id_prefix: &str) -> PathBuf {
        self.node_origins_dir().join(id_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_paths() {
        let p = RepoPaths::from_root("/repo");
        assert_eq!(p.format_file(), PathBuf::from("/repo/format"));
        assert_eq!(p.current_file(), PathBuf::from("/repo/current"));
        assert_eq!(p.rep_cache_db(), PathBuf::from("/repo/rep-cache.db"));
    }

    #[test]
    fn linear_rev_file() {
        let p = RepoPaths::from_root("/repo");
        assert_eq!(
            p.rev_file(Layout::Linear, 42),
            PathBuf::from("/repo/revs/42")
        );
    }

    #[test]
    fn sharded_rev_file() {
        let p = RepoPaths::from_root("/repo");
        let layout = Layout::Sharded {
            max_files_per_shard: 1000,
        };
        assert_eq!(
            p.rev_file(layout, 1234),
            PathBuf::from("/repo/revs/1/1234")
        );
        assert_eq!(
            p.revprops_file(layout, 1234),
            PathBuf::from("/repo/revprops/1/1234")
        );
    }

    #[test]
    fn txn_paths() {
        let p = RepoPaths::from_root("/repo");
        let txn = TxnId::new(5, 2);
        assert_eq!(
            p.txn_dir(&txn),
            PathBuf::from("/repo/transactions/5-2.txn")
        );
        assert_eq!(
            p.proto_rev_file(&txn, true),
            PathBuf::from("/repo/txn-protorevs/5-2.rev")
        );
        assert_eq!(
            p.proto_rev_file(&txn, false),
            PathBuf::from("/repo/transactions/5-2.txn/rev")
        );
    }
}
