//! The commit pipeline: turning a transaction's mutable scratch state into
//! a new, immutable revision (spec.md §4.9).
//!
//! This is the one place that needs to see every other layer at once: the
//! transaction's scratch files, the storage crate's representation/skel
//! encoders, the lock manager, and the rep-sharing index. Everything below
//! it stays ignorant of "commit" as a concept; this module is where they
//! meet.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use svnfs_core::format::{Format, Layout};
use svnfs_core::ids::{NodeRevisionId, OpaqueId, Origin, TxnId};
use svnfs_core::{Error, RepoPaths, Result};
use svnfs_lock::RepoLocks;
use svnfs_repcache::{RepCache, RepLocation};
use svnfs_storage::deltify::{self, DeltaBaseChoice, DeltifyConfig};
use svnfs_storage::dirent::{self, Directory};
use svnfs_storage::noderev::{Kind, NodeRevision};
use svnfs_storage::proplist;
use svnfs_storage::rep::RepPointer;
use svnfs_storage::repstore::{self, BaseLoc};
use svnfs_transaction::Transaction;

use crate::source::RevisionFileSource;
use crate::{changed_paths, current, source, trailer};

/// The node-id/copy-id every repository's root directory carries for its
/// entire lifetime. The root line is never itself the target of a copy, so
/// unlike every other node it never needs a freshly minted id — only its
/// `origin` ever changes (spec.md §4.8 step 1; `svn_fs_fs__id_txn_create("0",
/// "0", txn_id, ...)` in the original's `commit_body`).
pub fn root_id(txn_id: &TxnId) -> NodeRevisionId {
    NodeRevisionId::new(
        "0".parse().expect("literal id is well-formed"),
        "0".parse().expect("literal id is well-formed"),
        Origin::Txn(txn_id.clone()),
    )
}

/// Everything the pipeline needs to know about the repository besides the
/// transaction itself.
pub struct CommitEnv<'a> {
    /// Path accessors for the repository root.
    pub paths: &'a RepoPaths,
    /// The repository's three locks.
    pub locks: &'a RepoLocks,
    /// The repository's parsed `format` file.
    pub format: Format,
    /// The rep-sharing index, if rep-sharing is enabled for this format and
    /// configuration. `None` disables both lookup and insertion.
    pub rep_cache: Option<&'a Mutex<RepCache>>,
    /// Deltification tuning.
    pub deltify: DeltifyConfig,
    /// `fsfs.conf`'s `[deltification] enable-dir-deltification`.
    pub enable_dir_deltification: bool,
    /// `fsfs.conf`'s `[deltification] enable-props-deltification`.
    pub enable_props_deltification: bool,
    /// Whether to emit the merge-info fields on node-revisions.
    pub emit_merge_info: bool,
}

/// A SHA-1 -> location entry discovered while writing representations this
/// commit, to be inserted into the rep-sharing index once the revision is
/// durable (spec.md §4.9 step 15).
struct PendingShare {
    sha1: String,
    location: RepLocation,
}

/// Accumulates state threaded through the recursive node-revision walk:
/// the proto-revision file handle, the running write offset, every SHA-1
/// this commit newly produced, and the old-id -> new-id mapping needed to
/// rewrite the changed-paths list once every node has a permanent id.
struct WriteCtx<'a> {
    env: &'a CommitEnv<'a>,
    txn: &'a Transaction<'a>,
    new_rev: i64,
    file: std::fs::File,
    offset: u64,
    pending: Vec<PendingShare>,
    seen_this_commit: HashMap<String, RepLocation>,
    id_map: HashMap<NodeRevisionId, NodeRevisionId>,
}

impl<'a> WriteCtx<'a> {
    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let at = self.offset;
        self.file.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(at)
    }

    /// Consult (in order) this commit's own in-flight SHA-1s, then the
    /// persistent rep-sharing index, for an existing representation with
    /// this digest (spec.md §4.7's three lookup tiers).
    ///
    /// An index entry pointing at a revision that isn't durable yet is
    /// corruption (e.g. the index was restored from a newer backup) and
    /// aborts the commit; every other lookup or sanity-readback failure is
    /// warned and rep-sharing is disabled for this write rather than
    /// failing the commit.
    fn find_shared(&self, sha1: &str) -> Result<Option<RepLocation>> {
        if let Some(loc) = self.seen_this_commit.get(sha1) {
            return Ok(Some(*loc));
        }
        let cache = match self.env.rep_cache {
            Some(cache) => cache,
            None => return Ok(None),
        };
        let looked_up = {
            let cache = cache.lock();
            cache.lookup(sha1)
        };
        let loc = match looked_up {
            Ok(Some(loc)) => loc,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(sha1, error = %e, "rep-sharing index lookup failed; disabling sharing for this write");
                return Ok(None);
            }
        };
        if loc.revision >= self.new_rev {
            return Err(Error::Corrupt(format!(
                "rep-sharing index entry for {sha1} points at revision {} which does not yet exist (committing r{})",
                loc.revision, self.new_rev
            )));
        }

        let src = RevisionFileSource::new(self.env.paths, self.env.format.layout);
        match repstore::read_raw_segment(&src, loc.revision, loc.offset, loc.size) {
            Ok(_) => Ok(Some(loc)),
            Err(Error::NoSuchRevision(rev)) => Err(Error::Corrupt(format!(
                "rep-sharing index entry for {sha1} points at revision {rev} which does not yet exist"
            ))),
            Err(e) => {
                warn!(sha1, error = %e, "rep-sharing index entry failed sanity readback; disabling sharing for this write");
                Ok(None)
            }
        }
    }

    fn record_share(&mut self, sha1: String, location: RepLocation) {
        self.seen_this_commit.insert(sha1.clone(), location);
        self.pending.push(PendingShare { sha1, location });
    }
}

/// Write a freshly-encoded hash representation (a directory's entries, or a
/// node's property list), consulting deltification policy and rep-sharing
/// the same way for either (spec.md §4.6, §4.7, §4.9 step 4).
///
/// `predecessor_id` is the immediate (one-step-back) predecessor's id, if
/// any; when the skip-delta policy picks a base more than one step back,
/// this walks that many `predecessor` links through already-committed
/// revision files (spec.md §4.6: "Walk back that many predecessors; the
/// base is that ancestor's `data-rep` (or `prop-rep` if deltifying
/// properties)") and `select_rep` picks the matching field off the
/// ancestor found at the end of the walk.
fn write_hash_rep(
    ctx: &mut WriteCtx<'_>,
    content: &[u8],
    predecessor_count: u64,
    predecessor_id: Option<&NodeRevisionId>,
    select_rep: impl Fn(&NodeRevision) -> Option<RepPointer>,
    deltify_enabled: bool,
) -> Result<RepPointer> {
    let (md5, sha1) = svnfs_storage::checksum::digest_bytes(content);

    if let Some(existing) = ctx.find_shared(&sha1)? {
        return Ok(RepPointer {
            revision: existing.revision,
            offset: existing.offset,
            size: existing.size,
            expanded_size: existing.expanded_size,
            md5,
            sha1: Some(sha1),
            uniquifier: None,
        });
    }

    let choice = if deltify_enabled {
        deltify::choose_base(predecessor_count, &ctx.env.deltify)
    } else {
        DeltaBaseChoice::NoPredecessor
    };

    let base_rep = match (choice, predecessor_id) {
        (DeltaBaseChoice::Base { distance }, Some(pred_id)) => {
            let ancestor = source::walk_predecessors(ctx.env.paths, ctx.env.format.layout, pred_id, distance)?;
            select_rep(&ancestor)
        }
        _ => None,
    };

    let written = match base_rep {
        Some(base) => {
            let src = RevisionFileSource::new(ctx.env.paths, ctx.env.format.layout);
            let base_content = repstore::reconstruct(&src, base.revision, base.offset, base.size)?;
            let base_loc = BaseLoc {
                revision: base.revision,
                offset: base.offset,
                len: base.size,
            };
            repstore::write_delta(&base_content, Some(base_loc), content)
        }
        None => repstore::write_plain(content),
    };

    let offset = ctx.append(&written.bytes)?;
    let loc = RepLocation {
        revision: ctx.new_rev,
        offset,
        size: written.on_disk_len,
        expanded_size: written.expanded_len,
    };
    ctx.record_share(sha1.clone(), loc);

    Ok(RepPointer {
        revision: ctx.new_rev,
        offset,
        size: written.on_disk_len,
        expanded_size: written.expanded_len,
        md5,
        sha1: Some(sha1),
        uniquifier: None,
    })
}

/// Reconstruct a node-revision's directory entries from its committed
/// `data_rep`, or an empty directory if it has none yet.
fn load_committed_dir(env: &CommitEnv<'_>, data_rep: Option<&RepPointer>) -> Result<Directory> {
    match data_rep {
        Some(rep) => {
            let src = RevisionFileSource::new(env.paths, env.format.layout);
            let bytes = repstore::reconstruct(&src, rep.revision, rep.offset, rep.size)?;
            dirent::parse_final(&bytes)
        }
        None => Ok(Directory::new()),
    }
}

fn load_committed_props(env: &CommitEnv<'_>, prop_rep: Option<&RepPointer>) -> Result<proplist::PropList> {
    match prop_rep {
        Some(rep) => {
            let src = RevisionFileSource::new(env.paths, env.format.layout);
            let bytes = repstore::reconstruct(&src, rep.revision, rep.offset, rep.size)?;
            proplist::decode(&bytes)
        }
        None => Ok(proplist::PropList::new()),
    }
}

/// Rewrite a still transaction-scoped id to its permanent committed form.
/// Ids that are already committed (e.g. the root's perpetual `"0"`) pass
/// through unchanged.
fn commit_opaque_id(id: &OpaqueId, newer_format: bool, rev: i64) -> Result<OpaqueId> {
    if id.is_txn_scoped() {
        id.commit(rev, newer_format, 0)
    } else {
        Ok(id.clone())
    }
}

/// Recursively finalize the node-revision at `id`, writing any still-mutable
/// representations to the proto-revision file and rewriting its id to its
/// permanent `r<R>/<offset>` form (spec.md §4.9 step 4).
///
/// Returns the node-revision's new, permanent id. Already-committed node
/// lines (untouched by this transaction) are returned unchanged.
fn finalize_node(ctx: &mut WriteCtx<'_>, id: &NodeRevisionId, at_root: bool) -> Result<NodeRevisionId> {
    if !id.is_txn() {
        // Already committed (untouched by this transaction); nothing to do.
        return Ok(id.clone());
    }

    let mut noderev = ctx.txn.get_node_revision(id)?;
    let newer_format = !ctx.env.format.features().global_id_allocation;

    if noderev.kind == Kind::Dir {
        let base = load_committed_dir(ctx.env, noderev.data_rep.as_ref())?;
        let mut dir = ctx.txn.materialize_dir(&id.node_id, &id.copy_id, &base)?;

        let names: Vec<String> = dir.keys().cloned().collect();
        for name in names {
            let entry = dir.get(&name).expect("just listed").clone();
            if entry.id.is_txn() {
                let new_child_id = finalize_node(ctx, &entry.id, false)?;
                let mut updated = entry;
                updated.id = new_child_id;
                dir.insert(name, updated);
            }
        }

        if dir != base {
            let encoded = dirent::encode_final(&dir);
            let rep = write_hash_rep(
                ctx,
                &encoded,
                noderev.predecessor_count,
                noderev.predecessor.as_ref(),
                |ancestor| ancestor.data_rep.clone(),
                ctx.env.enable_dir_deltification,
            )?;
            noderev.data_rep = Some(rep);
        }
    } else if let Some(data_rep) = noderev.data_rep.as_mut() {
        if data_rep.uniquifier.is_some() {
            let end = data_rep.offset + data_rep.size;
            if end > ctx.offset {
                return Err(Error::Corrupt(
                    "truncated proto-revision file detected".into(),
                ));
            }
            data_rep.revision = ctx.new_rev;
            data_rep.uniquifier = None;
            if let Some(sha1) = data_rep.sha1.clone() {
                let loc = RepLocation {
                    revision: ctx.new_rev,
                    offset: data_rep.offset,
                    size: data_rep.size,
                    expanded_size: data_rep.expanded_size,
                };
                ctx.record_share(sha1, loc);
            }
        }
    }

    if let Some(props) = ctx.txn.node_props(&id.node_id, &id.copy_id)? {
        let base_props = load_committed_props(ctx.env, noderev.prop_rep.as_ref())?;
        if props != base_props {
            let encoded = proplist::encode(&props);
            let rep = write_hash_rep(
                ctx,
                &encoded,
                noderev.predecessor_count,
                noderev.predecessor.as_ref(),
                |ancestor| ancestor.prop_rep.clone(),
                ctx.env.enable_props_deltification,
            )?;
            noderev.prop_rep = Some(rep);
        }
    }

    let node_id = commit_opaque_id(&id.node_id, newer_format, ctx.new_rev)?;
    let copy_id = commit_opaque_id(&id.copy_id, newer_format, ctx.new_rev)?;

    if let Some(data_rep) = noderev.data_rep.as_mut() {
        if noderev.kind == Kind::Dir {
            data_rep.clear_sha1();
        }
    }
    if let Some(prop_rep) = noderev.prop_rep.as_mut() {
        prop_rep.clear_sha1();
    }
    noderev.fresh_txn_root = false;

    let new_id = NodeRevisionId::new(
        node_id,
        copy_id,
        Origin::Rev {
            rev: ctx.new_rev,
            offset: ctx.offset,
        },
    );
    noderev.id = new_id.clone();

    if at_root {
        validate_root_noderev(ctx, &noderev)?;
    }

    let encoded = noderev.encode(ctx.env.emit_merge_info);
    ctx.append(&encoded)?;
    ctx.txn.delete_node_revision(id)?;
    ctx.id_map.insert(id.clone(), new_id.clone());

    Ok(new_id)
}

/// Sanity-check a candidate root node-revision's predecessor-count against
/// `HEAD`'s (spec.md §4.9 step 4, "validate-root-noderev").
fn validate_root_noderev(ctx: &WriteCtx<'_>, root_noderev: &NodeRevision) -> Result<()> {
    let head_rev = ctx.new_rev - 1;
    let head_predecessor_count = if head_rev == 0 {
        0
    } else {
        let layout = ctx.env.format.layout;
        let (root_offset, _) = read_trailer(ctx.env.paths, layout, head_rev)?;
        let head_root = source::read_node_revision_at(ctx.env.paths, layout, head_rev, root_offset)?;
        head_root.predecessor_count
    };

    let expected = head_predecessor_count as i64 + (ctx.new_rev - head_rev);
    if root_noderev.predecessor_count as i64 != expected {
        return Err(Error::Corrupt(format!(
            "predecessor count for the root node-revision is wrong: found ({head_predecessor_count}+{} != {}), committing r{}",
            ctx.new_rev - head_rev,
            root_noderev.predecessor_count,
            ctx.new_rev
        )));
    }
    Ok(())
}

fn read_trailer(paths: &RepoPaths, layout: Layout, rev: i64) -> Result<(u64, u64)> {
    let path = paths.rev_file(layout, rev);
    let bytes = std::fs::read(&path)?;
    trailer::parse(&bytes)
}

/// Rewrite every still transaction-scoped id referenced by the folded
/// change set to the permanent id [`finalize_node`] minted for it (spec.md
/// §4.9 step 5). Every such id must have been visited by the recursive walk
/// from the root, since a path can only have changed if it is reachable
/// from it.
fn rewrite_changed_path_ids(
    folded: &std::collections::BTreeMap<String, svnfs_transaction::FoldedChange>,
    ctx: &WriteCtx<'_>,
) -> Result<std::collections::BTreeMap<String, svnfs_transaction::FoldedChange>> {
    let mut out = std::collections::BTreeMap::new();
    for (path, change) in folded {
        let mut change = change.clone();
        if let Some(id) = &change.id {
            if id.is_txn() {
                change.id = Some(ctx.id_map.get(id).cloned().ok_or_else(|| {
                    Error::Corrupt(format!(
                        "changed path {path:?} references a node never reached from the root"
                    ))
                })?);
            }
        }
        out.insert(path.clone(), change);
    }
    Ok(out)
}

/// Run the full commit pipeline against `txn`, returning the newly
/// committed revision number (spec.md §4.9).
///
/// The whole call runs under the repository's global write lock, the same
/// way the original's `commit_body` runs entirely inside
/// `svn_fs_fs__with_write_lock`. If any step before the proto-revision's
/// move into place fails, the transaction is left intact for the caller to
/// retry or abort.
pub fn commit(env: &CommitEnv<'_>, txn: &Transaction<'_>) -> Result<i64> {
    let _write_guard = env
        .locks
        .lock_write()
        .map_err(|e| Error::FsGeneral(e.to_string()))?;

    // Step 1: freshness check.
    let committed_current = current::read(env.paths)?;
    if txn.base_rev() != committed_current {
        return Err(Error::TxnOutOfDate {
            base: txn.base_rev(),
            current: committed_current,
        });
    }

    // Step 2: lock verification is a no-op under the always-unlocked
    // path-locking policy this rewrite carries (spec.md §1 non-goals).

    // Step 3: allocate R, lock the proto-revision file for the duration of
    // steps 3-11.
    let new_rev = committed_current + 1;
    let _proto_guard = env
        .locks
        .lock_proto_rev(&txn.id().to_string())
        .map_err(|e| Error::RepBeingWritten(e.to_string()))?;

    let proto_path = txn.scratch().proto_rev_path();
    let mut file = OpenOptions::new().read(true).write(true).open(&proto_path)?;
    let initial_offset = file.seek(SeekFrom::End(0))?;

    let mut ctx = WriteCtx {
        env,
        txn,
        new_rev,
        file,
        offset: initial_offset,
        pending: Vec::new(),
        seen_this_commit: HashMap::new(),
        id_map: HashMap::new(),
    };

    // Step 4: write final node-revisions, recursively, from the txn root.
    let root = root_id(txn.id());
    let new_root_id = finalize_node(&mut ctx, &root, true)?;
    let root_offset = match new_root_id.origin {
        Origin::Rev { offset, .. } => offset,
        Origin::Txn(_) => unreachable!("finalize_node always returns a committed origin"),
    };

    // Step 5: write the changed-paths section.
    let folded = txn.folded_changes()?;
    let rewritten = rewrite_changed_path_ids(&folded, &ctx)?;
    let changed_paths_offset = ctx.offset;
    ctx.append(&changed_paths::encode(&rewritten))?;

    // Step 6: write the trailer.
    ctx.append(&trailer::encode(root_offset, changed_paths_offset))?;

    // Step 7: flush to disk; do not release the proto-rev lock yet.
    ctx.file.sync_all()?;
    drop(ctx.file);

    // Step 8: stamp temporary revprops.
    let mut revprops = txn.proplist()?;
    revprops.remove("svn:txn-check-ood");
    revprops.remove("svn:txn-check-locks");
    revprops.insert("svn:date".to_string(), format_commit_date().into_bytes());

    // Steps 9-10: create shard directories for the new revision (if
    // needed) and move the proto-revision and revprops into place.
    // `create_dir_all` below is also what creates the new shard when one
    // is due, so no separate step 9 is needed.
    let rev_file = env.paths.rev_file(env.format.layout, new_rev);
    if let Some(parent) = rev_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&proto_path, &rev_file)?;

    let revprops_file = env.paths.revprops_file(env.format.layout, new_rev);
    if let Some(parent) = revprops_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&revprops_file, proplist::encode(&revprops))?;

    // Step 11: release the per-proto lock by letting `_proto_guard` drop;
    // the file already moved, so nothing else needs it.
    drop(_proto_guard);

    // Step 12: sanity pass (best-effort; never blocks publication).
    if let Err(e) = sanity_pass(env, new_rev, root_offset) {
        debug!(error = %e, rev = new_rev, "commit sanity pass failed");
    }

    // Step 13: bump `current` -- the sole publish barrier.
    current::write(env.paths, new_rev)?;
    info!(rev = new_rev, "committed revision");

    // Step 14: purge transaction scratch state.
    txn.scratch().purge()?;

    // Step 15: insert rep-sharing entries; failures here are logged, not
    // propagated -- the revision is already public.
    if let Some(cache) = env.rep_cache {
        let entries: Vec<(String, RepLocation)> = ctx
            .pending
            .into_iter()
            .map(|p| (p.sha1, p.location))
            .collect();
        if !entries.is_empty() {
            let mut cache = cache.lock();
            if let Err(e) = cache.insert_batch(&entries) {
                debug!(error = %e, "failed to update rep-sharing index after commit");
            }
        }
    }

    Ok(new_rev)
}

fn sanity_pass(env: &CommitEnv<'_>, new_rev: i64, root_offset: u64) -> Result<()> {
    let noderev = source::read_node_revision_at(env.paths, env.format.layout, new_rev, root_offset)?;
    if noderev.kind != Kind::Dir {
        return Err(Error::Corrupt(format!(
            "root node-revision of r{new_rev} is not a directory"
        )));
    }
    Ok(())
}

fn format_commit_date() -> String {
    // The source stamps `svn:date` with the wall-clock commit time; callers
    // embedding this crate in a deterministic test harness may prefer to
    // overwrite it afterward. `SystemTime` avoids this crate depending on
    // `chrono` purely for one RFC 3339 timestamp.
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{secs}")
}
