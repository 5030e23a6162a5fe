//! Building a transaction's mutable tree by path (spec.md §3's node-revision
//! lifecycle: "A node-revision is born during `create_node` or
//! `create_successor` inside a transaction").
//!
//! The transaction layer's own primitives (`set_entry`, `set_contents`,
//! `set_proplist`, `add_change`) work against already-mutable node-ids
//! (spec.md §4.8). This module is the missing piece between them and a
//! caller who only has a path: walking down from the transaction root,
//! cloning each ancestor directory into the transaction the first time it
//! is touched (the same "make this node mutable" step [`crate::fs::Fs::begin_transaction`]
//! performs once, at the root, for every transaction), and rewriting each
//! parent's directory entry to point at its child's freshly-cloned id —
//! mirroring the original's `open_path`/`make_path_mutable` recursion.

use svnfs_commit::{root_id, source};
use svnfs_core::ids::{NodeRevisionId, Origin, OpaqueId};
use svnfs_core::format::Layout;
use svnfs_core::{Error, RepoPaths, Result};
use svnfs_storage::deltify::{self, DeltaBaseChoice, DeltifyConfig};
use svnfs_storage::dirent::DirEntry;
use svnfs_storage::noderev::{Kind, NodeRevision, RevPath};
use svnfs_storage::repstore::{self, BaseLoc};
use svnfs_transaction::Transaction;

use crate::tree;

fn no_copy_id() -> OpaqueId {
    "0".parse().expect("literal id is well-formed")
}

/// Clone `id` into the transaction if it is not already transaction-located,
/// incrementing its predecessor-count and clearing `copyfrom` (spec.md §3,
/// "a node-revision is born ... inside a transaction"; the same treatment
/// [`crate::fs::Fs::begin_transaction`] gives the root). Returns the
/// (possibly unchanged) mutable id.
fn clone_mutable(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    id: &NodeRevisionId,
) -> Result<NodeRevisionId> {
    if id.is_txn() {
        return Ok(id.clone());
    }
    let committed = tree::read_committed(paths, layout, id)?;
    let new_id = NodeRevisionId::new(
        id.node_id.clone(),
        id.copy_id.clone(),
        Origin::Txn(txn.id().clone()),
    );
    let cloned = NodeRevision {
        id: new_id.clone(),
        kind: committed.kind,
        predecessor_count: committed.predecessor_count + 1,
        predecessor: Some(committed.id.clone()),
        copyroot: committed.copyroot.clone(),
        copyfrom: None,
        created_path: committed.created_path.clone(),
        data_rep: committed.data_rep.clone(),
        prop_rep: committed.prop_rep.clone(),
        merge_info: committed.merge_info,
        fresh_txn_root: false,
    };
    txn.put_node_revision(&cloned, false)?;
    Ok(new_id)
}

/// Walk `path`'s ancestor directories down from the transaction root,
/// cloning each one into the transaction the first time it is touched and
/// rewriting the parent's entry to the freshly-cloned child id. Returns
/// the mutable id of the directory that directly contains `path`'s last
/// component, and that last component's name.
fn open_parent_mutable<'p>(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    path: &'p str,
) -> Result<(NodeRevisionId, &'p str)> {
    let comps = tree::components(path);
    let (name, parents) = comps
        .split_last()
        .ok_or_else(|| Error::FsGeneral("cannot edit the repository root itself".into()))?;

    let mut current = root_id(txn.id());
    let mut walked = String::from("/");
    for comp in parents {
        let noderev = txn.get_node_revision(&current)?;
        if noderev.kind != Kind::Dir {
            return Err(Error::NotDirectory(walked));
        }
        let base_dir = tree::load_dir(paths, layout, noderev.data_rep.as_ref())?;
        let dir = txn.materialize_dir(&current.node_id, &current.copy_id, &base_dir)?;
        let entry = dir
            .get(*comp)
            .ok_or_else(|| Error::UnversionedResource(path.to_string()))?;
        let child_mutable = clone_mutable(paths, layout, txn, &entry.id)?;
        if child_mutable != entry.id {
            txn.set_dir_entry(
                &current.node_id,
                &current.copy_id,
                comp,
                DirEntry {
                    kind: entry.kind,
                    id: child_mutable.clone(),
                },
            )?;
        }
        current = child_mutable;
        if walked != "/" {
            walked.push('/');
        }
        walked.push_str(comp);
    }
    Ok((current, *name))
}

/// Look up an existing entry in an already-mutable directory, if any.
fn existing_entry(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    dir_id: &NodeRevisionId,
    name: &str,
) -> Result<Option<DirEntry>> {
    let noderev = txn.get_node_revision(dir_id)?;
    let base_dir = tree::load_dir(paths, layout, noderev.data_rep.as_ref())?;
    let dir = txn.materialize_dir(&dir_id.node_id, &dir_id.copy_id, &base_dir)?;
    Ok(dir.get(name).cloned())
}

fn record_add(
    txn: &Transaction<'_>,
    path: &str,
    id: &NodeRevisionId,
    node_kind: Kind,
) -> Result<()> {
    txn.add_change(&svnfs_transaction::ChangeRecord {
        path: path.to_string(),
        change: svnfs_transaction::RawChange::Add {
            id: id.clone(),
            node_kind,
            copyfrom: None,
        },
    })
}

/// Create a brand-new file at `path` with `contents`. The parent directory
/// must already exist (directly or transitively) somewhere visible from
/// the transaction's base revision or an earlier edit in this same
/// transaction.
pub fn make_file(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    path: &str,
    contents: &[u8],
) -> Result<NodeRevisionId> {
    let (parent, name) = open_parent_mutable(paths, layout, txn, path)?;
    if existing_entry(paths, layout, txn, &parent, name)?.is_some() {
        return Err(Error::Corrupt(format!(
            "path {path:?} already exists in this transaction"
        )));
    }

    let node_id = txn.alloc_node_id()?;
    let new_id = NodeRevisionId::new(node_id, no_copy_id(), Origin::Txn(txn.id().clone()));
    let suffix = txn.alloc_content_suffix();
    let rep = txn.write_plain_contents(contents, suffix)?;

    let noderev = NodeRevision {
        id: new_id.clone(),
        kind: Kind::File,
        predecessor_count: 0,
        predecessor: None,
        copyroot: RevPath {
            revision: txn.base_rev(),
            path: path.to_string(),
        },
        copyfrom: None,
        created_path: path.to_string(),
        data_rep: Some(rep),
        prop_rep: None,
        merge_info: None,
        fresh_txn_root: false,
    };
    txn.put_node_revision(&noderev, false)?;
    txn.set_dir_entry(
        &parent.node_id,
        &parent.copy_id,
        name,
        DirEntry {
            kind: Kind::File,
            id: new_id.clone(),
        },
    )?;
    record_add(txn, path, &new_id, Kind::File)?;
    Ok(new_id)
}

/// Create a brand-new, empty directory at `path`.
pub fn make_dir(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    path: &str,
) -> Result<NodeRevisionId> {
    let (parent, name) = open_parent_mutable(paths, layout, txn, path)?;
    if existing_entry(paths, layout, txn, &parent, name)?.is_some() {
        return Err(Error::Corrupt(format!(
            "path {path:?} already exists in this transaction"
        )));
    }

    let node_id = txn.alloc_node_id()?;
    let new_id = NodeRevisionId::new(node_id, no_copy_id(), Origin::Txn(txn.id().clone()));
    let noderev = NodeRevision {
        id: new_id.clone(),
        kind: Kind::Dir,
        predecessor_count: 0,
        predecessor: None,
        copyroot: RevPath {
            revision: txn.base_rev(),
            path: path.to_string(),
        },
        copyfrom: None,
        created_path: path.to_string(),
        data_rep: None,
        prop_rep: None,
        merge_info: None,
        fresh_txn_root: false,
    };
    txn.put_node_revision(&noderev, false)?;
    txn.set_dir_entry(
        &parent.node_id,
        &parent.copy_id,
        name,
        DirEntry {
            kind: Kind::Dir,
            id: new_id.clone(),
        },
    )?;
    record_add(txn, path, &new_id, Kind::Dir)?;
    Ok(new_id)
}

/// Overwrite an existing file's contents, advancing its predecessor chain
/// by one (spec.md §3, `create_successor`).
///
/// The new representation's delta base is chosen by the same policy as
/// directory and property representations in the commit pipeline
/// (spec.md §4.6): `deltify` is consulted against the node's (already
/// incremented) predecessor count, and whenever it comes back
/// [`DeltaBaseChoice::Base`] the chosen ancestor's already-committed
/// representation is found by walking that many `predecessor` links back
/// ([`source::walk_predecessors`]), reconstructed, and used as the delta
/// base. A missing predecessor representation falls back to a plain one.
pub fn set_file_contents(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    path: &str,
    contents: &[u8],
    deltify: DeltifyConfig,
) -> Result<NodeRevisionId> {
    let (parent, name) = open_parent_mutable(paths, layout, txn, path)?;
    let entry = existing_entry(paths, layout, txn, &parent, name)?
        .ok_or_else(|| Error::UnversionedResource(path.to_string()))?;
    if entry.kind != Kind::File {
        return Err(Error::NotFile(path.to_string()));
    }

    let mutable_id = clone_mutable(paths, layout, txn, &entry.id)?;
    let mut noderev = txn.get_node_revision(&mutable_id)?;
    let suffix = txn.alloc_content_suffix();

    let choice = deltify::choose_base(noderev.predecessor_count, &deltify);
    let base_data_rep = match (choice, noderev.predecessor.as_ref()) {
        (DeltaBaseChoice::Base { distance }, Some(pred_id)) => {
            source::walk_predecessors(paths, layout, pred_id, distance)?.data_rep
        }
        _ => None,
    };
    let rep = match (choice, base_data_rep) {
        (DeltaBaseChoice::Base { .. }, Some(base_rep)) => {
            let src = source::RevisionFileSource::new(paths, layout);
            let base_content =
                repstore::reconstruct(&src, base_rep.revision, base_rep.offset, base_rep.size)?;
            let base_loc = BaseLoc {
                revision: base_rep.revision,
                offset: base_rep.offset,
                len: base_rep.size,
            };
            txn.write_delta_contents(&base_content, Some(base_loc), contents, suffix)?
        }
        _ => txn.write_plain_contents(contents, suffix)?,
    };
    noderev.data_rep = Some(rep);
    txn.put_node_revision(&noderev, false)?;

    if mutable_id != entry.id {
        txn.set_dir_entry(
            &parent.node_id,
            &parent.copy_id,
            name,
            DirEntry {
                kind: Kind::File,
                id: mutable_id.clone(),
            },
        )?;
    }

    txn.add_change(&svnfs_transaction::ChangeRecord {
        path: path.to_string(),
        change: svnfs_transaction::RawChange::Modify {
            id: mutable_id.clone(),
            node_kind: Kind::File,
            text_mod: true,
            prop_mod: false,
        },
    })?;
    Ok(mutable_id)
}

/// Delete the node at `path` from its parent directory.
pub fn delete(paths: &RepoPaths, layout: Layout, txn: &Transaction<'_>, path: &str) -> Result<()> {
    let (parent, name) = open_parent_mutable(paths, layout, txn, path)?;
    if existing_entry(paths, layout, txn, &parent, name)?.is_none() {
        return Err(Error::UnversionedResource(path.to_string()));
    }
    txn.delete_dir_entry(&parent.node_id, &parent.copy_id, name)?;
    txn.add_change(&svnfs_transaction::ChangeRecord {
        path: path.to_string(),
        change: svnfs_transaction::RawChange::Delete,
    })?;
    Ok(())
}

/// Overwrite the property list of the node at `path`, advancing its
/// predecessor chain by one if it has not already been touched in this
/// transaction (spec.md §4.8, `set_proplist(node, props)`).
pub fn set_properties(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    path: &str,
    props: svnfs_storage::proplist::PropList,
) -> Result<NodeRevisionId> {
    let (parent, name) = open_parent_mutable(paths, layout, txn, path)?;
    let entry = existing_entry(paths, layout, txn, &parent, name)?
        .ok_or_else(|| Error::UnversionedResource(path.to_string()))?;

    let mutable_id = clone_mutable(paths, layout, txn, &entry.id)?;
    txn.set_node_props(&mutable_id.node_id, &mutable_id.copy_id, &props)?;

    if mutable_id != entry.id {
        txn.set_dir_entry(
            &parent.node_id,
            &parent.copy_id,
            name,
            DirEntry {
                kind: entry.kind,
                id: mutable_id.clone(),
            },
        )?;
    }

    txn.add_change(&svnfs_transaction::ChangeRecord {
        path: path.to_string(),
        change: svnfs_transaction::RawChange::Modify {
            id: mutable_id.clone(),
            node_kind: entry.kind,
            text_mod: false,
            prop_mod: true,
        },
    })?;
    Ok(mutable_id)
}

/// Copy the node at `(from_rev, from_path)` to `to_path` in this
/// transaction, sharing the source's representations until either side is
/// next modified (spec.md §3's `copyroot`/`copyfrom` fields; the same
/// O(1)-copy semantics the original gives directory copies).
///
/// This gives the copy target a fresh copy-id and records `copyfrom`, but
/// does not rewrite `copyroot` on any pre-existing descendant the copy
/// carries along wholesale — that bookkeeping only matters to
/// merge-tracking, which spec.md §1 places out of scope.
pub fn copy(
    paths: &RepoPaths,
    layout: Layout,
    txn: &Transaction<'_>,
    from_rev: i64,
    from_path: &str,
    to_path: &str,
) -> Result<NodeRevisionId> {
    let source_noderev = tree::resolve(paths, layout, from_rev, from_path)?;
    let (parent, name) = open_parent_mutable(paths, layout, txn, to_path)?;
    if existing_entry(paths, layout, txn, &parent, name)?.is_some() {
        return Err(Error::Corrupt(format!(
            "path {to_path:?} already exists in this transaction"
        )));
    }

    let node_id = txn.alloc_node_id()?;
    let copy_id = txn.alloc_copy_id()?;
    let new_id = NodeRevisionId::new(node_id, copy_id, Origin::Txn(txn.id().clone()));
    let noderev = NodeRevision {
        id: new_id.clone(),
        kind: source_noderev.kind,
        predecessor_count: source_noderev.predecessor_count + 1,
        predecessor: Some(source_noderev.id.clone()),
        copyroot: RevPath {
            revision: txn.base_rev(),
            path: to_path.to_string(),
        },
        copyfrom: Some(RevPath {
            revision: from_rev,
            path: from_path.to_string(),
        }),
        created_path: to_path.to_string(),
        data_rep: source_noderev.data_rep.clone(),
        prop_rep: source_noderev.prop_rep.clone(),
        merge_info: source_noderev.merge_info,
        fresh_txn_root: false,
    };
    txn.put_node_revision(&noderev, false)?;
    txn.set_dir_entry(
        &parent.node_id,
        &parent.copy_id,
        name,
        DirEntry {
            kind: noderev.kind,
            id: new_id.clone(),
        },
    )?;
    txn.add_change(&svnfs_transaction::ChangeRecord {
        path: to_path.to_string(),
        change: svnfs_transaction::RawChange::Add {
            id: new_id.clone(),
            node_kind: noderev.kind,
            copyfrom: Some((from_rev, from_path.to_string())),
        },
    })?;
    Ok(new_id)
}
