//! The changes file: one raw record per mutation, and the folding rules
//! that collapse repeated records for the same path into a single
//! `svn_fs_path_change`-equivalent entry (spec.md §4.8).

use svnfs_core::ids::NodeRevisionId;
use svnfs_core::{Error, Result};
use svnfs_storage::{Kind, Skel};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// A single raw mutation as it is appended to the changes file, before
/// folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChange {
    /// A path came into existence, possibly as a copy.
    Add {
        /// The node this path now names.
        id: NodeRevisionId,
        /// File or directory.
        node_kind: Kind,
        /// Copy source, if this add is the result of a copy.
        copyfrom: Option<(i64, String)>,
    },
    /// A path was removed.
    Delete,
    /// A path's text and/or properties were edited in place.
    Modify {
        /// The node now at this path (same line, next node-revision).
        id: NodeRevisionId,
        /// File or directory.
        node_kind: Kind,
        /// Content changed.
        text_mod: bool,
        /// Properties changed.
        prop_mod: bool,
    },
    /// Cancel every change recorded so far against this path (and,
    /// transitively, against its children via folding).
    Reset,
}

/// One raw record: a path plus the mutation applied to it, in the order
/// they were appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Repository path the mutation applies to.
    pub path: String,
    /// What happened.
    pub change: RawChange,
}

/// The kind of change folding settles on for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldedKind {
    /// Path is newly present.
    Add,
    /// Path is gone.
    Delete,
    /// Path was deleted and a new node added in its place.
    Replace,
    /// Path's existing node-revision was edited in place.
    Modify,
}

/// The folded, final change recorded for one path (spec.md §4.8, §8.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedChange {
    /// Add / Delete / Replace / Modify.
    pub kind: FoldedKind,
    /// The node now at this path. Absent only when `kind == Delete`.
    pub id: Option<NodeRevisionId>,
    /// File or directory, when known.
    pub node_kind: Option<Kind>,
    /// Content changed at some point in this txn.
    pub text_mod: bool,
    /// Properties changed at some point in this txn.
    pub prop_mod: bool,
    /// Copy source, if this path's current incarnation is a copy.
    pub copyfrom: Option<(i64, String)>,
}

/// Fold an ordered sequence of raw change records into the final per-path
/// change set (spec.md §4.8's folding rules, verified by spec.md §8.6).
pub fn fold(records: &[ChangeRecord]) -> Result<BTreeMap<String, FoldedChange>> {
    let mut folded: BTreeMap<String, FoldedChange> = BTreeMap::new();
    for record in records {
        apply_one(&mut folded, record)?;
    }
    Ok(folded)
}

fn apply_one(folded: &mut BTreeMap<String, FoldedChange>, record: &ChangeRecord) -> Result<()> {
    let path = &record.path;
    match &record.change {
        RawChange::Reset => {
            folded.remove(path);
            remove_children(folded, path);
        }
        RawChange::Delete => {
            match folded.get(path).map(|c| c.kind) {
                Some(FoldedKind::Add) => {
                    // delete after add (within the same txn) cancels both.
                    folded.remove(path);
                }
                _ => {
                    folded.insert(
                        path.clone(),
                        FoldedChange {
                            kind: FoldedKind::Delete,
                            id: None,
                            node_kind: None,
                            text_mod: false,
                            prop_mod: false,
                            copyfrom: None,
                        },
                    );
                }
            }
            remove_children(folded, path);
        }
        RawChange::Add {
            id,
            node_kind,
            copyfrom,
        } => {
            match folded.get(path).map(|c| c.kind) {
                None => {
                    folded.insert(
                        path.clone(),
                        FoldedChange {
                            kind: FoldedKind::Add,
                            id: Some(id.clone()),
                            node_kind: Some(*node_kind),
                            text_mod: false,
                            prop_mod: false,
                            copyfrom: copyfrom.clone(),
                        },
                    );
                }
                Some(FoldedKind::Delete) => {
                    folded.insert(
                        path.clone(),
                        FoldedChange {
                            kind: FoldedKind::Replace,
                            id: Some(id.clone()),
                            node_kind: Some(*node_kind),
                            text_mod: false,
                            prop_mod: false,
                            copyfrom: copyfrom.clone(),
                        },
                    );
                }
                Some(_) => {
                    return Err(Error::Corrupt(format!(
                        "add on preexisting path {path:?}"
                    )));
                }
            }
        }
        RawChange::Modify {
            id,
            node_kind,
            text_mod,
            prop_mod,
        } => {
            let entry = folded.entry(path.clone()).or_insert_with(|| FoldedChange {
                kind: FoldedKind::Modify,
                id: Some(id.clone()),
                node_kind: Some(*node_kind),
                text_mod: false,
                prop_mod: false,
                copyfrom: None,
            });
            entry.id = Some(id.clone());
            entry.node_kind = Some(*node_kind);
            entry.text_mod |= *text_mod;
            entry.prop_mod |= *prop_mod;
        }
    }
    Ok(())
}

fn remove_children(folded: &mut BTreeMap<String, FoldedChange>, path: &str) {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    folded.retain(|p, _| !p.starts_with(&prefix));
}

fn change_to_skel(record: &ChangeRecord) -> Skel {
    let path = Skel::atom(record.path.clone().into_bytes());
    match &record.change {
        RawChange::Add {
            id,
            node_kind,
            copyfrom,
        } => {
            let mut fields = vec![
                Skel::atom(b"add".to_vec()),
                path,
                Skel::atom(id.to_string().into_bytes()),
                Skel::atom(kind_tag(*node_kind).as_bytes().to_vec()),
            ];
            if let Some((rev, from_path)) = copyfrom {
                fields.push(Skel::atom(format!("{rev} {from_path}").into_bytes()));
            }
            Skel::list(fields)
        }
        RawChange::Delete => Skel::list([Skel::atom(b"delete".to_vec()), path]),
        RawChange::Modify {
            id,
            node_kind,
            text_mod,
            prop_mod,
        } => Skel::list([
            Skel::atom(b"modify".to_vec()),
            path,
            Skel::atom(id.to_string().into_bytes()),
            Skel::atom(kind_tag(*node_kind).as_bytes().to_vec()),
            Skel::atom(if *text_mod { "y" } else { "n" }.as_bytes().to_vec()),
            Skel::atom(if *prop_mod { "y" } else { "n" }.as_bytes().to_vec()),
        ]),
        RawChange::Reset => Skel::list([Skel::atom(b"reset".to_vec()), path]),
    }
}

fn kind_tag(k: Kind) -> &'static str {
    match k {
        Kind::File => "file",
        Kind::Dir => "dir",
    }
}

fn kind_from_tag(s: &str) -> Result<Kind> {
    match s {
        "file" => Ok(Kind::File),
        "dir" => Ok(Kind::Dir),
        other => Err(Error::Corrupt(format!("unknown node kind {other:?} in changes file"))),
    }
}

fn skel_to_change(skel: &Skel) -> Result<ChangeRecord> {
    let bad = || Error::Corrupt("malformed changes file record".into());
    let items = skel.as_list().ok_or_else(bad)?;
    let tag = items.first().and_then(Skel::as_str).ok_or_else(bad)?;
    let path = items
        .get(1)
        .and_then(Skel::as_str)
        .ok_or_else(bad)?
        .to_string();
    let change = match tag {
        "add" => {
            let id: NodeRevisionId = items.get(2).and_then(Skel::as_str).ok_or_else(bad)?.parse()?;
            let node_kind = kind_from_tag(items.get(3).and_then(Skel::as_str).ok_or_else(bad)?)?;
            let copyfrom = match items.get(4).and_then(Skel::as_str) {
                Some(s) => {
                    let (rev, from_path) = s.split_once(' ').ok_or_else(bad)?;
                    Some((rev.parse().map_err(|_| bad())?, from_path.to_string()))
                }
                None => None,
            };
            RawChange::Add {
                id,
                node_kind,
                copyfrom,
            }
        }
        "delete" => RawChange::Delete,
        "modify" => {
            let id: NodeRevisionId = items.get(2).and_then(Skel::as_str).ok_or_else(bad)?.parse()?;
            let node_kind = kind_from_tag(items.get(3).and_then(Skel::as_str).ok_or_else(bad)?)?;
            let text_mod = items.get(4).and_then(Skel::as_str) == Some("y");
            let prop_mod = items.get(5).and_then(Skel::as_str) == Some("y");
            RawChange::Modify {
                id,
                node_kind,
                text_mod,
                prop_mod,
            }
        }
        "reset" => RawChange::Reset,
        other => return Err(Error::Corrupt(format!("unknown change tag {other:?}"))),
    };
    Ok(ChangeRecord { path, change })
}

/// Append one raw change record to the changes file (spec.md §4.8's
/// `add_change`).
pub fn append_change(changes_path: &Path, record: &ChangeRecord) -> Result<()> {
    let mut f = OpenOptions::new().append(true).open(changes_path)?;
    let mut bytes = change_to_skel(record).encode();
    bytes.push(b'\n');
    f.write_all(&bytes)?;
    Ok(())
}

/// Read back every raw record appended to the changes file, in order.
pub fn read_changes(changes_path: &Path) -> Result<Vec<ChangeRecord>> {
    let contents = std::fs::read(changes_path)?;
    let mut records = Vec::new();
    for line in contents.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let skel = Skel::parse_complete(line)
            .map_err(|e| Error::Corrupt(format!("malformed changes file line: {e}")))?;
        records.push(skel_to_change(&skel)?);
    }
    Ok(records)
}
