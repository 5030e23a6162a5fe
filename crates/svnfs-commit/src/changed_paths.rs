//! The changed-paths section written into a revision file at commit time:
//! the committed form of a transaction's folded change set (spec.md §4.8,
//! §4.9 step 4).
//!
//! This is a distinct encoding from the transaction layer's own `changes`
//! file (which records raw, unfolded, still-mutable-id mutations) — by the
//! time this section is written every id has been rewritten to its final
//! committed form and the records have already been folded to one entry
//! per path.

use std::collections::BTreeMap;
use svnfs_core::ids::NodeRevisionId;
use svnfs_core::{Error, Result};
use svnfs_storage::noderev::Kind;
use svnfs_storage::skel::Skel;
use svnfs_transaction::{FoldedChange, FoldedKind};

use crate::trailer;

fn kind_tag(k: FoldedKind) -> &'static str {
    match k {
        FoldedKind::Add => "add",
        FoldedKind::Delete => "delete",
        FoldedKind::Replace => "replace",
        FoldedKind::Modify => "modify",
    }
}

fn kind_from_tag(s: &str) -> Result<FoldedKind> {
    match s {
        "add" => Ok(FoldedKind::Add),
        "delete" => Ok(FoldedKind::Delete),
        "replace" => Ok(FoldedKind::Replace),
        "modify" => Ok(FoldedKind::Modify),
        other => Err(Error::Corrupt(format!(
            "unknown changed-path kind {other:?}"
        ))),
    }
}

fn node_kind_tag(k: Kind) -> &'static str {
    match k {
        Kind::File => "file",
        Kind::Dir => "dir",
    }
}

fn node_kind_from_tag(s: &str) -> Result<Kind> {
    match s {
        "file" => Ok(Kind::File),
        "dir" => Ok(Kind::Dir),
        other => Err(Error::Corrupt(format!("unknown node kind {other:?}"))),
    }
}

fn change_to_skel(path: &str, change: &FoldedChange) -> Skel {
    let mut fields = vec![
        Skel::atom(kind_tag(change.kind).as_bytes().to_vec()),
        Skel::atom(path.as_bytes().to_vec()),
    ];
    if let Some(id) = &change.id {
        fields.push(Skel::atom(id.to_string().into_bytes()));
    } else {
        fields.push(Skel::atom(b"-".to_vec()));
    }
    if let Some(nk) = change.node_kind {
        fields.push(Skel::atom(node_kind_tag(nk).as_bytes().to_vec()));
    } else {
        fields.push(Skel::atom(b"-".to_vec()));
    }
    fields.push(Skel::atom(
        if change.text_mod { "y" } else { "n" }.as_bytes().to_vec(),
    ));
    fields.push(Skel::atom(
        if change.prop_mod { "y" } else { "n" }.as_bytes().to_vec(),
    ));
    if let Some((rev, from_path)) = &change.copyfrom {
        fields.push(Skel::atom(format!("{rev} {from_path}").into_bytes()));
    }
    Skel::list(fields)
}

fn skel_to_change(skel: &Skel) -> Result<(String, FoldedChange)> {
    let bad = || Error::Corrupt("malformed changed-path record".into());
    let items = skel.as_list().ok_or_else(bad)?;
    let kind = kind_from_tag(items.first().and_then(Skel::as_str).ok_or_else(bad)?)?;
    let path = items
        .get(1)
        .and_then(Skel::as_str)
        .ok_or_else(bad)?
        .to_string();
    let id_field = items.get(2).and_then(Skel::as_str).ok_or_else(bad)?;
    let id: Option<NodeRevisionId> = if id_field == "-" {
        None
    } else {
        Some(id_field.parse()?)
    };
    let node_kind_field = items.get(3).and_then(Skel::as_str).ok_or_else(bad)?;
    let node_kind = if node_kind_field == "-" {
        None
    } else {
        Some(node_kind_from_tag(node_kind_field)?)
    };
    let text_mod = items.get(4).and_then(Skel::as_str) == Some("y");
    let prop_mod = items.get(5).and_then(Skel::as_str) == Some("y");
    let copyfrom = match items.get(6).and_then(Skel::as_str) {
        Some(s) => {
            let (rev, from_path) = s.split_once(' ').ok_or_else(bad)?;
            Some((rev.parse().map_err(|_| bad())?, from_path.to_string()))
        }
        None => None,
    };
    Ok((
        path,
        FoldedChange {
            kind,
            id,
            node_kind,
            text_mod,
            prop_mod,
            copyfrom,
        },
    ))
}

/// Encode the final, id-rewritten changed-paths list: one skel per line,
/// in path order (spec.md §4.9 step 4's "deterministic output").
pub fn encode(folded: &BTreeMap<String, FoldedChange>) -> Vec<u8> {
    let mut out = Vec::new();
    for (path, change) in folded {
        out.extend(change_to_skel(path, change).encode());
        out.push(b'\n');
    }
    out
}

/// Parse a changed-paths section previously produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<BTreeMap<String, FoldedChange>> {
    let mut out = BTreeMap::new();
    for line in bytes.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let skel = Skel::parse_complete(line)
            .map_err(|e| Error::Corrupt(format!("malformed changed-path line: {e}")))?;
        let (path, change) = skel_to_change(&skel)?;
        out.insert(path, change);
    }
    Ok(out)
}

/// Read and decode a revision file's changed-paths section, given its full
/// bytes and the section's starting offset (as recorded in the trailer).
/// The section runs up to where the trailer line itself begins.
pub fn read_section(bytes: &[u8], changed_paths_offset: u64) -> Result<BTreeMap<String, FoldedChange>> {
    let end = trailer::trailer_start(bytes)?;
    let start = changed_paths_offset as usize;
    if start > end {
        return Err(Error::Corrupt(
            "changed-paths offset falls after the trailer".into(),
        ));
    }
    decode(&bytes[start..end])
}
