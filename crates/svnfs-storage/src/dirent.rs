//! Directory representation contents: the hash-encoded entry list a
//! committed directory's `data-rep` expands to, and the incremental
//! add/modify/delete form a mutable (in-transaction) directory accumulates
//! (spec.md §6).
//!
//! Final form:
//!
//! ```text
//! K <len>\n<name>\nV <len>\n<kind> <child-id>\n
//! …
//! END\n
//! ```
//!
//! Mutable form (one record per call to `set_entry`, replayed in order):
//!
//! ```text
//! K <len>\n<name>\nV <len>\n<kind> <child-id>\n     ; add or modify
//! D <len>\n<name>\n                                  ; delete
//! ```

use svnfs_core::ids::NodeRevisionId;
use svnfs_core::{Error, Result};
use std::collections::BTreeMap;

/// One directory entry: a child's kind and the full node-revision-id it
/// currently points at, so a reader can jump straight to the child's
/// content without a second lookup (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File or directory.
    pub kind: crate::noderev::Kind,
    /// The child's current node-revision-id.
    pub id: NodeRevisionId,
}

impl DirEntry {
    fn render(&self) -> String {
        let kind = match self.kind {
            crate::noderev::Kind::File => "file",
            crate::noderev::Kind::Dir => "dir",
        };
        format!("{kind} {}", self.id)
    }

    fn parse(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once(' ')
            .ok_or_else(|| Error::Corrupt(format!("malformed directory entry value {s:?}")))?;
        let kind = match kind {
            "file" => crate::noderev::Kind::File,
            "dir" => crate::noderev::Kind::Dir,
            other => {
                return Err(Error::Corrupt(format!(
                    "unknown entry kind {other:?} in directory entry"
                )))
            }
        };
        Ok(DirEntry {
            kind,
            id: id.parse()?,
        })
    }
}

/// A directory's full, materialized entry set, ordered lexically by name
/// (spec.md §4.9: "walk entries in lexical order to get deterministic
/// output").
pub type Directory = BTreeMap<String, DirEntry>;

fn write_kv(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(format!("K {}\n", name.len()).as_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(format!("V {}\n", value.len()).as_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(b'\n');
}

fn write_delete(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(format!("D {}\n", name.len()).as_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(b'\n');
}

/// Encode a complete directory as the final hash-encoded form.
pub fn encode_final(dir: &Directory) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, entry) in dir {
        write_kv(&mut out, name, &entry.render());
    }
    out.extend_from_slice(b"END\n");
    out
}

/// Parse the final hash-encoded form back into a [`Directory`].
pub fn parse_final(bytes: &[u8]) -> Result<Directory> {
    let mut dir = Directory::new();
    let mut pos = 0usize;
    loop {
        if bytes[pos..].starts_with(b"END\n") {
            return Ok(dir);
        }
        let (name, next) = read_field(bytes, pos, b'K')?;
        let (value, next) = read_field(bytes, next, b'V')?;
        dir.insert(name, DirEntry::parse(&value)?);
        pos = next;
    }
}

/// One incremental change recorded against a still-mutable directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirChange {
    /// Add or modify `name` to point at `entry`.
    Set {
        /// Entry name.
        name: String,
        /// New entry value.
        entry: DirEntry,
    },
    /// Remove `name` entirely.
    Delete {
        /// Entry name.
        name: String,
    },
}

/// Encode one incremental change, to be appended to a mutable directory's
/// scratch file.
pub fn encode_change(change: &DirChange) -> Vec<u8> {
    let mut out = Vec::new();
    match change {
        DirChange::Set { name, entry } => write_kv(&mut out, name, &entry.render()),
        DirChange::Delete { name } => write_delete(&mut out, name),
    }
    out
}

/// Parse a stream of incremental changes (optionally `END\n`-terminated)
/// and apply them, in order, starting from `base`.
pub fn apply_changes(base: &Directory, bytes: &[u8]) -> Result<Directory> {
    let mut dir = base.clone();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if bytes[pos..].starts_with(b"END\n") {
            break;
        }
        match bytes.get(pos) {
            Some(b'K') => {
                let (name, next) = read_field(bytes, pos, b'K')?;
                let (value, next) = read_field(bytes, next, b'V')?;
                dir.insert(name, DirEntry::parse(&value)?);
                pos = next;
            }
            Some(b'D') => {
                let (name, next) = read_field(bytes, pos, b'D')?;
                dir.remove(&name);
                pos = next;
            }
            _ => return Err(Error::Corrupt("malformed directory delta record".into())),
        }
    }
    Ok(dir)
}

fn read_field(bytes: &[u8], pos: usize, expected_tag: u8) -> Result<(String, usize)> {
    if bytes.get(pos) != Some(&expected_tag) || bytes.get(pos + 1) != Some(&b' ') {
        return Err(Error::Corrupt(format!(
            "expected {} field at offset {pos}",
            expected_tag as char
        )));
    }
    let mut p = pos + 2;
    let len_start = p;
    while matches!(bytes.get(p), Some(b) if b.is_ascii_digit()) {
        p += 1;
    }
    let len: usize = std::str::from_utf8(&bytes[len_start..p])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Corrupt("malformed field length".into()))?;
    if bytes.get(p) != Some(&b'\n') {
        return Err(Error::Corrupt("field length missing newline".into()));
    }
    p += 1;
    let value_end = p
        .checked_add(len)
        .ok_or_else(|| Error::Corrupt("field length overflow".into()))?;
    let value_bytes = bytes
        .get(p..value_end)
        .ok_or_else(|| Error::Corrupt("truncated field value".into()))?;
    let value = String::from_utf8(value_bytes.to_vec())
        .map_err(|_| Error::Corrupt("field value is not valid UTF-8".into()))?;
    if bytes.get(value_end) != Some(&b'\n') {
        return Err(Error::Corrupt("field value missing trailing newline".into()));
    }
    Ok((value, value_end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noderev::Kind;
    use svnfs_core::ids::{Origin, TxnId};

    fn entry(n: &str, kind: Kind) -> DirEntry {
        DirEntry {
            kind,
            id: NodeRevisionId::new(
                n.parse().unwrap(),
                "0".parse().unwrap(),
                Origin::Txn(TxnId::new(0, 1)),
            ),
        }
    }

    #[test]
    fn roundtrip_empty() {
        let dir = Directory::new();
        let bytes = encode_final(&dir);
        assert_eq!(bytes, b"END\n");
        assert_eq!(parse_final(&bytes).unwrap(), dir);
    }

    #[test]
    fn roundtrip_several_entries() {
        let mut dir = Directory::new();
        dir.insert("hello".into(), entry("k1", Kind::File));
        dir.insert("sub".into(), entry("k2", Kind::Dir));
        let bytes = encode_final(&dir);
        assert_eq!(parse_final(&bytes).unwrap(), dir);
    }

    #[test]
    fn apply_add_then_delete() {
        let base = Directory::new();
        let mut changes = Vec::new();
        changes.extend(encode_change(&DirChange::Set {
            name: "a".into(),
            entry: entry("k1", Kind::File),
        }));
        changes.extend(encode_change(&DirChange::Delete { name: "a".into() }));
        let result = apply_changes(&base, &changes).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn apply_modify_preserves_other_entries() {
        let mut base = Directory::new();
        base.insert("a".into(), entry("k1", Kind::File));
        base.insert("b".into(), entry("k2", Kind::File));
        let change = encode_change(&DirChange::Set {
            name: "a".into(),
            entry: entry("k3", Kind::Dir),
        });
        let result = apply_changes(&base, &change).unwrap();
        assert_eq!(result.get("a"), Some(&entry("k3", Kind::Dir)));
        assert_eq!(result.get("b"), Some(&entry("k2", Kind::File)));
    }

    #[test]
    fn lexical_ordering_on_iteration() {
        let mut dir = Directory::new();
        dir.insert("zebra".into(), entry("k1", Kind::File));
        dir.insert("apple".into(), entry("k2", Kind::File));
        dir.insert("mango".into(), entry("k3", Kind::File));
        let names: Vec<&str> = dir.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
    }
}
