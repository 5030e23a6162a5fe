//! Node-ids, copy-ids, transaction-ids, and the composite node-revision-id.
//!
//! Transaction-scoped ids carry a `_` prefix (e.g. `_3k`); committed ids do
//! not. Base36 is used throughout because it is what the on-disk format
//! uses and keeps ids short.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Encode a non-negative integer as lowercase base36.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 alphabet is ASCII")
}

/// Decode a base36 string produced by [`to_base36`].
pub fn from_base36(s: &str) -> Result<u64> {
    if s.is_empty() {
        return Err(Error::Corrupt("empty base36 number".into()));
    }
    let mut n: u64 = 0;
    for c in s.chars() {
        let digit = c
            .to_digit(36)
            .ok_or_else(|| Error::Corrupt(format!("invalid base36 digit in {s:?}")))?;
        n = n
            .checked_mul(36)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| Error::Corrupt(format!("base36 number overflow in {s:?}")))?;
    }
    Ok(n)
}

/// A node-id or copy-id. Opaque, short, alphanumeric.
///
/// Transaction-scoped ids (not yet committed) carry a `_` prefix; committed
/// ids are bare base36 (older formats) or `<local>-<rev>` (newer formats).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpaqueId(String);

impl OpaqueId {
    /// Mint a fresh transaction-scoped id from a base36 sequence number.
    pub fn txn_scoped(seq: u64) -> Self {
        OpaqueId(format!("_{}", to_base36(seq)))
    }

    /// True if this id still lives in a transaction's scratch space.
    pub fn is_txn_scoped(&self) -> bool {
        self.0.starts_with('_')
    }

    /// Rewrite a transaction-scoped id to its permanent committed form.
    ///
    /// `newer_format` selects between the two rewrite strategies in
    /// spec.md §4.3: `<local>-<rev>` for newer formats, or a flat base36
    /// id obtained by adding `start_counter` for older ones.
    pub fn commit(&self, rev: i64, newer_format: bool, start_counter: u64) -> Result<Self> {
        let local = self
            .0
            .strip_prefix('_')
            .ok_or_else(|| Error::Corrupt(format!("id {self} is not transaction-scoped")))?;
        if newer_format {
            Ok(OpaqueId(format!("{local}-{rev}")))
        } else {
            let n = from_base36(local)?;
            Ok(OpaqueId(to_base36(n + start_counter)))
        }
    }

    /// Raw string form, as it appears on disk.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OpaqueId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Corrupt("empty node/copy id".into()));
        }
        Ok(OpaqueId(s.to_string()))
    }
}

/// A transaction-id: `"<base-rev>-<seq>"`, the sequence monotonic per
/// repository and base36-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnId {
    /// The revision this transaction was opened against.
    pub base_rev: i64,
    /// Monotonic per-repository sequence number.
    pub seq: u64,
}

impl TxnId {
    /// Build a transaction-id for `base_rev` using the allocator's next
    /// sequence value.
    pub fn new(base_rev: i64, seq: u64) -> Self {
        TxnId { base_rev, seq }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base_rev, to_base36(self.seq))
    }
}

impl FromStr for TxnId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (base, seq) = s
            .split_once('-')
            .ok_or_else(|| Error::Corrupt(format!("malformed transaction id {s:?}")))?;
        let base_rev: i64 = base
            .parse()
            .map_err(|_| Error::Corrupt(format!("malformed transaction id {s:?}")))?;
        let seq = from_base36(seq)?;
        Ok(TxnId { base_rev, seq })
    }
}

/// Where a node-revision currently lives: mutable transaction scratch space,
/// or an immutable committed revision file at a known byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Mutable, in a transaction's scratch area.
    Txn(TxnId),
    /// Immutable, at `offset` bytes into revision `rev`'s file.
    Rev {
        /// Revision number.
        rev: i64,
        /// Byte offset of the node-revision record within that file.
        offset: u64,
    },
}

impl Origin {
    /// True if this origin is still mutable (lives in a transaction).
    pub fn is_txn(&self) -> bool {
        matches!(self, Origin::Txn(_))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Txn(txn) => write!(f, "t{txn}"),
            Origin::Rev { rev, offset } => write!(f, "r{rev}/{offset}"),
        }
    }
}

impl FromStr for Origin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix('t') {
            return Ok(Origin::Txn(rest.parse()?));
        }
        if let Some(rest) = s.strip_prefix('r') {
            let (rev, offset) = rest
                .split_once('/')
                .ok_or_else(|| Error::Corrupt(format!("malformed origin {s:?}")))?;
            let rev: i64 = rev
                .parse()
                .map_err(|_| Error::Corrupt(format!("malformed origin {s:?}")))?;
            let offset: u64 = offset
                .parse()
                .map_err(|_| Error::Corrupt(format!("malformed origin {s:?}")))?;
            return Ok(Origin::Rev { rev, offset });
        }
        Err(Error::Corrupt(format!("malformed origin {s:?}")))
    }
}

/// Composite node-revision-id: `(node-id, copy-id, origin)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRevisionId {
    /// The node line this node-revision belongs to.
    pub node_id: OpaqueId,
    /// The copy operation that introduced this node line.
    pub copy_id: OpaqueId,
    /// Where this node-revision currently lives.
    pub origin: Origin,
}

impl NodeRevisionId {
    /// Construct a new id.
    pub fn new(node_id: OpaqueId, copy_id: OpaqueId, origin: Origin) -> Self {
        NodeRevisionId {
            node_id,
            copy_id,
            origin,
        }
    }

    /// True if this id is still mutable (transaction-located).
    pub fn is_txn(&self) -> bool {
        self.origin.is_txn()
    }
}

impl fmt::Display for NodeRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node_id, self.copy_id, self.origin)
    }
}

impl FromStr for NodeRevisionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '.');
        let node_id = parts
            .next()
            .ok_or_else(|| Error::Corrupt(format!("malformed node-revision-id {s:?}")))?
            .parse()?;
        let copy_id = parts
            .next()
            .ok_or_else(|| Error::Corrupt(format!("malformed node-revision-id {s:?}")))?
            .parse()?;
        let origin = parts
            .next()
            .ok_or_else(|| Error::Corrupt(format!("malformed node-revision-id {s:?}")))?
            .parse()?;
        Ok(NodeRevisionId {
            node_id,
            copy_id,
            origin,
        })
    }
}

/// Per-transaction node-id/copy-id sequence allocator state, as persisted in
/// a transaction's `next-ids` file (`"<node-seq> <copy-seq>\n"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NextIds {
    /// Next node-id sequence number to mint.
    pub node_seq: u64,
    /// Next copy-id sequence number to mint.
    pub copy_seq: u64,
}

impl NextIds {
    /// Parse the `"<node-seq> <copy-seq>\n"` line.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim_end_matches('\n');
        let (n, c) = s
            .split_once(' ')
            .ok_or_else(|| Error::Corrupt(format!("malformed next-ids line {s:?}")))?;
        Ok(NextIds {
            node_seq: from_base36(n)?,
            copy_seq: from_base36(c)?,
        })
    }

    /// Serialize back to the on-disk form.
    pub fn to_line(self) -> String {
        format!("{} {}\n", to_base36(self.node_seq), to_base36(self.copy_seq))
    }

    /// Allocate a fresh node-id, bumping the sequence.
    pub fn next_node_id(&mut self) -> OpaqueId {
        let id = OpaqueId::txn_scoped(self.node_seq);
        self.node_seq += 1;
        id
    }

    /// Allocate a fresh copy-id, bumping the sequence.
    pub fn next_copy_id(&mut self) -> OpaqueId {
        let id = OpaqueId::txn_scoped(self.copy_seq);
        self.copy_seq += 1;
        id
    }
}

/// A representation uniquifier: `"<txn-id>/<fresh-suffix>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uniquifier {
    /// Owning transaction.
    pub txn_id: TxnId,
    /// Fresh suffix, unique per representation within the transaction.
    pub suffix: u64,
}

impl fmt::Display for Uniquifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.txn_id, to_base36(self.suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn base36_roundtrip_small() {
        for n in [0u64, 1, 35, 36, 37, 1295, 1296] {
            assert_eq!(from_base36(&to_base36(n)).unwrap(), n);
        }
    }

    proptest! {
        #[test]
        fn base36_roundtrip(n in any::<u64>()) {
            prop_assert_eq!(from_base36(&to_base36(n)).unwrap(), n);
        }
    }

    #[test]
    fn txn_id_display_parse_roundtrip() {
        let id = TxnId::new(42, 7);
        let s = id.to_string();
        assert_eq!(s, "42-7");
        assert_eq!(s.parse::<TxnId>().unwrap(), id);
    }

    #[test]
    fn node_revision_id_roundtrip_txn() {
        let id = NodeRevisionId::new(
            "_0".parse().unwrap(),
            "_1".parse().unwrap(),
            Origin::Txn(TxnId::new(3, 2)),
        );
        let s = id.to_string();
        assert_eq!(s.parse::<NodeRevisionId>().unwrap(), id);
    }

    #[test]
    fn node_revision_id_roundtrip_rev() {
        let id = NodeRevisionId::new(
            "k".parse().unwrap(),
            "0".parse().unwrap(),
            Origin::Rev { rev: 5, offset: 128 },
        );
        let s = id.to_string();
        assert_eq!(s, "k.0.r5/128");
        assert_eq!(s.parse::<NodeRevisionId>().unwrap(), id);
    }

    #[test]
    fn commit_rewrites_newer_format() {
        let id = OpaqueId::txn_scoped(5);
        let committed = id.commit(10, true, 0).unwrap();
        assert_eq!(committed.as_str(), "5-10");
    }

    #[test]
    fn commit_rewrites_legacy_format() {
        let id = OpaqueId::txn_scoped(5);
        let committed = id.commit(10, false, 100).unwrap();
        assert_eq!(committed.as_str(), to_base36(105));
    }

    #[test]
    fn next_ids_roundtrip() {
        let ids = NextIds {
            node_seq: 3,
            copy_seq: 9,
        };
        let line = ids.to_line();
        let parsed = NextIds::parse(&line).unwrap();
        assert_eq!(parsed.node_seq, 3);
        assert_eq!(parsed.copy_seq, 9);
    }
}
