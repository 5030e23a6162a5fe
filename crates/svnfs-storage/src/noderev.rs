//! The node-revision record: the per-revision metadata skel described in
//! spec.md §3 and §4.4, and its encoding through [`crate::skel`].
//!
//! The record is a tagged list of `(tag value)` pairs rather than a fixed
//! positional tuple, so optional fields (copyfrom, merge-info counters) can
//! be omitted entirely instead of serialized as empty placeholders, and so
//! a future tag can be added without breaking older readers (spec.md §9,
//! "dynamic named parameters").

use crate::rep::RepPointer;
use crate::skel::Skel;
use svnfs_core::ids::NodeRevisionId;
use svnfs_core::{Error, Result};

/// What kind of node a node-revision describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A file: has a `data-rep` pointing at its contents.
    File,
    /// A directory: has a `data-rep` pointing at its hash-encoded entries.
    Dir,
}

impl Kind {
    fn as_tag(self) -> &'static str {
        match self {
            Kind::File => "file",
            Kind::Dir => "dir",
        }
    }

    fn from_tag(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Kind::File),
            "dir" => Ok(Kind::Dir),
            other => Err(Error::Corrupt(format!("unknown node kind {other:?}"))),
        }
    }
}

/// `(revision, path)` — where a node line's copy subtree root lives, or
/// where a copy was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevPath {
    /// Revision number.
    pub revision: i64,
    /// Repository path at that revision.
    pub path: String,
}

impl RevPath {
    fn render(&self) -> String {
        format!("{} {}", self.revision, self.path)
    }

    fn parse(s: &str) -> Result<Self> {
        let (rev, path) = s
            .split_once(' ')
            .ok_or_else(|| Error::Corrupt(format!("malformed rev-path {s:?}")))?;
        let revision: i64 = rev
            .parse()
            .map_err(|_| Error::Corrupt(format!("malformed rev-path {s:?}")))?;
        Ok(RevPath {
            revision,
            path: path.to_string(),
        })
    }
}

/// Merge-info bookkeeping fields, present only when the format's
/// [`svnfs_core::FormatFeatures`] says so (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeInfo {
    /// Number of immediate children carrying merge-info.
    pub count: i64,
    /// Whether this node itself carries merge-info.
    pub here: bool,
}

/// One node-revision: a complete snapshot of a single node's metadata at
/// one point in its predecessor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRevision {
    /// This node-revision's own id.
    pub id: NodeRevisionId,
    /// File or directory.
    pub kind: Kind,
    /// Distance from the origin of this node's line; `predecessor_count`
    /// of the root node-revision of revision `r` must equal `r`.
    pub predecessor_count: u64,
    /// The previous node-revision in this node's line, if any.
    pub predecessor: Option<NodeRevisionId>,
    /// `(rev, path)` of the copy subtree root this node line belongs to.
    pub copyroot: RevPath,
    /// `(rev, path)` this node-revision was copied from, if it is the
    /// result of a copy rather than an ordinary edit.
    pub copyfrom: Option<RevPath>,
    /// Canonical path at which this node was first created in its line.
    pub created_path: String,
    /// Pointer to this node-revision's contents (file bytes or directory
    /// entries). `None` for an as-yet-empty node.
    pub data_rep: Option<RepPointer>,
    /// Pointer to this node-revision's property list. `None` if it has no
    /// properties set.
    pub prop_rep: Option<RepPointer>,
    /// Merge-info bookkeeping, emitted only when the format supports it.
    pub merge_info: Option<MergeInfo>,
    /// Internal bookkeeping flag: true while this node is still a
    /// transaction's mutable root (spec.md §3, "fresh-txn-root").
    pub fresh_txn_root: bool,
}

impl NodeRevision {
    fn atom(tag: &str, value: impl Into<Vec<u8>>) -> Skel {
        Skel::list([Skel::atom(tag.as_bytes().to_vec()), Skel::atom(value)])
    }

    /// Encode this record as a skel, honoring `emit_merge_info` (the
    /// format's feature gate — spec.md §4.4).
    pub fn to_skel(&self, emit_merge_info: bool) -> Skel {
        let mut fields = vec![
            Self::atom("id", self.id.to_string().into_bytes()),
            Self::atom("kind", self.kind.as_tag().as_bytes().to_vec()),
            Self::atom("count", self.predecessor_count.to_string().into_bytes()),
            Self::atom("cpath", self.created_path.clone().into_bytes()),
            Self::atom("copyroot", self.copyroot.render().into_bytes()),
        ];
        if let Some(pred) = &self.predecessor {
            fields.push(Self::atom("pred", pred.to_string().into_bytes()));
        }
        if let Some(copyfrom) = &self.copyfrom {
            fields.push(Self::atom("copyfrom", copyfrom.render().into_bytes()));
        }
        if let Some(text) = &self.data_rep {
            fields.push(Self::atom("text", text.to_string().into_bytes()));
        }
        if let Some(props) = &self.prop_rep {
            fields.push(Self::atom("props", props.to_string().into_bytes()));
        }
        if emit_merge_info {
            if let Some(mi) = &self.merge_info {
                fields.push(Self::atom("minfo-cnt", mi.count.to_string().into_bytes()));
                fields.push(Self::atom(
                    "minfo-here",
                    if mi.here { "y" } else { "n" }.as_bytes().to_vec(),
                ));
            }
        }
        if self.fresh_txn_root {
            fields.push(Self::atom("fresh-root", "y".as_bytes().to_vec()));
        }
        Skel::list([Skel::list(fields)])
    }

    /// Serialize directly to bytes.
    pub fn encode(&self, emit_merge_info: bool) -> Vec<u8> {
        self.to_skel(emit_merge_info).encode()
    }

    /// Parse a record previously produced by [`NodeRevision::encode`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let skel = Skel::parse_complete(bytes)
            .map_err(|e| Error::Corrupt(format!("malformed node-revision skel: {e}")))?;
        Self::from_skel(&skel)
    }

    /// Reconstruct a record from an already-parsed skel. Used when the
    /// record was parsed out of a larger byte stream (e.g. read starting
    /// at a known offset inside a revision file, where the skel's own
    /// balanced parentheses mark its end rather than a length prefix).
    pub fn from_skel(skel: &Skel) -> Result<Self> {
        let outer = skel
            .as_list()
            .and_then(|items| items.first())
            .and_then(Skel::as_list)
            .ok_or_else(|| Error::Corrupt("node-revision skel is not a wrapped list".into()))?;

        let field = |tag: &str| -> Option<&str> {
            outer.iter().find_map(|f| {
                let pair = f.as_list()?;
                if pair.first()?.as_str()? == tag {
                    pair.get(1)?.as_str()
                } else {
                    None
                }
            })
        };
        let required = |tag: &str| -> Result<&str> {
            field(tag).ok_or_else(|| Error::Corrupt(format!("node-revision missing {tag:?}")))
        };

        let id: NodeRevisionId = required("id")?.parse()?;
        let kind = Kind::from_tag(required("kind")?)?;
        let predecessor_count: u64 = required("count")?
            .parse()
            .map_err(|_| Error::Corrupt("malformed predecessor count".into()))?;
        let created_path = required("cpath")?.to_string();
        let copyroot = RevPath::parse(required("copyroot")?)?;
        let predecessor = field("pred").map(str::parse).transpose()?;
        let copyfrom = field("copyfrom").map(RevPath::parse).transpose()?;
        let data_rep = field("text").map(str::parse).transpose()?;
        let prop_rep = field("props").map(str::parse).transpose()?;
        let merge_info = match (field("minfo-cnt"), field("minfo-here")) {
            (Some(count), Some(here)) => Some(MergeInfo {
                count: count
                    .parse()
                    .map_err(|_| Error::Corrupt("malformed minfo-cnt".into()))?,
                here: here == "y",
            }),
            _ => None,
        };
        let fresh_txn_root = field("fresh-root") == Some("y");

        Ok(NodeRevision {
            id,
            kind,
            predecessor_count,
            predecessor,
            copyroot,
            copyfrom,
            created_path,
            data_rep,
            prop_rep,
            merge_info,
            fresh_txn_root,
        })
    }
}
