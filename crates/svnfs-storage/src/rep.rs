//! Representation pointers: the `(revision, offset, size, expanded-size,
//! checksums, uniquifier)` tuple stored inside a node-revision (spec.md
//! §3, §6).

use svnfs_core::ids::Uniquifier;
use svnfs_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A pointer to a representation stored somewhere inside some revision's
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepPointer {
    /// Revision (or, for a still-mutable rep, the owning transaction's base
    /// revision — mutable reps are identified by `uniquifier` instead) the
    /// representation's bytes live in.
    pub revision: i64,
    /// Byte offset of the representation segment within that revision's
    /// file.
    pub offset: u64,
    /// On-disk length of the representation segment's payload.
    pub size: u64,
    /// Length of the representation once fully expanded (after applying
    /// any delta chain).
    pub expanded_size: u64,
    /// MD5 of the expanded bytes, hex-encoded.
    pub md5: String,
    /// SHA-1 of the expanded bytes, hex-encoded. Absent for directory and
    /// property reps once cleared at commit (spec.md §4.9 step 4).
    pub sha1: Option<String>,
    /// Fresh-per-representation uniquifier, present only while the rep is
    /// still mutable inside a transaction.
    pub uniquifier: Option<Uniquifier>,
}

impl fmt::Display for RepPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.revision, self.offset, self.size, self.expanded_size, self.md5
        )?;
        if let Some(sha1) = &self.sha1 {
            write!(f, " {sha1}")?;
            if let Some(u) = &self.uniquifier {
                write!(f, " {u}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for RepPointer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(' ');
        let bad = || Error::Corrupt(format!("malformed representation pointer {s:?}"));
        let revision: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let offset: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let size: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let expanded_size: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let md5 = parts.next().ok_or_else(bad)?.to_string();
        let sha1 = parts.next().map(str::to_string);
        let uniquifier = match (parts.next(), &sha1) {
            (Some(u), Some(_)) => {
                let (txn_part, suffix_part) = u.split_once('/').ok_or_else(bad)?;
                let txn_id = txn_part.parse()?;
                let suffix = svnfs_core::from_base36(suffix_part)?;
                Some(Uniquifier { txn_id, suffix })
            }
            _ => None,
        };
        Ok(RepPointer {
            revision,
            offset,
            size,
            expanded_size,
            md5,
            sha1,
            uniquifier,
        })
    }
}

impl RepPointer {
    /// Clear the SHA-1 (space saving for directory/property reps; the
    /// rep-sharing index, not the node-revision, is the source of truth
    /// for those — spec.md §4.9 step 4).
    pub fn clear_sha1(&mut self) {
        self.sha1 = None;
        self.uniquifier = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_without_sha1() {
        let p = RepPointer {
            revision: 1,
            offset: 10,
            size: 14,
            expanded_size: 14,
            md5: "fc3ff98e8c6a0d3087d515c0473f8677".into(),
            sha1: None,
            uniquifier: None,
        };
        let s = p.to_string();
        assert_eq!(s.parse::<RepPointer>().unwrap(), p);
    }

    #[test]
    fn roundtrip_with_sha1_and_uniquifier() {
        let p = RepPointer {
            revision: 0,
            offset: 5,
            size: 9,
            expanded_size: 9,
            md5: "deadbeefdeadbeefdeadbeefdeadbeef".into(),
            sha1: Some("da39a3ee5e6b4b0d3255bfef95601890afd80709".into()),
            uniquifier: Some(Uniquifier {
                txn_id: "3-1".parse().unwrap(),
                suffix: 2,
            }),
        };
        let s = p.to_string();
        assert_eq!(s.parse::<RepPointer>().unwrap(), p);
    }
}
