//! Property lists: the skel-encoded `name -> value` maps attached to
//! revisions, transactions, and nodes alike (spec.md §3, §4.4).
//!
//! Property values are opaque byte strings — SVN properties are not
//! guaranteed to be UTF-8 — so callers that want text wrap/unwrap at their
//! own boundary.

use crate::skel::Skel;
use std::collections::BTreeMap;
use svnfs_core::{Error, Result};

/// A property list: ordered by name for deterministic encoding.
pub type PropList = BTreeMap<String, Vec<u8>>;

/// Encode a property list as a skel: `((name1 value1) (name2 value2) ...)`.
pub fn encode(props: &PropList) -> Vec<u8> {
    let pairs = props
        .iter()
        .map(|(k, v)| Skel::list([Skel::atom(k.clone().into_bytes()), Skel::atom(v.clone())]));
    Skel::list(pairs).encode()
}

/// Decode a property list previously produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<PropList> {
    let skel = Skel::parse_complete(bytes)
        .map_err(|e| Error::Corrupt(format!("malformed property list skel: {e}")))?;
    let items = skel
        .as_list()
        .ok_or_else(|| Error::Corrupt("property list skel is not a list".into()))?;
    let mut props = PropList::new();
    for item in items {
        let pair = item
            .as_list()
            .ok_or_else(|| Error::Corrupt("property list entry is not a pair".into()))?;
        let name = pair
            .first()
            .and_then(Skel::as_str)
            .ok_or_else(|| Error::Corrupt("property list entry missing name".into()))?;
        let value = pair
            .get(1)
            .and_then(Skel::as_atom)
            .ok_or_else(|| Error::Corrupt("property list entry missing value".into()))?;
        props.insert(name.to_string(), value.to_vec());
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_empty() {
        let props = PropList::new();
        let bytes = encode(&props);
        assert_eq!(decode(&bytes).unwrap(), props);
    }

    #[test]
    fn roundtrip_several() {
        let mut props = PropList::new();
        props.insert("svn:author".into(), b"jrandom".to_vec());
        props.insert("svn:log".into(), b"fix the thing".to_vec());
        let bytes = encode(&props);
        assert_eq!(decode(&bytes).unwrap(), props);
    }

    #[test]
    fn handles_binary_values() {
        let mut props = PropList::new();
        props.insert("weird".into(), vec![0, 1, 2, b'(', b')', 255]);
        let bytes = encode(&props);
        assert_eq!(decode(&bytes).unwrap(), props);
    }

    #[test]
    fn rejects_malformed_skel() {
        assert!(decode(b"not a skel (").is_err());
    }
}
