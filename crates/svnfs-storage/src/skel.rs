//! The skel format: a simple parenthesized tagged record encoding.
//!
//! A skel is either an atom (a length-prefixed byte string) or a list of
//! skels wrapped in parentheses. This is the byte-level encoding every
//! implementation of the node-revision store must agree on (spec.md §4.4).
//!
//! Grammar (whitespace between siblings is a single space; no whitespace is
//! emitted inside an atom's own bytes):
//!
//! ```text
//! skel   := atom | list
//! atom   := bare-word | <len> ' ' <len-bytes>
//! list   := '(' (skel (' ' skel)*)? ')'
//! ```
//!
//! `bare-word` is used for short printable atoms with no embedded
//! whitespace/parens, purely to keep the common case human-readable; the
//! length-prefixed form is always accepted and is what binary payloads use.

use std::fmt;

/// A single skel node: an atom (opaque bytes) or an ordered list of skels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skel {
    /// An opaque byte string.
    Atom(Vec<u8>),
    /// An ordered list of child skels.
    List(Vec<Skel>),
}

/// Errors raised while parsing a skel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkelError {
    /// Input ended before a well-formed skel was parsed.
    #[error("truncated skel")]
    Truncated,
    /// A length prefix did not parse as a non-negative integer.
    #[error("malformed length prefix at byte {0}")]
    BadLength(usize),
    /// Unbalanced parentheses.
    #[error("unbalanced parentheses")]
    Unbalanced,
    /// Trailing bytes after a complete top-level skel.
    #[error("trailing bytes after skel")]
    TrailingBytes,
}

impl Skel {
    /// Build an atom from anything convertible to bytes.
    pub fn atom(bytes: impl Into<Vec<u8>>) -> Self {
        Skel::Atom(bytes.into())
    }

    /// Build an atom holding the decimal text form of `n`.
    pub fn int(n: i64) -> Self {
        Skel::atom(n.to_string().into_bytes())
    }

    /// Build a list from an iterator of skels.
    pub fn list(items: impl IntoIterator<Item = Skel>) -> Self {
        Skel::List(items.into_iter().collect())
    }

    /// View this skel as an atom's bytes.
    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            Skel::Atom(b) => Some(b),
            Skel::List(_) => None,
        }
    }

    /// View this skel as a UTF-8 atom string.
    pub fn as_str(&self) -> Option<&str> {
        self.as_atom().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Parse this skel's atom as a decimal integer.
    pub fn as_int(&self) -> Option<i64> {
        self.as_str()?.parse().ok()
    }

    /// View this skel as a list of children.
    pub fn as_list(&self) -> Option<&[Skel]> {
        match self {
            Skel::List(items) => Some(items),
            Skel::Atom(_) => None,
        }
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Skel::Atom(bytes) => {
                if is_bare_word(bytes) {
                    out.extend_from_slice(bytes);
                } else {
                    out.extend_from_slice(bytes.len().to_string().as_bytes());
                    out.push(b' ');
                    out.extend_from_slice(bytes);
                }
            }
            Skel::List(items) => {
                out.push(b'(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.encode_into(out);
                }
                out.push(b')');
            }
        }
    }

    /// Parse a skel from the start of `input`; returns the skel and the
    /// number of bytes consumed. Does not require the whole input to be
    /// consumed (callers that want the whole-buffer form should use
    /// [`Skel::parse_complete`]).
    pub fn parse(input: &[u8]) -> Result<(Skel, usize), SkelError> {
        let mut pos = 0;
        let skel = parse_one(input, &mut pos)?;
        Ok((skel, pos))
    }

    /// Parse a skel that must consume the entire buffer.
    pub fn parse_complete(input: &[u8]) -> Result<Skel, SkelError> {
        let (skel, consumed) = Self::parse(input)?;
        if consumed != input.len() {
            return Err(SkelError::TrailingBytes);
        }
        Ok(skel)
    }
}

fn is_bare_word(bytes: &[u8]) -> bool {
    !bytes.is_empty()
        && bytes.len() < 256
        && bytes
            .iter()
            .all(|&b| b.is_ascii_graphic() && b != b'(' && b != b')')
        && !bytes[0].is_ascii_digit()
}

fn parse_one(input: &[u8], pos: &mut usize) -> Result<Skel, SkelError> {
    skip_ws(input, pos);
    match input.get(*pos) {
        None => Err(SkelError::Truncated),
        Some(b'(') => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                skip_ws(input, pos);
                match input.get(*pos) {
                    Some(b')') => {
                        *pos += 1;
                        return Ok(Skel::List(items));
                    }
                    None => return Err(SkelError::Unbalanced),
                    _ => items.push(parse_one(input, pos)?),
                }
            }
        }
        Some(b')') => Err(SkelError::Unbalanced),
        Some(b) if b.is_ascii_digit() => parse_length_prefixed(input, pos),
        Some(_) => parse_bare_word(input, pos),
    }
}

fn skip_ws(input: &[u8], pos: &mut usize) {
    while matches!(input.get(*pos), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
        *pos += 1;
    }
}

fn parse_length_prefixed(input: &[u8], pos: &mut usize) -> Result<Skel, SkelError> {
    let start = *pos;
    while matches!(input.get(*pos), Some(b) if b.is_ascii_digit()) {
        *pos += 1;
    }
    let len_str =
        std::str::from_utf8(&input[start..*pos]).map_err(|_| SkelError::BadLength(start))?;
    let len: usize = len_str.parse().map_err(|_| SkelError::BadLength(start))?;
    if input.get(*pos) != Some(&b' ') {
        return Err(SkelError::BadLength(start));
    }
    *pos += 1;
    let end = pos.checked_add(len).ok_or(SkelError::BadLength(start))?;
    let bytes = input.get(*pos..end).ok_or(SkelError::Truncated)?.to_vec();
    *pos = end;
    Ok(Skel::Atom(bytes))
}

fn parse_bare_word(input: &[u8], pos: &mut usize) -> Result<Skel, SkelError> {
    let start = *pos;
    while matches!(input.get(*pos), Some(&b) if b.is_ascii_graphic() && b != b'(' && b != b')') {
        *pos += 1;
    }
    if *pos == start {
        return Err(SkelError::Truncated);
    }
    Ok(Skel::Atom(input[start..*pos].to_vec()))
}

impl fmt::Display for Skel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "<{} bytes>", self.encode().len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_bare_word() {
        let s = Skel::atom(b"file".to_vec());
        assert_eq!(s.encode(), b"file");
    }

    #[test]
    fn encode_length_prefixed_for_binary() {
        let s = Skel::atom(vec![0, 1, 2, b'(', b')']);
        let encoded = s.encode();
        assert_eq!(encoded, b"5 \x00\x01\x02()");
    }

    #[test]
    fn roundtrip_nested_list() {
        let s = Skel::list([
            Skel::atom(b"file".to_vec()),
            Skel::int(3),
            Skel::list([Skel::atom(b"a".to_vec()), Skel::atom(b"b".to_vec())]),
        ]);
        let encoded = s.encode();
        let parsed = Skel::parse_complete(&encoded).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(matches!(
            Skel::parse_complete(b"(a b"),
            Err(SkelError::Unbalanced)
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(matches!(
            Skel::parse_complete(b"(a) extra"),
            Err(SkelError::TrailingBytes)
        ));
    }

    #[test]
    fn parses_empty_list() {
        let s = Skel::parse_complete(b"()").unwrap();
        assert_eq!(s, Skel::List(vec![]));
    }

    #[test]
    fn as_int_roundtrip() {
        let s = Skel::int(-42);
        assert_eq!(s.as_int(), Some(-42));
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_atoms(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            if bytes.is_empty() {
                return Ok(());
            }
            let s = Skel::atom(bytes);
            let encoded = s.encode();
            let parsed = Skel::parse_complete(&encoded).unwrap();
            prop_assert_eq!(parsed, s);
        }
    }
}
