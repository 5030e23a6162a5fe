//! Delta encoding for representations: a minimal copy/insert window diff,
//! framed with a version byte so a reader can tolerate more than one
//! on-disk encoding (spec.md §4.5's "two `svndiff` versions" requirement).
//!
//! `DeltaVersion::V0` is the only version this crate ever writes; `V1` is
//! decoded for compatibility with an encoding that stores operand lengths
//! as fixed-width integers instead of varints. Both reconstruct the same
//! logical operation stream: a sequence of [`Op::Copy`] (bytes taken from
//! the base representation) and [`Op::Insert`] (literal bytes carried in
//! the delta itself).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use thiserror::Error;

/// Errors raised while encoding or decoding a delta.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Malformed delta bytes.
    #[error("malformed delta: {0}")]
    Malformed(String),
    /// I/O error reading/writing the delta byte stream.
    #[error("delta I/O error: {0}")]
    Io(#[from] io::Error),
    /// A copy operation referenced bytes past the end of the base.
    #[error("copy op out of range: offset {offset} len {len} base len {base_len}")]
    OutOfRange {
        /// Offset into the base the copy started at.
        offset: u64,
        /// Number of bytes the copy requested.
        len: u64,
        /// Length of the base representation.
        base_len: u64,
    },
}

/// Which on-disk delta encoding a payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaVersion {
    /// Varint-encoded operand lengths. Written by this crate.
    V0,
    /// Fixed-width (8-byte LE) operand lengths. Decoded only.
    V1,
}

impl DeltaVersion {
    /// Parse the one-byte version tag.
    pub fn from_tag(tag: u8) -> Result<Self, DeltaError> {
        match tag {
            0 => Ok(DeltaVersion::V0),
            1 => Ok(DeltaVersion::V1),
            other => Err(DeltaError::Malformed(format!(
                "unknown delta version tag {other}"
            ))),
        }
    }

    /// The one-byte version tag.
    pub fn tag(self) -> u8 {
        match self {
            DeltaVersion::V0 => 0,
            DeltaVersion::V1 => 1,
        }
    }
}

/// A single delta operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Copy `len` bytes starting at `offset` in the base representation.
    Copy {
        /// Byte offset into the base's expanded bytes.
        offset: u64,
        /// Number of bytes to copy.
        len: u64,
    },
    /// Insert literal bytes carried in the delta itself.
    Insert(Vec<u8>),
}

const MIN_MATCH: usize = 8;
const WINDOW: usize = 8;

/// Encode `target` as a delta against `base` (empty for a self-delta).
/// Always produces [`DeltaVersion::V0`] bytes, version-tagged.
pub fn encode(base: &[u8], target: &[u8]) -> Vec<u8> {
    let ops = diff_ops(base, target);
    let mut out = Vec::with_capacity(target.len() / 2 + 8);
    out.push(DeltaVersion::V0.tag());
    for op in ops {
        write_op_v0(&mut out, &op);
    }
    out
}

/// Decode a version-tagged delta payload against `base`, reconstructing
/// the original expanded bytes.
pub fn decode(base: &[u8], payload: &[u8]) -> Result<Vec<u8>, DeltaError> {
    if payload.is_empty() {
        return Err(DeltaError::Malformed("empty delta payload".into()));
    }
    let version = DeltaVersion::from_tag(payload[0])?;
    let ops = match version {
        DeltaVersion::V0 => read_ops_v0(&payload[1..])?,
        DeltaVersion::V1 => read_ops_v1(&payload[1..])?,
    };
    apply_ops(base, &ops)
}

/// Apply a parsed operation stream against `base`.
pub fn apply_ops(base: &[u8], ops: &[Op]) -> Result<Vec<u8>, DeltaError> {
    let mut out = Vec::new();
    for op in ops {
        match op {
            Op::Copy { offset, len } => {
                let end = offset
                    .checked_add(*len)
                    .ok_or(DeltaError::OutOfRange {
                        offset: *offset,
                        len: *len,
                        base_len: base.len() as u64,
                    })?;
                if end > base.len() as u64 {
                    return Err(DeltaError::OutOfRange {
                        offset: *offset,
                        len: *len,
                        base_len: base.len() as u64,
                    });
                }
                out.extend_from_slice(&base[*offset as usize..end as usize]);
            }
            Op::Insert(bytes) => out.extend_from_slice(bytes),
        }
    }
    Ok(out)
}

/// Greedy longest-match diff: index `WINDOW`-byte chunks of `base`, then
/// scan `target` looking up candidate copy sources and extending matches.
fn diff_ops(base: &[u8], target: &[u8]) -> Vec<Op> {
    let mut index: HashMap<&[u8], Vec<usize>> = HashMap::new();
    if base.len() >= WINDOW {
        for i in 0..=(base.len() - WINDOW) {
            index.entry(&base[i..i + WINDOW]).or_default().push(i);
        }
    }

    let mut ops = Vec::new();
    let mut literal_start = 0usize;
    let mut i = 0usize;

    let flush_literal = |ops: &mut Vec<Op>, start: usize, end: usize| {
        if end > start {
            ops.push(Op::Insert(target[start..end].to_vec()));
        }
    };

    while i < target.len() {
        if i + WINDOW > target.len() {
            i += 1;
            continue;
        }
        let key = &target[i..i + WINDOW];
        if let Some(candidates) = index.get(key) {
            let mut best_len = 0usize;
            let mut best_off = 0usize;
            for &cand in candidates.iter().take(8) {
                let mut len = 0usize;
                while cand + len < base.len()
                    && i + len < target.len()
                    && base[cand + len] == target[i + len]
                {
                    len += 1;
                }
                if len > best_len {
                    best_len = len;
                    best_off = cand;
                }
            }
            if best_len >= MIN_MATCH {
                flush_literal(&mut ops, literal_start, i);
                ops.push(Op::Copy {
                    offset: best_off as u64,
                    len: best_len as u64,
                });
                i += best_len;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }
    flush_literal(&mut ops, literal_start, target.len());
    ops
}

fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if n == 0 {
            break;
        }
    }
}

fn read_varint(cursor: &mut Cursor<&[u8]>) -> Result<u64, DeltaError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = cursor
            .read_u8()
            .map_err(|_| DeltaError::Malformed("truncated varint".into()))?;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(DeltaError::Malformed("varint too long".into()));
        }
    }
    Ok(result)
}

const OP_COPY: u8 = 0;
const OP_INSERT: u8 = 1;

fn write_op_v0(out: &mut Vec<u8>, op: &Op) {
    match op {
        Op::Copy { offset, len } => {
            out.push(OP_COPY);
            write_varint(out, *offset);
            write_varint(out, *len);
        }
        Op::Insert(bytes) => {
            out.push(OP_INSERT);
            write_varint(out, bytes.len() as u64);
            out.extend_from_slice(bytes);
        }
    }
}

fn read_ops_v0(bytes: &[u8]) -> Result<Vec<Op>, DeltaError> {
    let mut cursor = Cursor::new(bytes);
    let mut ops = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let tag = cursor
            .read_u8()
            .map_err(|_| DeltaError::Malformed("truncated op tag".into()))?;
        match tag {
            OP_COPY => {
                let offset = read_varint(&mut cursor)?;
                let len = read_varint(&mut cursor)?;
                ops.push(Op::Copy { offset, len });
            }
            OP_INSERT => {
                let len = read_varint(&mut cursor)? as usize;
                let mut buf = vec![0u8; len];
                cursor
                    .read_exact(&mut buf)
                    .map_err(|_| DeltaError::Malformed("truncated insert payload".into()))?;
                ops.push(Op::Insert(buf));
            }
            other => return Err(DeltaError::Malformed(format!("unknown op tag {other}"))),
        }
    }
    Ok(ops)
}

/// V1 decoding: same tag/shape, but operand lengths are fixed 8-byte LE
/// integers rather than varints.
fn read_ops_v1(bytes: &[u8]) -> Result<Vec<Op>, DeltaError> {
    let mut cursor = Cursor::new(bytes);
    let mut ops = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let tag = cursor
            .read_u8()
            .map_err(|_| DeltaError::Malformed("truncated op tag".into()))?;
        match tag {
            OP_COPY => {
                let offset = cursor
                    .read_u64::<LittleEndian>()
                    .map_err(|_| DeltaError::Malformed("truncated copy offset".into()))?;
                let len = cursor
                    .read_u64::<LittleEndian>()
                    .map_err(|_| DeltaError::Malformed("truncated copy len".into()))?;
                ops.push(Op::Copy { offset, len });
            }
            OP_INSERT => {
                let len = cursor
                    .read_u64::<LittleEndian>()
                    .map_err(|_| DeltaError::Malformed("truncated insert len".into()))?
                    as usize;
                let mut buf = vec![0u8; len];
                cursor
                    .read_exact(&mut buf)
                    .map_err(|_| DeltaError::Malformed("truncated insert payload".into()))?;
                ops.push(Op::Insert(buf));
            }
            other => return Err(DeltaError::Malformed(format!("unknown op tag {other}"))),
        }
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_no_base() {
        let target = b"Hello, world!\n".to_vec();
        let delta = encode(b"", &target);
        let out = decode(b"", &delta).unwrap();
        assert_eq!(out, target);
    }

    #[test]
    fn roundtrip_with_shared_prefix() {
        let base = b"The quick brown fox jumps over the lazy dog.".to_vec();
        let target = b"The quick brown fox jumps over the lazy cat.".to_vec();
        let delta = encode(&base, &target);
        let out = decode(&base, &delta).unwrap();
        assert_eq!(out, target);
        // Expect real compression: the delta should be shorter than target.
        assert!(delta.len() < target.len());
    }

    #[test]
    fn roundtrip_identical_content_is_small() {
        let base = vec![b'x'; 4096];
        let target = base.clone();
        let delta = encode(&base, &target);
        assert!(delta.len() < 64);
        let out = decode(&base, &delta).unwrap();
        assert_eq!(out, target);
    }

    #[test]
    fn v1_decoding_tolerated() {
        let base = b"abcdefgh".to_vec();
        let mut payload = vec![DeltaVersion::V1.tag()];
        payload.push(OP_COPY);
        payload.extend_from_slice(&0u64.to_le_bytes());
        payload.extend_from_slice(&8u64.to_le_bytes());
        let out = decode(&base, &payload).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn out_of_range_copy_is_rejected() {
        let base = b"short".to_vec();
        let payload = {
            let mut p = vec![DeltaVersion::V0.tag()];
            write_op_v0(
                &mut p,
                &Op::Copy {
                    offset: 0,
                    len: 100,
                },
            );
            p
        };
        assert!(decode(&base, &payload).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary(
            base in proptest::collection::vec(any::<u8>(), 0..256),
            target in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let delta = encode(&base, &target);
            let out = decode(&base, &delta).unwrap();
            prop_assert_eq!(out, target);
        }
    }
}
