//! Representation segments inside a revision file: writing `PLAIN`/`DELTA`
//! framed bytes, and reconstructing a representation by walking its delta
//! chain (spec.md §4.5).
//!
//! ```text
//! PLAIN\n<bytes>ENDREP\n
//! DELTA[ <base-rev> <base-off> <base-len>]\n<svndiff-bytes>ENDREP\n
//! ```

use crate::checksum::RunningDigest;
use crate::svndiff;
use svnfs_core::{Error, Result};

const ENDREP: &[u8] = b"ENDREP\n";

/// A parsed representation segment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentHeader {
    /// Payload is literal expanded bytes.
    Plain,
    /// Payload is an svndiff-encoded delta. `None` base means a
    /// self-delta (diffed against the empty string).
    Delta {
        /// The base representation's location, if any.
        base: Option<BaseLoc>,
    },
}

/// Where a delta's base representation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseLoc {
    /// Base representation's owning revision.
    pub revision: i64,
    /// Base representation's segment offset.
    pub offset: u64,
    /// Base representation's on-disk segment length.
    pub len: u64,
}

impl SegmentHeader {
    fn render(&self) -> String {
        match self {
            SegmentHeader::Plain => "PLAIN\n".to_string(),
            SegmentHeader::Delta { base: None } => "DELTA\n".to_string(),
            SegmentHeader::Delta {
                base: Some(BaseLoc { revision, offset, len }),
            } => format!("DELTA {revision} {offset} {len}\n"),
        }
    }

    fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n');
        if line == "PLAIN" {
            return Ok(SegmentHeader::Plain);
        }
        if line == "DELTA" {
            return Ok(SegmentHeader::Delta { base: None });
        }
        if let Some(rest) = line.strip_prefix("DELTA ") {
            let mut parts = rest.split_whitespace();
            let bad = || Error::Corrupt(format!("malformed representation header {line:?}"));
            let revision: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let offset: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let len: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            return Ok(SegmentHeader::Delta {
                base: Some(BaseLoc {
                    revision,
                    offset,
                    len,
                }),
            });
        }
        Err(Error::Corrupt(format!(
            "malformed representation header {line:?}"
        )))
    }
}

/// The result of writing a representation: what goes into its
/// [`crate::rep::RepPointer`], plus the bytes to append to the revision
/// file.
pub struct WrittenSegment {
    /// Bytes to append to the revision file (header + body + `ENDREP\n`).
    pub bytes: Vec<u8>,
    /// On-disk length of the body alone (excludes header line and
    /// `ENDREP\n`) — this is the representation's `size`.
    pub on_disk_len: u64,
    /// Expanded length of the original content.
    pub expanded_len: u64,
    /// MD5 of the expanded content, hex.
    pub md5: String,
    /// SHA-1 of the expanded content, hex.
    pub sha1: String,
}

/// Frame `content` as a `PLAIN` segment.
pub fn write_plain(content: &[u8]) -> WrittenSegment {
    let mut digest = RunningDigest::new();
    digest.update(content);
    let (md5, sha1) = digest.finalize_hex();

    let header = SegmentHeader::Plain.render();
    let mut bytes = Vec::with_capacity(header.len() + content.len() + ENDREP.len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(content);
    bytes.extend_from_slice(ENDREP);

    WrittenSegment {
        bytes,
        on_disk_len: content.len() as u64,
        expanded_len: content.len() as u64,
        md5,
        sha1,
    }
}

/// Frame `content` as a `DELTA` segment against `base_content` (empty for
/// a self-delta), whose segment location (if any) is `base`.
pub fn write_delta(base_content: &[u8], base: Option<BaseLoc>, content: &[u8]) -> WrittenSegment {
    let mut digest = RunningDigest::new();
    digest.update(content);
    let (md5, sha1) = digest.finalize_hex();

    let body = svndiff::encode(base_content, content);
    let header = SegmentHeader::Delta { base }.render();
    let mut bytes = Vec::with_capacity(header.len() + body.len() + ENDREP.len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(&body);
    bytes.extend_from_slice(ENDREP);

    WrittenSegment {
        bytes,
        on_disk_len: body.len() as u64,
        expanded_len: content.len() as u64,
        md5,
        sha1,
    }
}

/// Anything that can serve up raw bytes from a committed revision's file,
/// or from a transaction's live proto-revision buffer.
pub trait RawByteSource {
    /// Read `len` raw bytes starting at `offset` within `revision`'s file.
    fn read_at(&self, revision: i64, offset: u64, len: u64) -> Result<Vec<u8>>;
}

/// Read a single segment's header and body at `(revision, offset)`, given
/// its already-known on-disk body length `size`.
pub fn read_raw_segment(
    source: &dyn RawByteSource,
    revision: i64,
    offset: u64,
    size: u64,
) -> Result<(SegmentHeader, Vec<u8>)> {
    // Headers are short; 64 bytes comfortably covers "DELTA <rev> <off> <len>\n".
    const MAX_HEADER: u64 = 64;
    let prefix = source.read_at(revision, offset, MAX_HEADER.min(size + MAX_HEADER))?;
    let nl = prefix
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| Error::Corrupt("representation header missing newline".into()))?;
    let header_len = (nl + 1) as u64;
    let header_line = std::str::from_utf8(&prefix[..=nl])
        .map_err(|_| Error::Corrupt("representation header is not valid UTF-8".into()))?;
    let header = SegmentHeader::parse(header_line)?;

    let body = if (prefix.len() as u64) >= header_len + size {
        prefix[header_len as usize..(header_len + size) as usize].to_vec()
    } else {
        source.read_at(revision, offset + header_len, size)?
    };

    let trailer = source.read_at(revision, offset + header_len + size, ENDREP.len() as u64)?;
    if trailer != ENDREP {
        return Err(Error::Corrupt(format!(
            "representation at r{revision}/{offset} missing ENDREP trailer"
        )));
    }

    Ok((header, body))
}

/// Reconstruct the full expanded bytes of the representation at
/// `(revision, offset, size)`, walking its delta chain backward (spec.md
/// §4.5, §4.9's delta-chain-acyclicity invariant).
pub fn reconstruct(
    source: &dyn RawByteSource,
    revision: i64,
    offset: u64,
    size: u64,
) -> Result<Vec<u8>> {
    let (header, body) = read_raw_segment(source, revision, offset, size)?;
    match header {
        SegmentHeader::Plain => Ok(body),
        SegmentHeader::Delta { base: None } => svndiff::decode(&[], &body).map_err(|e| {
            Error::Corrupt(format!("self-delta at r{revision}/{offset} failed: {e}"))
        }),
        SegmentHeader::Delta {
            base:
                Some(BaseLoc {
                    revision: base_rev,
                    offset: base_offset,
                    len: base_len,
                }),
        } => {
            if base_rev > revision || (base_rev == revision && base_offset >= offset) {
                return Err(Error::Corrupt(format!(
                    "delta base r{base_rev}/{base_offset} does not point strictly backward from r{revision}/{offset}"
                )));
            }
            let base_bytes = reconstruct(source, base_rev, base_offset, base_len)?;
            svndiff::decode(&base_bytes, &body)
                .map_err(|e| Error::Corrupt(format!("delta at r{revision}/{offset} failed: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// An in-memory stand-in for a set of revision files, keyed by
    /// revision number, used only by these unit tests.
    struct MemSource {
        files: RefCell<HashMap<i64, Vec<u8>>>,
    }

    impl MemSource {
        fn new() -> Self {
            MemSource {
                files: RefCell::new(HashMap::new()),
            }
        }

        fn append(&self, revision: i64, bytes: &[u8]) -> u64 {
            let mut files = self.files.borrow_mut();
            let file = files.entry(revision).or_default();
            let offset = file.len() as u64;
            file.extend_from_slice(bytes);
            offset
        }
    }

    impl RawByteSource for MemSource {
        fn read_at(&self, revision: i64, offset: u64, len: u64) -> Result<Vec<u8>> {
            let files = self.files.borrow();
            let file = files
                .get(&revision)
                .ok_or_else(|| Error::NoSuchRevision(revision))?;
            let start = offset as usize;
            let end = (start + len as usize).min(file.len());
            Ok(file[start.min(file.len())..end].to_vec())
        }
    }

    #[test]
    fn plain_segment_roundtrip() {
        let source = MemSource::new();
        let content = b"Hello, world!\n";
        let written = write_plain(content);
        let offset = source.append(1, &written.bytes);
        let out = reconstruct(&source, 1, offset, written.on_disk_len).unwrap();
        assert_eq!(out, content);
        assert_eq!(written.md5, "fc3ff98e8c6a0d3087d515c0473f8677");
    }

    #[test]
    fn self_delta_roundtrip() {
        let source = MemSource::new();
        let content = b"some fresh content with no predecessor";
        let written = write_delta(&[], None, content);
        let offset = source.append(3, &written.bytes);
        let out = reconstruct(&source, 3, offset, written.on_disk_len).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn delta_chain_two_revisions() {
        let source = MemSource::new();
        let v1 = b"The quick brown fox jumps over the lazy dog.".to_vec();
        let w1 = write_plain(&v1);
        let off1 = source.append(1, &w1.bytes);

        let v2 = b"The quick brown fox jumps over the lazy cat.".to_vec();
        let base_loc = BaseLoc {
            revision: 1,
            offset: off1,
            len: w1.on_disk_len,
        };
        let w2 = write_delta(&v1, Some(base_loc), &v2);
        let off2 = source.append(2, &w2.bytes);

        let out1 = reconstruct(&source, 1, off1, w1.on_disk_len).unwrap();
        assert_eq!(out1, v1);
        let out2 = reconstruct(&source, 2, off2, w2.on_disk_len).unwrap();
        assert_eq!(out2, v2);
    }

    #[test]
    fn rejects_missing_endrep() {
        let source = MemSource::new();
        source.append(1, b"PLAIN\nhello"); // no ENDREP
        let err = reconstruct(&source, 1, 0, 5).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn rejects_forward_pointing_base() {
        let source = MemSource::new();
        let header = "DELTA 5 0 3\n";
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&svndiff::encode(b"abc", b"abc"));
        bytes.extend_from_slice(ENDREP);
        let size = (bytes.len() - header.len() - ENDREP.len()) as u64;
        let offset = source.append(2, &bytes);
        let err = reconstruct(&source, 2, offset, size).unwrap_err();
        assert!(err.is_corrupt());
    }
}
