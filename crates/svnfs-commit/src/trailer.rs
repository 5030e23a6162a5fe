//! The revision file's trailer: the final line recording where the root
//! node-revision and the changed-paths list start (spec.md §4.1, §4.9 step
//! 5).
//!
//! ```text
//! <root-noderev-offset> <changed-paths-offset>\n
//! ```
//!
//! Everything before this line is either a node-revision record, a
//! representation segment, or the changed-paths list itself; the trailer
//! is what lets a reader jump straight to the root without scanning the
//! whole file.

use svnfs_core::{Error, Result};

/// Render the trailer line.
pub fn encode(root_offset: u64, changed_paths_offset: u64) -> Vec<u8> {
    format!("{root_offset} {changed_paths_offset}\n").into_bytes()
}

/// Parse `(root_offset, changed_paths_offset)` out of a revision file's
/// trailing bytes (typically its last line).
///
/// Only the trailer line itself is decoded as UTF-8. Everything before it is
/// raw representation data — svndiff ops and PLAIN content can contain any
/// byte value — so this walks the buffer backwards by raw bytes to find the
/// last non-empty line instead of decoding the whole file as text.
pub fn parse(bytes: &[u8]) -> Result<(u64, u64)> {
    let start = trailer_start(bytes)?;
    let line = std::str::from_utf8(&bytes[start..])
        .map_err(|_| Error::Corrupt("revision trailer is not valid UTF-8".into()))?;
    let (root, changed) = line
        .trim_end_matches(['\n', '\r'])
        .split_once(' ')
        .ok_or_else(|| Error::Corrupt(format!("malformed revision trailer {line:?}")))?;
    let root_offset: u64 = root
        .parse()
        .map_err(|_| Error::Corrupt(format!("malformed revision trailer {line:?}")))?;
    let changed_paths_offset: u64 = changed
        .parse()
        .map_err(|_| Error::Corrupt(format!("malformed revision trailer {line:?}")))?;
    Ok((root_offset, changed_paths_offset))
}

/// Byte offset where the trailer line itself begins — the same line
/// [`parse`] reads. Lets a reader slice out everything before it (the
/// changed-paths section) without re-scanning the file a second time.
///
/// Scans backwards over raw bytes rather than decoding the buffer as UTF-8:
/// the representation data preceding the trailer is arbitrary binary.
pub fn trailer_start(bytes: &[u8]) -> Result<usize> {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
    }
    if end == 0 {
        return Err(Error::Corrupt("revision file has no trailer".into()));
    }
    let start = match bytes[..end].iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => 0,
    };
    Ok(start)
}
