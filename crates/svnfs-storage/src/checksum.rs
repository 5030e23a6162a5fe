//! Running MD5/SHA-1 digests over expanded (never delta-encoded) bytes.
//!
//! Every representation writer keeps one of these alive for the lifetime of
//! the write; every representation pointer stores both digests so a reader
//! can verify round-trip correctness (spec.md §8.3) independent of whatever
//! delta chain reconstructed the bytes.

use md5::{Digest as Md5Digest, Md5};
use sha1::{Digest as Sha1Digest, Sha1};

/// Accumulates MD5 and SHA-1 over a stream of expanded bytes.
#[derive(Default)]
pub struct RunningDigest {
    md5: Md5,
    sha1: Sha1,
    len: u64,
}

impl RunningDigest {
    /// Start a fresh digest.
    pub fn new() -> Self {
        RunningDigest::default()
    }

    /// Feed more expanded bytes into the running digest.
    pub fn update(&mut self, bytes: &[u8]) {
        self.md5.update(bytes);
        self.sha1.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// Total expanded bytes seen so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if no bytes have been fed in yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finalize and return `(md5_hex, sha1_hex)`. Consumes the digest.
    pub fn finalize_hex(self) -> (String, String) {
        let md5_hex = hex_encode(&self.md5.finalize());
        let sha1_hex = hex_encode(&self.sha1.finalize());
        (md5_hex, sha1_hex)
    }
}

/// Compute `(md5_hex, sha1_hex)` over a single byte slice in one call.
pub fn digest_bytes(bytes: &[u8]) -> (String, String) {
    let mut d = RunningDigest::new();
    d.update(bytes);
    d.finalize_hex()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
