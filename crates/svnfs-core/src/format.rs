//! The `format` file: parsing, writing, and the feature gates it implies.

use crate::error::{Error, Result};
use std::path::Path;

/// Lowest supported format number.
pub const FORMAT_MIN: i32 = 1;

/// Highest supported format number.
pub const FORMAT_MAX: i32 = 8;

/// Format numbers known to be broken intermediate releases; never accepted
/// even though they fall inside `[FORMAT_MIN, FORMAT_MAX]`.
pub const FORMAT_BLACKLIST: &[i32] = &[5];

/// How revisions and revprops are grouped into directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One file per revision directly under `revs/` and `revprops/`.
    Linear,
    /// Revisions grouped into shards of `max_files_per_shard` each.
    Sharded {
        /// Maximum number of revisions per shard directory.
        max_files_per_shard: u32,
    },
}

impl Layout {
    /// The shard directory (relative index) containing revision `rev`, or
    /// `None` for linear layout.
    pub fn shard_of(&self, rev: i64) -> Option<i64> {
        match self {
            Layout::Linear => None,
            Layout::Sharded {
                max_files_per_shard,
            } => Some(rev / (*max_files_per_shard as i64)),
        }
    }
}

/// Feature gates derived once from a parsed format number, so call sites
/// never re-derive them from a raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatFeatures {
    /// The format number these features were derived from.
    pub format: i32,
    /// Node/copy ids are allocated globally rather than per-transaction.
    pub global_id_allocation: bool,
    /// The repository supports sharded layout at all.
    pub supports_sharding: bool,
    /// Proto-revisions live in a dedicated `txn-protorevs/` directory
    /// rather than inside the transaction's own scratch directory.
    pub dedicated_protorevs_dir: bool,
    /// Revisions may be packed into `.pack` shard directories.
    pub packed_revisions: bool,
    /// Rep-sharing (content-addressed dedup) is available.
    pub rep_sharing: bool,
    /// Revision properties may be packed.
    pub packed_revprops: bool,
    /// Directory representations may be deltified.
    pub dir_deltification: bool,
    /// Property representations may be deltified.
    pub prop_deltification: bool,
    /// Delta payloads use `svndiff1` rather than a plain self-delta.
    pub svndiff1: bool,
    /// The `txn-current` allocator file exists (vs. legacy probing).
    pub has_txn_current_file: bool,
}

impl FormatFeatures {
    /// Derive feature gates from a format number.
    pub fn from_format(format: i32) -> Self {
        FormatFeatures {
            format,
            global_id_allocation: format < 3,
            supports_sharding: format >= 2,
            dedicated_protorevs_dir: format >= 7,
            packed_revisions: format >= 6,
            rep_sharing: format >= 4,
            packed_revprops: format >= 6,
            dir_deltification: format >= 4,
            prop_deltification: format >= 4,
            svndiff1: format >= 2,
            has_txn_current_file: format >= 3,
        }
    }
}

/// The parsed contents of a `format` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// The format number (first line).
    pub number: i32,
    /// The on-disk layout implied by subsequent lines.
    pub layout: Layout,
}

impl Format {
    /// Feature gates implied by this format's number.
    pub fn features(&self) -> FormatFeatures {
        FormatFeatures::from_format(self.number)
    }

    /// Validate `number` against the supported range and blacklist.
    pub fn check_supported(number: i32) -> Result<()> {
        if FORMAT_BLACKLIST.contains(&number) || !(FORMAT_MIN..=FORMAT_MAX).contains(&number) {
            return Err(Error::UnsupportedFormat(number));
        }
        Ok(())
    }

    /// Parse a `format` file's contents.
    ///
    /// A missing format file is handled by the caller as legacy format 1;
    /// this function only parses bytes that were actually read.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let mut lines = contents.lines();
        let first = lines.next().unwrap_or("").trim();
        let number: i32 = first.parse().map_err(|_| Error::BadVersionFileFormat {
            path: path.to_path_buf(),
            reason: format!("first line {first:?} is not an integer"),
        })?;
        Self::check_supported(number)?;

        let mut layout = Layout::Linear;
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "layout linear" {
                layout = Layout::Linear;
            } else if let Some(n) = line.strip_prefix("layout sharded ") {
                let max_files_per_shard: u32 =
                    n.trim().parse().map_err(|_| Error::BadVersionFileFormat {
                        path: path.to_path_buf(),
                        reason: format!("bad shard size in {line:?}"),
                    })?;
                layout = Layout::Sharded {
                    max_files_per_shard,
                };
            }
            // Unknown trailing lines are ignored for forward compatibility.
        }

        Ok(Format { number, layout })
    }

    /// Render the on-disk text form.
    pub fn render(&self) -> String {
        let mut s = format!("{}\n", self.number);
        match self.layout {
            Layout::Linear => {}
            Layout::Sharded {
                max_files_per_shard,
            } => {
                s.push_str(&format!("layout sharded {max_files_per_shard}\n"));
            }
        }
        s
    }

    /// The implicit format assumed when no `format` file exists at all.
    pub fn legacy() -> Self {
        Format {
            number: 1,
            layout: Layout::Linear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_linear() {
        let f = Format::parse(&PathBuf::from("format"), "3\n").unwrap();
        assert_eq!(f.number, 3);
        assert_eq!(f.layout, Layout::Linear);
    }

    #[test]
    fn parses_sharded() {
        let f = Format::parse(&PathBuf::from("format"), "6\nlayout sharded 1000\n").unwrap();
        assert_eq!(f.number, 6);
        assert_eq!(
            f.layout,
            Layout::Sharded {
                max_files_per_shard: 1000
            }
        );
    }

    #[test]
    fn rejects_blacklisted() {
        let err = Format::parse(&PathBuf::from("format"), "5\n").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(5)));
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Format::parse(&PathBuf::from("format"), "0\n").is_err());
        assert!(Format::parse(&PathBuf::from("format"), "99\n").is_err());
    }

    #[test]
    fn render_roundtrip() {
        let f = Format {
            number: 6,
            layout: Layout::Sharded {
                max_files_per_shard: 1000,
            },
        };
        let rendered = f.render();
        let parsed = Format::parse(&PathBuf::from("format"), &rendered).unwrap();
        assert_eq!(parsed, f);
    }

    #[test]
    fn shard_of_linear_is_none() {
        assert_eq!(Layout::Linear.shard_of(42), None);
    }

    #[test]
    fn shard_of_sharded() {
        let l = Layout::Sharded {
            max_files_per_shard: 1000,
        };
        assert_eq!(l.shard_of(0), Some(0));
        assert_eq!(l.shard_of(999), Some(0));
        assert_eq!(l.shard_of(1000), Some(1));
    }

    #[test]
    fn feature_gates_monotonic() {
        let f1 = FormatFeatures::from_format(1);
        let f8 = FormatFeatures::from_format(8);
        assert!(!f1.rep_sharing);
        assert!(f8.rep_sharing);
        assert!(!f1.packed_revisions);
        assert!(f8.packed_revisions);
    }
}
