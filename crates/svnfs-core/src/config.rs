//! `fsfs.conf`: the INI-style configuration file (spec.md §6).
//!
//! A hand-rolled section/key parser, matching the teacher's
//! `DatabaseConfig` convention of a small parser purpose-built for its own
//! file format rather than a general TOML/YAML layer reinterpreting what
//! the spec defines as INI. Unknown sections and unknown keys within
//! recognized sections are ignored for forward compatibility (spec.md §9).

use std::collections::HashMap;
use std::fmt::Write as _;

/// Parsed `fsfs.conf` contents: the full recognized option set from
/// spec.md §6.
#[derive(Debug, Clone, PartialEq)]
pub struct FsfsConfig {
    /// `[rep-sharing] enable-rep-sharing`.
    pub enable_rep_sharing: bool,
    /// `[deltification] enable-dir-deltification`.
    pub enable_dir_deltification: bool,
    /// `[deltification] enable-props-deltification`.
    pub enable_props_deltification: bool,
    /// `[deltification] max-deltification-walk`.
    pub max_deltification_walk: u64,
    /// `[deltification] max-linear-deltification`.
    pub max_linear_deltification: u64,
    /// `[packed-revprops] revprop-pack-size` (bytes).
    pub revprop_pack_size: u64,
    /// `[packed-revprops] compress-packed-revprops`.
    pub compress_packed_revprops: bool,
    /// `[caches] fail-stop` — when true, cache errors are no longer
    /// silently ignored (spec.md §7).
    pub fail_stop: bool,
    /// `[memcached-servers]` raw key/value pairs, passed through
    /// unvalidated — an external cache's own concern (spec.md §1
    /// non-goals).
    pub memcached_servers: HashMap<String, String>,
}

impl Default for FsfsConfig {
    fn default() -> Self {
        FsfsConfig {
            enable_rep_sharing: true,
            enable_dir_deltification: true,
            enable_props_deltification: true,
            max_deltification_walk: 1023,
            max_linear_deltification: 16,
            revprop_pack_size: 64 * 1024,
            compress_packed_revprops: true,
            fail_stop: false,
            memcached_servers: HashMap::new(),
        }
    }
}

impl FsfsConfig {
    /// Parse an INI-style `fsfs.conf`. Missing sections/keys keep their
    /// default values; unrecognized sections and keys are ignored.
    pub fn parse(contents: &str) -> Self {
        let mut cfg = FsfsConfig::default();
        let mut section = String::new();

        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match section.as_str() {
                "rep-sharing" => {
                    if key == "enable-rep-sharing" {
                        cfg.enable_rep_sharing = parse_bool(value, cfg.enable_rep_sharing);
                    }
                }
                "deltification" => match key {
                    "enable-dir-deltification" => {
                        cfg.enable_dir_deltification = parse_bool(value, cfg.enable_dir_deltification);
                    }
                    "enable-props-deltification" => {
                        cfg.enable_props_deltification =
                            parse_bool(value, cfg.enable_props_deltification);
                    }
                    "max-deltification-walk" => {
                        cfg.max_deltification_walk =
                            value.parse().unwrap_or(cfg.max_deltification_walk);
                    }
                    "max-linear-deltification" => {
                        cfg.max_linear_deltification =
                            value.parse().unwrap_or(cfg.max_linear_deltification);
                    }
                    _ => {}
                },
                "packed-revprops" => match key {
                    "revprop-pack-size" => {
                        cfg.revprop_pack_size = value.parse().unwrap_or(cfg.revprop_pack_size);
                    }
                    "compress-packed-revprops" => {
                        cfg.compress_packed_revprops =
                            parse_bool(value, cfg.compress_packed_revprops);
                    }
                    _ => {}
                },
                "caches" => {
                    if key == "fail-stop" {
                        cfg.fail_stop = parse_bool(value, cfg.fail_stop);
                    }
                }
                "memcached-servers" => {
                    cfg.memcached_servers.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }
        cfg
    }

    /// Render back to INI text. Used when creating a fresh repository with
    /// explicit defaults written out (matches the teacher's pattern of
    /// writing a commented default config on `create`).
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[rep-sharing]");
        let _ = writeln!(out, "enable-rep-sharing = {}", self.enable_rep_sharing);
        let _ = writeln!(out);
        let _ = writeln!(out, "[deltification]");
        let _ = writeln!(
            out,
            "enable-dir-deltification = {}",
            self.enable_dir_deltification
        );
        let _ = writeln!(
            out,
            "enable-props-deltification = {}",
            self.enable_props_deltification
        );
        let _ = writeln!(
            out,
            "max-deltification-walk = {}",
            self.max_deltification_walk
        );
        let _ = writeln!(
            out,
            "max-linear-deltification = {}",
            self.max_linear_deltification
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "[packed-revprops]");
        let _ = writeln!(out, "revprop-pack-size = {}", self.revprop_pack_size);
        let _ = writeln!(
            out,
            "compress-packed-revprops = {}",
            self.compress_packed_revprops
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "[caches]");
        let _ = writeln!(out, "fail-stop = {}", self.fail_stop);
        out
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let cfg = FsfsConfig::parse("");
        assert_eq!(cfg, FsfsConfig::default());
    }

    #[test]
    fn parses_recognized_sections() {
        let text = "\
[rep-sharing]
enable-rep-sharing = false

[deltification]
max-deltification-walk = 500
max-linear-deltification = 8
";
        let cfg = FsfsConfig::parse(text);
        assert!(!cfg.enable_rep_sharing);
        assert_eq!(cfg.max_deltification_walk, 500);
        assert_eq!(cfg.max_linear_deltification, 8);
    }

    #[test]
    fn ignores_unknown_sections_and_keys() {
        let text = "\
[totally-unknown]
whatever = 1

[rep-sharing]
enable-rep-sharing = true
made-up-key = 1
";
        let cfg = FsfsConfig::parse(text);
        assert!(cfg.enable_rep_sharing);
    }

    #[test]
    fn render_parse_roundtrip() {
        let cfg = FsfsConfig {
            enable_rep_sharing: false,
            max_linear_deltification: 32,
            ..FsfsConfig::default()
        };
        let rendered = cfg.render();
        let parsed = FsfsConfig::parse(&rendered);
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn memcached_servers_passed_through() {
        let text = "[memcached-servers]\ncache1 = 127.0.0.1:11211\n";
        let cfg = FsfsConfig::parse(text);
        assert_eq!(
            cfg.memcached_servers.get("cache1").map(String::as_str),
            Some("127.0.0.1:11211")
        );
    }
}
