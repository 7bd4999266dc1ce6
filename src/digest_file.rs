//! Digest file model and its two on-disk formats
//!
//! ## Per-directory file
//!
//! Stored under the reserved name [`SHASUM_FILENAME`] inside each directory
//! (or in the mirrored shadow directory):
//!
//! ```text
//! # Treesum checksum file v0.3.0 - sha256 - 2026-01-01T12:00:00Z
//! 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  a.txt
//! 486ea46224d1bb4fb680f34f7c9ad96a8f24ec88be73ea8e5a6c65260e9cb8a7  b.txt
//! # End of checksums
//! ```
//!
//! ## Tree-wide (monolithic) file
//!
//! ```text
//! # Treesum monolithic checksum file v0.3.0 - sha256 - 2026-01-01T12:00:00Z
//! # Root directory: /data/photos
//! 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  2024/a.jpg
//! # End of checksums
//! ```
//!
//! Data lines are `sha256sum` compatible: hex digest, two spaces, name.
//! Comment lines start with `#`.

use crate::error::{Result, TreesumError};
use crate::types::{DigestEntry, DigestScope, HashAlgorithm};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Reserved per-directory digest file name
pub const SHASUM_FILENAME: &str = ".shasum";

/// Stem of the default tree-wide file name (`checksums.<alg>`)
pub const MONOLITHIC_DEFAULT_NAME: &str = "checksums";

/// Line terminating every well-formed digest file
pub const END_MARKER: &str = "# End of checksums";

/// Tool identity written into headers
pub const TOOL_NAME: &str = "Treesum";

/// Header timestamp format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Prefix of the tree-wide root comment
const ROOT_PREFIX: &str = "# Root directory: ";

/// Number of leading lines inspected by [`is_monolithic_content`]
const DETECTION_LINES: usize = 11;

/// Upper bound on bytes read while detecting the format
const DETECTION_BYTES: u64 = 64 * 1024;

/// Well-known tree-wide file names checked after [`SHASUM_FILENAME`]
const WELL_KNOWN_NAMES: &[&str] = &["checksums", "CHECKSUMS", "SHA256SUMS", "MD5SUMS", "SHA1SUMS", "SHA512SUMS"];

/// Default tree-wide file name for an algorithm
pub fn default_monolithic_name(algorithm: HashAlgorithm) -> String {
    format!("{}.{}", MONOLITHIC_DEFAULT_NAME, algorithm.as_str())
}

/// Format a header timestamp
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// A parsed digest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestFile {
    /// Per-directory or tree-wide
    pub scope: DigestScope,
    /// Root recorded in a tree-wide header; informational only
    pub root_path: Option<PathBuf>,
    /// Algorithm named in the header
    pub algorithm: Option<HashAlgorithm>,
    /// Timestamp from the header
    pub created_at: Option<DateTime<Utc>>,
    /// Stored name to lowercase hex digest
    pub entries: BTreeMap<String, String>,
    /// Whether the end marker was the last non-empty line
    pub complete: bool,
}

impl DigestFile {
    /// Read and strictly parse a digest file
    ///
    /// # Errors
    ///
    /// [`TreesumError::FileRead`] if the file cannot be read,
    /// [`TreesumError::DigestParse`] on the first malformed line.
    pub fn read(path: &Path) -> Result<Self> {
        let content = read_text(path)?;
        Self::parse(&content, path)
    }

    /// Strictly parse digest file content; `path` is used for error context
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        Self::parse_inner(content, path, true)
    }

    /// Parse, silently dropping malformed lines
    pub fn parse_lenient(content: &str, path: &Path) -> Self {
        // Lenient parsing never produces an error.
        Self::parse_inner(content, path, false).unwrap_or_else(|_| Self::empty(DigestScope::PerDirectory))
    }

    fn empty(scope: DigestScope) -> Self {
        Self {
            scope,
            root_path: None,
            algorithm: None,
            created_at: None,
            entries: BTreeMap::new(),
            complete: false,
        }
    }

    fn parse_inner(content: &str, path: &Path, strict: bool) -> Result<Self> {
        let mut file = Self::empty(if is_monolithic_content(content) {
            DigestScope::TreeWide
        } else {
            DigestScope::PerDirectory
        });

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            file.complete = false;

            if line.starts_with('#') {
                if line.trim() == END_MARKER {
                    file.complete = true;
                } else if let Some(root) = line.strip_prefix(ROOT_PREFIX) {
                    file.root_path = Some(PathBuf::from(root.trim()));
                } else if idx == 0 || file.algorithm.is_none() {
                    file.read_header(line);
                }
                continue;
            }

            match parse_data_line(line, file.algorithm) {
                Ok((hash, name)) => {
                    file.entries.insert(name.to_string(), hash);
                }
                Err(message) if strict => {
                    return Err(TreesumError::DigestParse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        message,
                    });
                }
                Err(message) => trace!("Ignoring line {} of {:?}: {}", idx + 1, path, message),
            }
        }

        Ok(file)
    }

    fn read_header(&mut self, line: &str) {
        let mut parts = line.split(" - ").skip(1);
        if let Some(alg) = parts.next().and_then(|a| a.parse().ok()) {
            self.algorithm = Some(alg);
        }
        if let Some(ts) = parts.next() {
            if let Ok(naive) = NaiveDateTime::parse_from_str(ts.trim(), TIMESTAMP_FORMAT) {
                self.created_at = Some(naive.and_utc());
            }
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no stored entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Algorithm to verify with: header, then hash length, then `fallback`
    pub fn effective_algorithm(&self, fallback: HashAlgorithm) -> HashAlgorithm {
        self.algorithm
            .or_else(|| {
                self.entries
                    .values()
                    .next()
                    .and_then(|hash| HashAlgorithm::from_hex_len(hash.len()))
            })
            .unwrap_or(fallback)
    }
}

/// Split a data line into lowercase hash and name
fn parse_data_line(line: &str, algorithm: Option<HashAlgorithm>) -> std::result::Result<(String, &str), String> {
    let (hash, name) = line
        .split_once("  ")
        .or_else(|| line.split_once(" *"))
        .ok_or_else(|| "expected '<hash>  <name>'".to_string())?;

    let hash = hash.trim();
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not a hex digest", hash));
    }
    if let Some(alg) = algorithm {
        if hash.len() != alg.hex_len() {
            return Err(format!(
                "digest length {} does not match {} ({})",
                hash.len(),
                alg,
                alg.hex_len()
            ));
        }
    }
    if name.is_empty() {
        return Err("missing file name".to_string());
    }
    Ok((hash.to_ascii_lowercase(), name))
}

/// Read a digest file as UTF-8, replacing invalid sequences
pub(crate) fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| TreesumError::file_read(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// One data line, `hash  name`
pub fn format_entry_line(hash: &str, name: &str) -> String {
    format!("{}  {}\n", hash, name)
}

/// Header line of a per-directory file
pub fn individual_header(algorithm: HashAlgorithm, now: DateTime<Utc>) -> String {
    format!(
        "# {} checksum file v{} - {} - {}\n",
        TOOL_NAME,
        env!("CARGO_PKG_VERSION"),
        algorithm,
        format_timestamp(now)
    )
}

/// Header lines of a tree-wide file
pub fn monolithic_header(algorithm: HashAlgorithm, root: &Path, now: DateTime<Utc>) -> String {
    format!(
        "# {} monolithic checksum file v{} - {} - {}\n{}{}\n",
        TOOL_NAME,
        env!("CARGO_PKG_VERSION"),
        algorithm,
        format_timestamp(now),
        ROOT_PREFIX,
        root.display()
    )
}

/// Complete per-directory file content, entries sorted by name
pub fn render_individual(entries: &[DigestEntry], algorithm: HashAlgorithm, now: DateTime<Utc>) -> String {
    let mut sorted: Vec<&DigestEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.relative_name.cmp(&b.relative_name));

    let mut out = individual_header(algorithm, now);
    for entry in sorted {
        out.push_str(&format_entry_line(&entry.hash, &entry.relative_name));
    }
    let _ = writeln!(out, "{}", END_MARKER);
    out
}

/// Whether digest file content is in tree-wide format
///
/// Inspects the leading lines only: a comment mentioning `monolithic` or
/// `root directory:` decides it, otherwise the first data line's name is
/// checked for a path separator.
pub fn is_monolithic_content(content: &str) -> bool {
    for line in content.lines().take(DETECTION_LINES) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            let lower = line.to_lowercase();
            if lower.contains("monolithic") || lower.contains("root directory:") {
                return true;
            }
            continue;
        }
        return match line.split_once("  ") {
            Some((_, name)) => name.contains('/') || name.contains('\\'),
            None => false,
        };
    }
    false
}

/// Whether the file at `path` is a tree-wide digest file
///
/// Only the leading lines are read. Unreadable files are not.
pub fn is_monolithic_file(path: &Path) -> bool {
    match read_head(path) {
        Ok(head) => is_monolithic_content(&head),
        Err(e) => {
            trace!("Cannot inspect {:?}: {}", path, e);
            false
        }
    }
}

/// The first [`DETECTION_LINES`] lines of a file, decoded lossily
fn read_head(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file).take(DETECTION_BYTES);
    let mut head = Vec::new();
    for _ in 0..DETECTION_LINES {
        if reader.read_until(b'\n', &mut head)? == 0 {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// Find the digest file to verify `dir` with
///
/// Order: [`SHASUM_FILENAME`]; `checksums.<alg>` for every algorithm and the
/// well-known `*SUMS` names; then any file whose name ends in a hash
/// extension or contains `checksum`/`hash`. Candidates after the first must
/// be in tree-wide format.
pub fn auto_detect(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let shasum = dir.join(SHASUM_FILENAME);
    if shasum.is_file() {
        return Some(shasum);
    }

    let named = HashAlgorithm::ALL
        .iter()
        .map(|alg| default_monolithic_name(*alg))
        .chain(WELL_KNOWN_NAMES.iter().map(|n| n.to_string()));
    for name in named {
        let candidate = dir.join(name);
        if candidate.is_file() && is_monolithic_file(&candidate) {
            return Some(candidate);
        }
    }

    let mut others: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    others.sort();
    others.into_iter().find(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let looks_like = [".sha256", ".sha1", ".sha512", ".md5"]
            .iter()
            .any(|ext| name.ends_with(ext))
            || name.contains("checksum")
            || name.contains("hash");
        looks_like && is_monolithic_file(path)
    })
}
