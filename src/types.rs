//! Core data types used throughout the treesum library
//!
//! This module contains the data structures shared by the hash engine, the
//! writers and the verification engine.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Settings**: [`HashAlgorithm`], [`LineEndingPolicy`], [`DigestMode`]
//! - **Recorded state**: [`DigestEntry`], [`DigestScope`]
//! - **Results**: [`DirectoryOutcome`] for generation, [`VerificationResult`]
//!   for verification
//!
//! ## Examples
//!
//! ```rust
//! use treesum::types::{HashAlgorithm, LineEndingPolicy};
//!
//! let algorithm: HashAlgorithm = "SHA256".parse().unwrap();
//! assert_eq!(algorithm, HashAlgorithm::Sha256);
//! assert_eq!(algorithm.hex_len(), 64);
//! assert_eq!(LineEndingPolicy::default(), LineEndingPolicy::Auto);
//! ```

use crate::error::TreesumError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Hash algorithms a digest can be computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5 (32 hex characters)
    Md5,
    /// SHA-1 (40 hex characters)
    Sha1,
    /// SHA-256 (64 hex characters)
    #[default]
    Sha256,
    /// SHA-512 (128 hex characters)
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, in the order tools usually list them
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ];

    /// Lowercase name as written in digest headers and default file names
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Guess the algorithm that produced a hex digest of the given length
    pub fn from_hex_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.hex_len() == len)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = TreesumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == lower || alg.as_str().replace("sha", "sha-") == lower)
            .ok_or_else(|| TreesumError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// How line terminators are treated before hashing text files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndingPolicy {
    /// Normalize text files to `\n`, hash binary files unchanged
    #[default]
    Auto,
    /// Normalize text files to `\n`
    Unix,
    /// Normalize text files to `\r\n`
    Windows,
    /// Never touch file content
    Preserve,
}

impl fmt::Display for LineEndingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LineEndingPolicy::Auto => "auto",
            LineEndingPolicy::Unix => "unix",
            LineEndingPolicy::Windows => "windows",
            LineEndingPolicy::Preserve => "preserve",
        })
    }
}

/// Which digest files a generation run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestMode {
    /// One digest file per directory
    #[default]
    Individual,
    /// A single tree-wide digest file
    Monolithic,
    /// Both of the above
    Both,
}

impl DigestMode {
    /// Whether per-directory files are written
    pub fn writes_individual(&self) -> bool {
        matches!(self, DigestMode::Individual | DigestMode::Both)
    }

    /// Whether a tree-wide file is written
    pub fn writes_monolithic(&self) -> bool {
        matches!(self, DigestMode::Monolithic | DigestMode::Both)
    }
}

/// Scope of a persisted digest file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestScope {
    /// Covers the immediate files of one directory; names carry no separators
    PerDirectory,
    /// Covers a whole tree; names are tree-relative with forward slashes
    TreeWide,
}

/// One file's recorded state, produced when the file is hashed
///
/// Entries are never mutated once written; an update or resume produces new
/// entries that supersede the old ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DigestEntry {
    /// Directory-relative name, or tree-relative path with `/` separators
    pub relative_name: String,
    /// Lowercase hex digest
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Algorithm that produced `hash`
    pub algorithm: HashAlgorithm,
}

/// A file that could not be hashed during generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFailure {
    /// File name within its directory
    pub name: String,
    /// Error description
    pub message: String,
}

/// Result of generating digests for one directory
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryOutcome {
    /// Directory that was processed
    pub directory: PathBuf,
    /// Entries produced, sorted by name
    pub entries: Vec<DigestEntry>,
    /// Files rejected by the include/exclude filter
    pub skipped: usize,
    /// Files that could not be hashed
    pub failures: Vec<FileFailure>,
    /// Total bytes hashed
    pub bytes: u64,
    /// True when the directory was skipped because a previous run completed it
    pub resumed: bool,
    /// True when an update found the stored digests already current
    pub unchanged: bool,
    /// Where the per-directory digest file went, if one was written
    pub digest_file: Option<PathBuf>,
    /// Entries appended to the tree-wide file
    pub monolithic_entries: usize,
    /// Why the per-directory digest file could not be written
    pub write_error: Option<String>,
}

impl DirectoryOutcome {
    /// Empty outcome for a directory about to be processed
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            entries: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
            bytes: 0,
            resumed: false,
            unchanged: false,
            digest_file: None,
            monolithic_entries: 0,
            write_error: None,
        }
    }

    /// Outcome of a directory that resume state marked complete
    pub fn resumed(directory: PathBuf) -> Self {
        Self {
            resumed: true,
            ..Self::new(directory)
        }
    }
}

/// Why a stored entry failed verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The file was hashed and the digest differs
    Mismatch {
        /// Stored digest
        expected: String,
        /// Recomputed digest
        actual: String,
    },
    /// The file exists but could not be hashed
    Io {
        /// Stored digest
        expected: String,
        /// Error description
        message: String,
    },
}

/// A stored entry that did not verify
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedEntry {
    /// Name as recorded in the digest file
    pub name: String,
    /// What went wrong
    #[serde(flatten)]
    pub reason: FailureReason,
}

/// A problem with the digest file itself; no entry in it can be trusted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DigestFileProblem {
    /// No digest file where one was expected
    #[error("No digest file found at {path:?}")]
    NotFound {
        /// Expected location
        path: PathBuf,
    },
    /// The digest file exists but could not be read
    #[error("Cannot read {path:?}: {message}")]
    Unreadable {
        /// Digest file
        path: PathBuf,
        /// Error description
        message: String,
    },
    /// The digest file contains a line that is neither comment nor entry
    #[error("Malformed digest file {path:?} at line {line}: {message}")]
    Malformed {
        /// Digest file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },
}

/// Classification of every entry of one digest file against the disk
///
/// The four lists are disjoint. `error` is set when the digest file itself
/// could not be used, in which case the lists are empty.
#[derive(Debug, Clone, Serialize, Default)]
pub struct VerificationResult {
    /// Directory (per-directory scope) or tree root (tree-wide scope) that was checked
    pub location: PathBuf,
    /// Digest file the stored entries came from
    pub digest_file: Option<PathBuf>,
    /// Entries whose recomputed digest matched
    pub verified: Vec<String>,
    /// Entries whose digest differed or could not be recomputed
    pub failed: Vec<FailedEntry>,
    /// Entries whose file no longer exists
    pub missing: Vec<String>,
    /// Files on disk with no stored entry
    pub extra: Vec<String>,
    /// Top-level problem with the digest file
    pub error: Option<DigestFileProblem>,
    /// Bytes hashed while verifying
    pub bytes: u64,
}

impl VerificationResult {
    /// Create an empty result for a location
    pub fn new(location: PathBuf) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    /// Create a result carrying only a top-level problem
    pub fn with_error(location: PathBuf, problem: DigestFileProblem) -> Self {
        Self {
            location,
            error: Some(problem),
            ..Default::default()
        }
    }

    /// Number of entries the digest file listed
    pub fn expected_count(&self) -> usize {
        self.verified.len() + self.failed.len() + self.missing.len()
    }

    /// Everything verified, nothing missing, no extras, no error
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
            && self.failed.is_empty()
            && self.missing.is_empty()
            && self.extra.is_empty()
    }

    /// Any entry failed or went missing
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.missing.is_empty()
    }

    /// Sort all lists so results are stable regardless of map iteration order
    pub fn sort(&mut self) {
        self.verified.sort();
        self.missing.sort();
        self.extra.sort();
        self.failed.sort_by(|a, b| a.name.cmp(&b.name));
    }
}
