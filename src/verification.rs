//! Digest verification
//!
//! The verifier compares stored digests against the files on disk and sorts
//! every stored entry into exactly one of *verified*, *failed* or *missing*.
//! Files on disk that pass the filter but have no stored entry are *extra*.
//!
//! ## Overview
//!
//! Verification works at two scopes:
//!
//! 1. **Per-directory**: a `.shasum` describes the immediate files of one
//!    directory; extras come from listing that directory.
//! 2. **Tree-wide**: a monolithic file describes a whole tree. Stored paths
//!    are resolved under the directory being verified, never under the root
//!    recorded in the file's header. Verifying a copy of a tree at another
//!    location ("clone verification") needs no extra options.
//!
//! A digest file that is missing, unreadable or malformed yields a result
//! carrying only a top-level [`DigestFileProblem`]: no entry of a malformed
//! file is trusted.
//!
//! ## Usage
//!
//! ```rust
//! use treesum::filter::FileFilter;
//! use treesum::hasher::Hasher;
//! use treesum::types::{HashAlgorithm, LineEndingPolicy};
//! use treesum::verification::DigestVerifier;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! std::fs::write(dir.path().join("a.txt"), "hello")?;
//! std::fs::write(
//!     dir.path().join(".shasum"),
//!     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  a.txt\n",
//! )?;
//!
//! let hasher = Hasher::new(HashAlgorithm::Sha256, LineEndingPolicy::Auto);
//! let filter = FileFilter::allow_all();
//! let verifier = DigestVerifier::new(&hasher, &filter);
//! let result = verifier.verify_directory(dir.path(), &dir.path().join(".shasum"));
//! assert_eq!(result.verified, vec!["a.txt"]);
//! assert!(result.is_clean());
//! # Ok(())
//! # }
//! ```

use crate::digest_file::DigestFile;
use crate::error::TreesumError;
use crate::filter::FileFilter;
use crate::hasher::Hasher;
use crate::types::{DigestFileProblem, FailedEntry, FailureReason, VerificationResult};
use crate::utils::{resolve_stored_name, tree_relative_name};
use crate::walker::{WalkOptions, Walker};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl DigestFileProblem {
    /// Classify an error raised while loading a digest file
    pub fn from_error(path: &Path, err: TreesumError) -> Self {
        match err {
            TreesumError::FileRead { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                DigestFileProblem::NotFound {
                    path: path.to_path_buf(),
                }
            }
            TreesumError::DigestParse { path, line, message } => {
                DigestFileProblem::Malformed { path, line, message }
            }
            TreesumError::FileRead { source, .. } => DigestFileProblem::Unreadable {
                path: path.to_path_buf(),
                message: source.to_string(),
            },
            other => DigestFileProblem::Unreadable {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        }
    }
}

/// Compares stored digests with the disk
///
/// Borrows the hash engine and the filter used for generation so that the
/// same files are considered on both sides.
#[derive(Debug, Clone, Copy)]
pub struct DigestVerifier<'a> {
    hasher: &'a Hasher,
    filter: &'a FileFilter,
}

impl<'a> DigestVerifier<'a> {
    /// Create a verifier
    pub fn new(hasher: &'a Hasher, filter: &'a FileFilter) -> Self {
        Self { hasher, filter }
    }

    /// Verify the files of `dir` against the per-directory file `digest_path`
    ///
    /// `digest_path` may live in a shadow tree; files are always resolved in
    /// `dir`.
    pub fn verify_directory(&self, dir: &Path, digest_path: &Path) -> VerificationResult {
        let digest = match load(digest_path) {
            Ok(digest) => digest,
            Err(problem) => return VerificationResult::with_error(dir.to_path_buf(), problem),
        };

        let mut result = VerificationResult::new(dir.to_path_buf());
        result.digest_file = Some(digest_path.to_path_buf());
        self.check_entries(&digest, |name| dir.join(name), &mut result);

        match list_files(dir) {
            Ok(files) => {
                for (name, path) in files {
                    if !digest.entries.contains_key(&name)
                        && path != digest_path
                        && self.filter.should_include(&path)
                    {
                        result.extra.push(name);
                    }
                }
            }
            Err(e) => warn!("Cannot list {:?} for extra files: {}", dir, e),
        }

        result.sort();
        debug!(
            "Verified {:?}: {} ok, {} failed, {} missing, {} extra",
            dir,
            result.verified.len(),
            result.failed.len(),
            result.missing.len(),
            result.extra.len()
        );
        result
    }

    /// Verify a whole tree against the tree-wide file `digest_path`
    ///
    /// Stored paths resolve under `root`. When `extra` is given, the tree is
    /// walked with those options to find files missing from the digest file.
    pub fn verify_tree(&self, root: &Path, digest_path: &Path, extra: Option<&WalkOptions>) -> VerificationResult {
        let digest = match load(digest_path) {
            Ok(digest) => digest,
            Err(problem) => return VerificationResult::with_error(root.to_path_buf(), problem),
        };

        if let Some(recorded) = &digest.root_path {
            if !same_location(recorded, root) {
                info!(
                    "Clone verification: digests recorded for {:?}, verifying {:?}",
                    recorded, root
                );
            }
        }

        let mut result = VerificationResult::new(root.to_path_buf());
        result.digest_file = Some(digest_path.to_path_buf());
        self.check_entries(&digest, |name| resolve_stored_name(root, name), &mut result);

        if let Some(options) = extra {
            result.extra = self.tree_extras(root, digest_path, &digest, options);
        }

        result.sort();
        info!(
            "Verified tree {:?}: {} ok, {} failed, {} missing, {} extra",
            root,
            result.verified.len(),
            result.failed.len(),
            result.missing.len(),
            result.extra.len()
        );
        result
    }

    fn check_entries<F>(&self, digest: &DigestFile, resolve: F, result: &mut VerificationResult)
    where
        F: Fn(&str) -> PathBuf,
    {
        let algorithm = digest.effective_algorithm(self.hasher.algorithm());
        let hasher = self.hasher.for_algorithm(algorithm);

        for (name, expected) in &digest.entries {
            let path = resolve(name);
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    result.missing.push(name.clone());
                    continue;
                }
                Err(e) => {
                    result.failed.push(io_failure(name, expected, e.to_string()));
                    continue;
                }
            };
            if !metadata.is_file() {
                result
                    .failed
                    .push(io_failure(name, expected, "not a regular file".to_string()));
                continue;
            }

            match hasher.hash_file(&path) {
                Ok(actual) if actual.eq_ignore_ascii_case(expected) => {
                    result.bytes += metadata.len();
                    result.verified.push(name.clone());
                }
                Ok(actual) => {
                    result.bytes += metadata.len();
                    result.failed.push(FailedEntry {
                        name: name.clone(),
                        reason: FailureReason::Mismatch {
                            expected: expected.clone(),
                            actual,
                        },
                    });
                }
                Err(e) => result.failed.push(io_failure(name, expected, e.to_string())),
            }
        }
    }

    fn tree_extras(&self, root: &Path, digest_path: &Path, digest: &DigestFile, options: &WalkOptions) -> Vec<String> {
        let mut extras = Vec::new();
        let mut walker = Walker::new(root, options.clone());
        let walked = walker.walk(|dir| {
            let files = list_files(dir).map_err(|source| TreesumError::DirectoryAccess {
                path: dir.to_path_buf(),
                source,
            })?;
            for (_, path) in files {
                if path == digest_path || !self.filter.should_include(&path) {
                    continue;
                }
                let name = tree_relative_name(&path, root)?;
                if !digest.entries.contains_key(&name) {
                    extras.push(name);
                }
            }
            Ok(())
        });
        if let Err(e) = walked {
            warn!("Extra-file scan of {:?} stopped: {}", root, e);
        }
        extras
    }
}

fn load(digest_path: &Path) -> std::result::Result<DigestFile, DigestFileProblem> {
    DigestFile::read(digest_path).map_err(|e| DigestFileProblem::from_error(digest_path, e))
}

fn io_failure(name: &str, expected: &str, message: String) -> FailedEntry {
    FailedEntry {
        name: name.to_string(),
        reason: FailureReason::Io {
            expected: expected.to_string(),
            message,
        },
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    let canon = |p: &Path| fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    canon(a) == canon(b)
}

/// Regular files (symlinks followed) directly inside `dir`, sorted by name
pub(crate) fn list_files(dir: &Path) -> io::Result<BTreeMap<String, PathBuf>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot read entry in {:?}: {}", dir, e);
                continue;
            }
        };
        let path = entry.path();
        let is_file = match entry.file_type() {
            Ok(ft) if ft.is_file() => true,
            Ok(ft) if ft.is_symlink() => path.is_file(),
            _ => false,
        };
        if is_file {
            files.insert(entry.file_name().to_string_lossy().into_owned(), path);
        }
    }
    Ok(files)
}
