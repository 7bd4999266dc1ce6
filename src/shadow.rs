//! Shadow directory path mapping
//!
//! With a shadow directory, digest files are written to a parallel tree
//! instead of next to the files they describe, leaving the source tree
//! untouched. The mapping is a pure function of the two roots:
//!
//! ```text
//! source_root/photos/2024      ->  shadow_root/photos/2024/.shasum
//! shadow_root/photos/2024/...  ->  source_root/photos/2024/...
//! ```

use crate::digest_file::{default_monolithic_name, SHASUM_FILENAME};
use crate::error::{Result, TreesumError};
use crate::types::HashAlgorithm;
use crate::utils::{make_relative, resolve_stored_name};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bidirectional mapping between a source tree and its shadow tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowMapping {
    source_root: PathBuf,
    shadow_root: PathBuf,
}

impl ShadowMapping {
    /// Create the mapping, creating the shadow root if it does not exist
    ///
    /// Both roots are canonicalised; callers should walk the canonical source
    /// root so that relative paths strip lexically.
    ///
    /// # Errors
    ///
    /// [`TreesumError::InvalidConfiguration`] if the shadow root is the source
    /// root or cannot be created.
    pub fn new(source_root: &Path, shadow_root: &Path) -> Result<Self> {
        let source_root = fs::canonicalize(source_root).map_err(|source| TreesumError::DirectoryAccess {
            path: source_root.to_path_buf(),
            source,
        })?;
        fs::create_dir_all(shadow_root).map_err(|e| {
            TreesumError::config(format!("cannot create shadow directory {:?}: {}", shadow_root, e))
        })?;
        let shadow_root = fs::canonicalize(shadow_root).map_err(|e| {
            TreesumError::config(format!("cannot resolve shadow directory {:?}: {}", shadow_root, e))
        })?;

        if shadow_root == source_root {
            return Err(TreesumError::config(
                "shadow directory must differ from the source directory",
            ));
        }
        debug!("Shadow mapping {:?} -> {:?}", source_root, shadow_root);
        Ok(Self {
            source_root,
            shadow_root,
        })
    }

    /// Canonical source root
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Canonical shadow root
    pub fn shadow_root(&self) -> &Path {
        &self.shadow_root
    }

    /// Whether the shadow tree lives inside the source tree
    pub fn is_nested(&self) -> bool {
        self.shadow_root.starts_with(&self.source_root)
    }

    /// Shadow directory mirroring `source_dir`
    pub fn shadow_dir(&self, source_dir: &Path) -> Result<PathBuf> {
        let relative = make_relative(source_dir, &self.source_root)?;
        Ok(self.shadow_root.join(relative))
    }

    /// Where the per-directory digest file of `source_dir` lives
    ///
    /// # Errors
    ///
    /// [`TreesumError::PathOutsideRoot`] if `source_dir` is not under the
    /// source root.
    pub fn shadow_digest_path(&self, source_dir: &Path) -> Result<PathBuf> {
        Ok(self.shadow_dir(source_dir)?.join(SHASUM_FILENAME))
    }

    /// Source directory whose digest file is `shadow_digest`
    pub fn source_dir_for(&self, shadow_digest: &Path) -> Result<PathBuf> {
        let dir = shadow_digest.parent().unwrap_or(shadow_digest);
        let relative = make_relative(dir, &self.shadow_root)?;
        Ok(self.source_root.join(relative))
    }

    /// Real source file for a path recorded relative to the source root
    pub fn source_file_path(&self, relative: &str) -> PathBuf {
        resolve_stored_name(&self.source_root, relative)
    }

    /// Tree-wide digest file location inside the shadow root
    ///
    /// An absolute `custom` path is returned unchanged; a relative one is
    /// placed under the shadow root.
    pub fn shadow_monolithic_path(&self, algorithm: HashAlgorithm, custom: Option<&Path>) -> PathBuf {
        match custom {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.shadow_root.join(path),
            None => self.shadow_root.join(default_monolithic_name(algorithm)),
        }
    }
}
