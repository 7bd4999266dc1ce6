//! Include/exclude filtering
//!
//! A [`FileFilter`] decides which files take part in a run. The same filter
//! instance is used for generation, for counting and for extra-file detection
//! during verification, so a file that was never hashed is never reported
//! as extra.
//!
//! Patterns are shell globs. A pattern without `/` is matched against the
//! file name; a pattern containing `/` is matched against every trailing
//! run of path components (`docs/*.md` matches `/data/docs/a.md`). An empty
//! include list includes everything; excludes always win.
//!
//! Digest files (`.shasum` and its `.shasum*.tmp` staging files) are always
//! excluded, as are any explicitly registered output paths such as the
//! tree-wide digest file and its temporary sibling.

use crate::digest_file::SHASUM_FILENAME;
use crate::error::Result;
use crate::utils::TEMP_SUFFIX;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Compiled pattern list, split by how each pattern is matched
#[derive(Debug, Clone)]
struct PatternSet {
    by_name: GlobSet,
    by_path: GlobSet,
    len: usize,
}

impl PatternSet {
    fn build(patterns: &[String]) -> Result<Self> {
        let mut by_name = GlobSetBuilder::new();
        let mut by_path = GlobSetBuilder::new();
        for pattern in patterns {
            let normalized = pattern.replace('\\', "/");
            let glob = GlobBuilder::new(normalized.trim_start_matches("./"))
                .literal_separator(true)
                .build()?;
            if normalized.contains('/') {
                by_path.add(glob);
            } else {
                by_name.add(glob);
            }
        }
        Ok(Self {
            by_name: by_name.build()?,
            by_path: by_path.build()?,
            len: patterns.len(),
        })
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn matches(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name() {
            if self.by_name.is_match(Path::new(name)) {
                return true;
            }
        }
        if self.by_path.is_empty() {
            return false;
        }

        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        (0..parts.len()).any(|start| self.by_path.is_match(parts[start..].join("/")))
    }
}

/// Include/exclude decision shared by every traversal
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: PatternSet,
    exclude: PatternSet,
    excluded_paths: Vec<PathBuf>,
}

impl FileFilter {
    /// Compile include and exclude globs
    ///
    /// # Errors
    ///
    /// [`crate::TreesumError::InvalidPattern`] if any pattern does not parse.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: PatternSet::build(include)?,
            exclude: PatternSet::build(exclude)?,
            excluded_paths: Vec::new(),
        })
    }

    /// A filter that accepts every non-reserved file
    pub fn allow_all() -> Self {
        Self {
            include: PatternSet::empty(),
            exclude: PatternSet::empty(),
            excluded_paths: Vec::new(),
        }
    }

    /// Always exclude this exact path (and its `.tmp` sibling)
    pub fn with_excluded_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.excluded_paths.push(crate::utils::temp_path_for(&path));
        self.excluded_paths.push(path);
        self
    }

    /// Whether a file takes part in the run
    pub fn should_include(&self, path: &Path) -> bool {
        if is_reserved_name(path) {
            return false;
        }
        if self.excluded_paths.iter().any(|p| p == path) {
            return false;
        }
        if !self.include.is_empty() && !self.include.matches(path) {
            return false;
        }
        !self.exclude.matches(path)
    }
}

impl PatternSet {
    fn empty() -> Self {
        Self {
            by_name: GlobSet::empty(),
            by_path: GlobSet::empty(),
            len: 0,
        }
    }
}

/// Whether `path` names a per-directory digest file or one of its staging files
pub fn is_reserved_name(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            name == SHASUM_FILENAME || (name.starts_with(SHASUM_FILENAME) && name.ends_with(TEMP_SUFFIX))
        }
        None => false,
    }
}
