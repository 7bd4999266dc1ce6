//! Main treesum implementation
//!
//! This module provides the [`Treesum`] struct, the entry point for the
//! three operations on a tree: generating digest files, verifying a tree
//! against them and updating per-directory digests in place.
//!
//! ## Overview
//!
//! `Treesum` wires the lower layers together for one run:
//!
//! - **Walker**: visits each directory once, breadth-first
//! - **Hasher**: computes one digest per file, normalizing line endings first
//!   when the policy applies
//! - **Writers**: per-directory `.shasum` files and the streamed tree-wide file
//! - **Shadow mapping**: optional relocation of every digest file into a
//!   parallel tree
//! - **Resume planner**: skips directories an earlier run already completed
//! - **Verifier**: compares stored digests with the disk
//!
//! Results are streamed to a caller callback one directory at a time and
//! folded into [`GenerationTotals`] or [`RunTotals`]. Nothing in this module
//! prints.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use treesum::{DigestMode, TreesumBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let treesum = TreesumBuilder::new()
//!     .mode(DigestMode::Both)
//!     .recursive(true)
//!     .build("./data")?;
//!
//! let generated = treesum.generate()?;
//! println!("hashed {} files", generated.files_processed);
//!
//! let totals = treesum.verify()?;
//! println!("{}", totals.status());
//! # Ok(())
//! # }
//! ```

use crate::digest_file::{auto_detect, default_monolithic_name, is_monolithic_file, DigestFile, SHASUM_FILENAME};
use crate::error::{Result, TreesumError};
use crate::filter::FileFilter;
use crate::hasher::Hasher;
use crate::manage::DigestFileManager;
use crate::resume::{ResumePlanner, ResumeState};
use crate::shadow::ShadowMapping;
use crate::summary::{GenerationTotals, RunTotals};
use crate::types::*;
use crate::utils::{modified_time, tree_relative_name};
use crate::verification::{list_files, DigestVerifier};
use crate::walker::{WalkOptions, Walker};
use crate::writer::{IndividualWriter, MonolithicWriter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Resolved configuration of a [`Treesum`] instance
///
/// Every field maps onto one [`TreesumBuilder`] setter and one command-line
/// flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreesumConfig {
    /// Digest algorithm
    pub algorithm: HashAlgorithm,
    /// Line-ending normalization applied before hashing text files
    pub line_endings: LineEndingPolicy,
    /// Which digest files to write (and which to verify by default)
    pub mode: DigestMode,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Enter symlinked directories
    pub follow_symlinks: bool,
    /// Only files matching one of these globs take part (empty = all)
    pub include_patterns: Vec<String>,
    /// Files matching one of these globs never take part
    pub exclude_patterns: Vec<String>,
    /// Tree-wide digest file location
    pub output: Option<PathBuf>,
    /// Keep digest files in this parallel tree
    pub shadow_dir: Option<PathBuf>,
    /// Skip work a previous generation run completed
    pub resume: bool,
    /// Replace an existing tree-wide digest file
    pub overwrite: bool,
    /// Look for files missing from a tree-wide digest file
    pub detect_extra: bool,
    /// Use a platform hashing tool when one is available
    pub native_tool: bool,
}

impl Default for TreesumConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            line_endings: LineEndingPolicy::default(),
            mode: DigestMode::default(),
            recursive: false,
            follow_symlinks: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            output: None,
            shadow_dir: None,
            resume: false,
            overwrite: false,
            detect_extra: true,
            native_tool: false,
        }
    }
}

/// Generates, verifies and updates digest files for one tree
///
/// Built with [`TreesumBuilder`]. The root is canonicalized once at build
/// time and every path handed to callbacks lives under it.
#[derive(Debug, Clone)]
pub struct Treesum {
    /// Canonical root of the tree
    root: PathBuf,
    /// Configuration
    config: TreesumConfig,
    /// Hash engine shared by generation and verification
    hasher: Hasher,
    /// Include/exclude filter, before run-specific exclusions
    filter: FileFilter,
}

/// Run-scoped state of a generation walk
struct GenerationSinks<'a> {
    filter: FileFilter,
    shadow: Option<&'a ShadowMapping>,
    individual: Option<IndividualWriter>,
    monolithic: Option<MonolithicWriter>,
    individual_done: ResumeState,
    monolithic_done: ResumeState,
}

impl Treesum {
    /// Canonical root of the tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolved configuration
    pub fn config(&self) -> &TreesumConfig {
        &self.config
    }

    /// Hash engine in use
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    /// Housekeeping over the per-directory digest files of this tree
    ///
    /// With a shadow directory configured the manager works on the shadow
    /// tree, where the digest files live.
    pub fn manager(&self) -> DigestFileManager {
        match &self.config.shadow_dir {
            Some(shadow) => DigestFileManager::new(shadow.clone()),
            None => DigestFileManager::new(self.root.clone()),
        }
    }

    /// Generate digest files for the tree
    ///
    /// See [`Treesum::generate_with`].
    pub fn generate(&self) -> Result<GenerationTotals> {
        self.generate_with(|_| {})
    }

    /// Generate digest files, calling `on_directory` after each directory
    ///
    /// Writes per-directory files, the tree-wide file or both, according to
    /// the configured mode. The tree-wide file is streamed to a temporary
    /// sibling and only replaces the target once the whole walk succeeded.
    ///
    /// # Errors
    ///
    /// - [`TreesumError::InvalidConfiguration`] for an unusable shadow directory
    /// - [`TreesumError::OutputExists`] when a tree-wide file exists and
    ///   neither `resume` nor `overwrite` is set
    /// - [`TreesumError::OutputWrite`] / [`TreesumError::CommitFailed`] when
    ///   the tree-wide file cannot be written; the committed file, if any, is
    ///   left untouched
    ///
    /// Per-file and per-directory problems are reported in the outcomes and
    /// never abort the run.
    #[instrument(skip(self, on_directory), fields(root = ?self.root))]
    pub fn generate_with<F>(&self, mut on_directory: F) -> Result<GenerationTotals>
    where
        F: FnMut(&DirectoryOutcome),
    {
        let start = Instant::now();
        info!(
            "Generating {} digests ({:?} mode) for {:?}",
            self.config.algorithm, self.config.mode, self.root
        );

        let shadow = self.shadow_mapping()?;
        let target = self
            .config
            .mode
            .writes_monolithic()
            .then(|| self.monolithic_path(shadow.as_ref()));

        if let Some(target) = &target {
            if target.exists() && !self.config.resume && !self.config.overwrite {
                return Err(TreesumError::OutputExists(target.clone()));
            }
        }

        let individual = self.config.mode.writes_individual();
        let individual_done = if self.config.resume && individual {
            ResumePlanner::plan_individual(&self.root, shadow.as_ref())
        } else {
            ResumeState::empty()
        };
        let monolithic_done = match &target {
            Some(target) if self.config.resume => ResumePlanner::plan_monolithic(target, &self.root),
            _ => ResumeState::empty(),
        };

        let monolithic = match &target {
            Some(target) if self.config.resume => Some(MonolithicWriter::open_resume(
                target,
                &self.root,
                self.config.algorithm,
                monolithic_done.entries().clone(),
            )?),
            Some(target) => Some(MonolithicWriter::open(target, &self.root, self.config.algorithm)?),
            None => None,
        };

        let mut sinks = GenerationSinks {
            filter: self.run_filter(target.as_deref()),
            shadow: shadow.as_ref(),
            individual: individual.then(|| IndividualWriter::new(self.config.algorithm)),
            monolithic,
            individual_done,
            monolithic_done,
        };

        let mut totals = GenerationTotals::new();
        let mut walker = Walker::new(&self.root, self.walk_options(shadow.as_ref()));
        let walked = walker.walk(|dir| {
            let outcome = self.generate_directory(dir, &mut sinks)?;
            totals.add_outcome(&outcome);
            on_directory(&outcome);
            Ok(())
        });

        let stats = match walked {
            Ok(stats) => stats,
            Err(e) => {
                if let Some(writer) = sinks.monolithic.take() {
                    warn!("Generation aborted, discarding {:?}", writer.temp_path());
                    writer.abort();
                }
                return Err(e);
            }
        };

        if let Some(writer) = sinks.monolithic.take() {
            let committed = writer.commit()?;
            info!("Committed tree-wide digests to {:?}", committed);
        }

        totals.finish(start.elapsed());
        info!(
            "Generation finished: {} directories ({} resumed, {} skipped links, {} errors), {} files in {:?}",
            totals.directories_processed,
            totals.directories_resumed,
            stats.symlinks_skipped,
            stats.errors,
            totals.files_processed,
            totals.elapsed
        );
        Ok(totals)
    }

    fn generate_directory(&self, dir: &Path, sinks: &mut GenerationSinks<'_>) -> Result<DirectoryOutcome> {
        let individual_pending = sinks.individual.is_some() && !sinks.individual_done.is_complete(dir);
        let monolithic_pending = sinks.monolithic.is_some() && !sinks.monolithic_done.is_complete(dir);
        if !individual_pending && !monolithic_pending {
            debug!("Resumed, skipping {:?}", dir);
            return Ok(DirectoryOutcome::resumed(dir.to_path_buf()));
        }

        let mut outcome = self.hash_directory(dir, &sinks.filter)?;
        if outcome.entries.is_empty() {
            return Ok(outcome);
        }

        if individual_pending {
            if let Some(writer) = &sinks.individual {
                let written = self
                    .digest_path(dir, sinks.shadow)
                    .and_then(|path| writer.write(&path, &outcome.entries).map(|()| path));
                match written {
                    Ok(path) => outcome.digest_file = Some(path),
                    Err(e) => {
                        warn!("Cannot write digest file for {:?}: {}", dir, e);
                        outcome.write_error = Some(e.to_string());
                    }
                }
            }
        }

        if let Some(writer) = sinks.monolithic.as_mut() {
            let mut tree_entries = Vec::with_capacity(outcome.entries.len());
            for entry in &outcome.entries {
                let name = tree_relative_name(&dir.join(&entry.relative_name), &self.root)?;
                tree_entries.push(DigestEntry {
                    relative_name: name,
                    ..entry.clone()
                });
            }
            outcome.monolithic_entries = writer.append_directory(&tree_entries)?;
        }

        Ok(outcome)
    }

    /// Hash the files of one directory, sorted by name
    fn hash_directory(&self, dir: &Path, filter: &FileFilter) -> Result<DirectoryOutcome> {
        let files = list_files(dir).map_err(|source| TreesumError::DirectoryAccess {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut outcome = DirectoryOutcome::new(dir.to_path_buf());
        for (name, path) in files {
            if !filter.should_include(&path) {
                outcome.skipped += 1;
                continue;
            }

            let hashed = fs::metadata(&path)
                .map_err(|e| TreesumError::file_read(&path, e))
                .and_then(|metadata| self.hasher.hash_file(&path).map(|hash| (hash, metadata)));
            match hashed {
                Ok((hash, metadata)) => {
                    outcome.bytes += metadata.len();
                    outcome.entries.push(DigestEntry {
                        relative_name: name,
                        hash,
                        size: metadata.len(),
                        modified: modified_time(&metadata),
                        algorithm: self.config.algorithm,
                    });
                }
                Err(e) => {
                    warn!("{}", e);
                    outcome.failures.push(FileFailure {
                        name,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(
            "Hashed {:?}: {} files, {} skipped, {} failed",
            dir,
            outcome.entries.len(),
            outcome.skipped,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    /// Verify the tree against its digest files
    ///
    /// See [`Treesum::verify_with`].
    pub fn verify(&self) -> Result<RunTotals> {
        self.verify_with(|_| {})
    }

    /// Verify the tree, calling `on_result` for every result produced
    ///
    /// The digest source is chosen in this order:
    ///
    /// 1. an explicit `output` file, verified as a tree-wide file
    /// 2. the default tree-wide file in [`DigestMode::Monolithic`] mode
    /// 3. auto-detection in the root (or shadow root): a tree-wide file found
    ///    there is verified as such
    /// 4. otherwise every directory is verified against its own `.shasum`
    ///
    /// Problems with a digest file are reported in the result, not as errors.
    ///
    /// # Errors
    ///
    /// Only configuration problems and an unusable root abort verification.
    #[instrument(skip(self, on_result), fields(root = ?self.root))]
    pub fn verify_with<F>(&self, mut on_result: F) -> Result<RunTotals>
    where
        F: FnMut(&VerificationResult),
    {
        let start = Instant::now();
        let shadow = self.shadow_mapping()?;
        let tree_file = self.tree_digest_file(shadow.as_ref());
        let monolithic_output =
            (self.config.mode.writes_monolithic() || self.config.output.is_some())
                .then(|| self.monolithic_path(shadow.as_ref()));
        let filter = self.run_filter(monolithic_output.as_deref());
        let verifier = DigestVerifier::new(&self.hasher, &filter);
        let walk_options = self.walk_options(shadow.as_ref());

        let mut totals = RunTotals::new();
        match tree_file {
            Some(digest_path) => {
                info!("Verifying {:?} against tree-wide file {:?}", self.root, digest_path);
                let extra = self.config.detect_extra.then_some(&walk_options);
                let result = verifier.verify_tree(&self.root, &digest_path, extra);
                totals.add_tree_result(&result);
                on_result(&result);
            }
            None => {
                info!("Verifying {:?} against per-directory digest files", self.root);
                let mut walker = Walker::new(&self.root, walk_options.clone());
                walker.walk(|dir| {
                    let digest_path = self.digest_path(dir, shadow.as_ref())?;
                    let result = verifier.verify_directory(dir, &digest_path);
                    totals.add_result(&result);
                    on_result(&result);
                    Ok(())
                })?;
            }
        }

        totals.finish(start.elapsed());
        info!("Verification finished: {} ({})", totals.status(), totals.summary());
        Ok(totals)
    }

    /// Regenerate per-directory digest files that no longer match the tree
    ///
    /// See [`Treesum::update_with`].
    pub fn update(&self) -> Result<GenerationTotals> {
        self.update_with(|_| {})
    }

    /// Rewrite each `.shasum` whose name-to-hash mapping changed
    ///
    /// Runs in per-directory mode regardless of the configured mode and never
    /// resumes. A digest file that already matches is left byte-identical
    /// and its outcome is marked `unchanged`.
    #[instrument(skip(self, on_directory), fields(root = ?self.root))]
    pub fn update_with<F>(&self, mut on_directory: F) -> Result<GenerationTotals>
    where
        F: FnMut(&DirectoryOutcome),
    {
        let start = Instant::now();
        let shadow = self.shadow_mapping()?;
        let filter = self.run_filter(None);
        let writer = IndividualWriter::new(self.config.algorithm);

        let mut totals = GenerationTotals::new();
        let mut walker = Walker::new(&self.root, self.walk_options(shadow.as_ref()));
        walker.walk(|dir| {
            let mut outcome = self.hash_directory(dir, &filter)?;
            let digest_path = self.digest_path(dir, shadow.as_ref())?;
            // An emptied directory still gets its stale entries cleared.
            if !outcome.entries.is_empty() || digest_path.is_file() {
                if self.is_current(&digest_path, &outcome.entries) {
                    debug!("Unchanged {:?}", digest_path);
                    outcome.unchanged = true;
                    outcome.digest_file = Some(digest_path);
                } else {
                    match writer.write(&digest_path, &outcome.entries) {
                        Ok(()) => {
                            info!("Updated {:?}", digest_path);
                            outcome.digest_file = Some(digest_path);
                        }
                        Err(e) => {
                            warn!("Cannot update {:?}: {}", digest_path, e);
                            outcome.write_error = Some(e.to_string());
                        }
                    }
                }
            }
            totals.add_outcome(&outcome);
            on_directory(&outcome);
            Ok(())
        })?;

        totals.finish(start.elapsed());
        info!(
            "Update finished: {} rewritten, {} unchanged, {} failed",
            totals.directories_written, totals.directories_unchanged, totals.directories_failed
        );
        Ok(totals)
    }

    fn is_current(&self, digest_path: &Path, entries: &[DigestEntry]) -> bool {
        let stored = match DigestFile::read(digest_path) {
            Ok(stored) => stored,
            Err(_) => return false,
        };
        if stored.effective_algorithm(self.config.algorithm) != self.config.algorithm {
            return false;
        }
        let fresh: BTreeMap<String, String> = entries
            .iter()
            .map(|e| (e.relative_name.clone(), e.hash.clone()))
            .collect();
        stored.entries == fresh
    }

    fn shadow_mapping(&self) -> Result<Option<ShadowMapping>> {
        self.config
            .shadow_dir
            .as_deref()
            .map(|shadow| ShadowMapping::new(&self.root, shadow))
            .transpose()
    }

    fn walk_options(&self, shadow: Option<&ShadowMapping>) -> WalkOptions {
        let mut excluded_dirs = Vec::new();
        if let Some(mapping) = shadow.filter(|m| m.is_nested()) {
            excluded_dirs.push(mapping.shadow_root().to_path_buf());
        }
        WalkOptions {
            recursive: self.config.recursive,
            follow_symlinks: self.config.follow_symlinks,
            excluded_dirs,
        }
    }

    fn run_filter(&self, monolithic_output: Option<&Path>) -> FileFilter {
        match monolithic_output {
            Some(path) => self.filter.clone().with_excluded_path(path),
            None => self.filter.clone(),
        }
    }

    fn digest_path(&self, dir: &Path, shadow: Option<&ShadowMapping>) -> Result<PathBuf> {
        match shadow {
            Some(mapping) => mapping.shadow_digest_path(dir),
            None => Ok(dir.join(SHASUM_FILENAME)),
        }
    }

    /// Tree-wide file location for this configuration
    fn monolithic_path(&self, shadow: Option<&ShadowMapping>) -> PathBuf {
        let path = match (shadow, self.config.output.as_deref()) {
            (Some(mapping), output) => mapping.shadow_monolithic_path(self.config.algorithm, output),
            (None, Some(output)) if output.is_absolute() => output.to_path_buf(),
            (None, Some(output)) => self.root.join(output),
            (None, None) => self.root.join(default_monolithic_name(self.config.algorithm)),
        };
        canonical_parent(path)
    }

    /// Tree-wide file to verify against, if verification is tree-wide
    fn tree_digest_file(&self, shadow: Option<&ShadowMapping>) -> Option<PathBuf> {
        if self.config.output.is_some() || self.config.mode == DigestMode::Monolithic {
            return Some(self.monolithic_path(shadow));
        }

        let search_root = shadow.map(|s| s.shadow_root()).unwrap_or(&self.root);
        match auto_detect(search_root) {
            Some(found) if is_monolithic_file(&found) => {
                debug!("Auto-detected tree-wide file {:?}", found);
                Some(found)
            }
            Some(found) => {
                debug!("Auto-detected per-directory file {:?}", found);
                None
            }
            None => None,
        }
    }
}

/// Resolve symlinks in the parent so the path compares equal to walked paths
fn canonical_parent(path: PathBuf) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => path,
        },
        _ => path,
    }
}

/// Builder for configuring [`Treesum`]
///
/// # Examples
///
/// ```rust,no_run
/// use treesum::{HashAlgorithm, TreesumBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let treesum = TreesumBuilder::new()
///     .algorithm(HashAlgorithm::Md5)
///     .recursive(true)
///     .exclude_patterns(vec!["*.log".to_string()])
///     .build("./data")?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Values
///
/// - `algorithm`: `sha256`
/// - `line_endings`: `auto`
/// - `mode`: `DigestMode::Individual`
/// - `recursive`: false
/// - `follow_symlinks`: false
/// - `detect_extra`: true
/// - everything else off or empty
#[derive(Debug, Clone, Default)]
pub struct TreesumBuilder {
    config: TreesumConfig,
}

impl TreesumBuilder {
    /// Create a new builder with default settings
    ///
    /// # Examples
    ///
    /// ```rust
    /// use treesum::TreesumBuilder;
    ///
    /// let builder = TreesumBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: TreesumConfig) -> Self {
        Self { config }
    }

    /// Set the digest algorithm
    ///
    /// Verification still honours the algorithm recorded in a digest file's
    /// header, or implied by its hash lengths.
    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    /// Set the line-ending policy for text files
    ///
    /// # Examples
    ///
    /// ```rust
    /// use treesum::{LineEndingPolicy, TreesumBuilder};
    ///
    /// // Hash files exactly as they are on disk
    /// let builder = TreesumBuilder::new().line_endings(LineEndingPolicy::Preserve);
    /// ```
    pub fn line_endings(mut self, policy: LineEndingPolicy) -> Self {
        self.config.line_endings = policy;
        self
    }

    /// Choose per-directory files, a tree-wide file or both
    ///
    /// Tree-wide output needs [`TreesumBuilder::recursive`].
    pub fn mode(mut self, mode: DigestMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Descend into subdirectories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    /// Set whether to follow symbolic links to directories
    ///
    /// Each directory is still processed at most once: a link to a directory
    /// already visited, or to one of its own ancestors, is not entered.
    /// Symlinked files are always hashed as their target.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Only include files matching one of these globs
    ///
    /// Patterns without `/` match the file name, patterns with `/` match the
    /// end of the path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use treesum::TreesumBuilder;
    ///
    /// let builder = TreesumBuilder::new()
    ///     .include_patterns(vec!["*.rs".to_string(), "docs/*.md".to_string()]);
    /// ```
    pub fn include_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.include_patterns = patterns;
        self
    }

    /// Exclude files matching one of these globs
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Tree-wide digest file location
    ///
    /// A relative path resolves against the root, or the shadow root when
    /// one is set. Verification with an explicit output is always tree-wide.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = Some(path.into());
        self
    }

    /// Keep all digest files in a parallel tree rooted at `path`
    pub fn shadow_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.shadow_dir = Some(path.into());
        self
    }

    /// Skip directories an earlier generation run completed
    ///
    /// Existing digest files are trusted without checking their age or
    /// content.
    pub fn resume(mut self, resume: bool) -> Self {
        self.config.resume = resume;
        self
    }

    /// Allow replacing an existing tree-wide digest file
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    /// Report files missing from a tree-wide digest file
    pub fn detect_extra(mut self, detect: bool) -> Self {
        self.config.detect_extra = detect;
        self
    }

    /// Hash with a platform tool (`sha256sum` and friends) when available
    ///
    /// Files needing line-ending normalization always use the built-in
    /// hasher, as does any file the tool fails on.
    pub fn native_tool(mut self, enabled: bool) -> Self {
        self.config.native_tool = enabled;
        self
    }

    /// Build a [`Treesum`] bound to `root`
    ///
    /// # Errors
    ///
    /// - [`TreesumError::InvalidConfiguration`] when tree-wide output is
    ///   requested without recursion
    /// - [`TreesumError::InvalidPattern`] for a glob that does not parse
    /// - [`TreesumError::DirectoryAccess`] when `root` cannot be resolved
    pub fn build(self, root: impl AsRef<Path>) -> Result<Treesum> {
        let config = self.config;
        if config.mode.writes_monolithic() && !config.recursive {
            return Err(TreesumError::config(
                "monolithic mode requires recursive traversal",
            ));
        }

        let filter = FileFilter::new(&config.include_patterns, &config.exclude_patterns)?;
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|source| TreesumError::DirectoryAccess {
            path: root.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(TreesumError::DirectoryAccess {
                path: root,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            });
        }

        let hasher = Hasher::new(config.algorithm, config.line_endings).with_native_tool(config.native_tool);
        if let Some(tool) = hasher.external_tool() {
            info!("Using native tool {} where possible", tool);
        }
        debug!("Treesum configuration for {:?}: {:?}", root, config);

        Ok(Treesum {
            root,
            config,
            hasher,
            filter,
        })
    }
}
