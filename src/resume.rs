//! Resume planning
//!
//! Before a resumed generation run starts, the planner looks at the output
//! a previous run left behind and builds a [`ResumeState`]:
//!
//! - **Per-directory mode**: every directory that already has a `.shasum`
//!   (next to its files, or in the shadow tree) is complete.
//! - **Tree-wide mode**: every entry in the committed tree-wide file is
//!   recorded by name, and the directory containing it is complete.
//!
//! Existing digest files are trusted as they are. Their age and content are
//! not re-checked, so a directory modified after its digest was written is
//! still skipped.

use crate::digest_file::{read_text, DigestFile, SHASUM_FILENAME};
use crate::shadow::ShadowMapping;
use crate::utils::resolve_stored_name;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Work already done by an earlier run; read-only during the walk
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    completed_dirs: HashSet<PathBuf>,
    entries: HashSet<String>,
}

impl ResumeState {
    /// Nothing completed
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `dir` was completed by an earlier run
    pub fn is_complete(&self, dir: &Path) -> bool {
        if self.completed_dirs.is_empty() {
            return false;
        }
        self.completed_dirs.contains(&canonical(dir))
    }

    /// Whether a tree-wide entry is already recorded
    pub fn has_entry(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    /// Number of completed directories
    pub fn completed_count(&self) -> usize {
        self.completed_dirs.len()
    }

    /// Number of recorded tree-wide entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Tree-wide entry names, for duplicate suppression in the writer
    pub fn entries(&self) -> &HashSet<String> {
        &self.entries
    }

    fn mark_complete(&mut self, dir: &Path) {
        self.completed_dirs.insert(canonical(dir));
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Builds [`ResumeState`] from existing output
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumePlanner;

impl ResumePlanner {
    /// Scan for per-directory digest files under the source root or shadow root
    pub fn plan_individual(source_root: &Path, shadow: Option<&ShadowMapping>) -> ResumeState {
        let scan_root = shadow.map(|s| s.shadow_root()).unwrap_or(source_root);
        let mut state = ResumeState::empty();

        for entry in WalkDir::new(scan_root).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Resume scan: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != SHASUM_FILENAME {
                continue;
            }

            let source_dir = match shadow {
                Some(mapping) => match mapping.source_dir_for(entry.path()) {
                    Ok(dir) => dir,
                    Err(e) => {
                        warn!("Resume scan: {}", e);
                        continue;
                    }
                },
                None => match entry.path().parent() {
                    Some(dir) => dir.to_path_buf(),
                    None => continue,
                },
            };
            debug!("Already complete: {:?}", source_dir);
            state.mark_complete(&source_dir);
        }

        info!(
            "Resume: {} directories already have digest files",
            state.completed_count()
        );
        state
    }

    /// Parse a committed tree-wide file, if there is one
    ///
    /// Malformed lines are ignored and a missing end marker is tolerated:
    /// every parseable entry counts.
    pub fn plan_monolithic(target: &Path, root: &Path) -> ResumeState {
        let mut state = ResumeState::empty();
        if !target.is_file() {
            info!("Resume: no existing {:?}, starting fresh", target);
            return state;
        }

        let content = match read_text(target) {
            Ok(content) => content,
            Err(e) => {
                warn!("Resume: cannot read {:?}: {}", target, e);
                return state;
            }
        };
        let parsed = DigestFile::parse_lenient(&content, target);
        if !parsed.complete {
            warn!("Resume: {:?} has no end marker; using its parseable entries", target);
        }

        for name in parsed.entries.into_keys() {
            let parent = match name.rfind('/') {
                Some(idx) => &name[..idx],
                None => "",
            };
            state.mark_complete(&resolve_stored_name(root, parent));
            state.entries.insert(name);
        }

        info!(
            "Resume: {} entries in {} directories already recorded",
            state.entry_count(),
            state.completed_count()
        );
        state
    }
}
