//! Loop-safe breadth-first directory walker
//!
//! The walker owns a FIFO queue of directory paths seeded with the root and
//! invokes a callback once per directory. It never accumulates file lists:
//! memory is bounded by the breadth of the tree, not the number of files.
//!
//! ## Loop safety
//!
//! [`TraversalState`] remembers every processed directory twice, by its
//! canonical path and (on Unix) by its `(device, inode)` pair. A directory
//! reached again through a symlink alias, a bind mount or a junction is
//! discarded. Symlinked directories are entered only when link following is
//! enabled, the target resolves, and the link does not live inside its own
//! target.
//!
//! A directory rejected by the symlink rules is *not* marked visited, so the
//! real directory it points at is still processed when reached through its
//! real path.
//!
//! ## Errors
//!
//! Callback errors are logged and counted, and the walk continues, unless
//! [`TreesumError::is_fatal`] says otherwise. Directories that vanish or
//! cannot be listed mid-walk are logged and skipped.
//!
//! ```rust
//! use treesum::walker::{WalkOptions, Walker};
//!
//! # fn example() -> treesum::Result<()> {
//! let dir = tempfile::tempdir()?;
//! std::fs::create_dir_all(dir.path().join("a/b"))?;
//!
//! let mut seen = Vec::new();
//! let stats = Walker::new(dir.path(), WalkOptions::recursive()).walk(|d| {
//!     seen.push(d.to_path_buf());
//!     Ok(())
//! })?;
//! assert_eq!(stats.directories_processed, 3);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use crate::error::{Result, TreesumError};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Traversal options
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Enter symlinked directories
    pub follow_symlinks: bool,
    /// Directories never entered (for example a shadow root inside the tree)
    pub excluded_dirs: Vec<PathBuf>,
}

impl WalkOptions {
    /// Recursive walk that does not follow symlinks
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Default::default()
        }
    }
}

/// Counters for one walk
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WalkStats {
    /// Directories the callback ran for
    pub directories_processed: usize,
    /// Directories discarded because they were already visited
    pub duplicates_skipped: usize,
    /// Symlinked directories not entered
    pub symlinks_skipped: usize,
    /// Callback or listing errors that were logged and recovered
    pub errors: usize,
}

/// Identity of a directory for loop detection
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectoryIdentity {
    resolved: PathBuf,
    device_inode: Option<(u64, u64)>,
}

impl DirectoryIdentity {
    fn of(path: &Path) -> io::Result<Self> {
        let resolved = fs::canonicalize(path)?;
        let metadata = fs::metadata(&resolved)?;
        Ok(Self {
            resolved,
            device_inode: device_inode(&metadata),
        })
    }
}

#[cfg(unix)]
fn device_inode(metadata: &fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn device_inode(metadata: &fs::Metadata) -> Option<(u64, u64)> {
    let _ = metadata;
    None
}

/// Loop-detection memory: resolved paths and device/inode pairs
#[derive(Debug, Default)]
pub struct TraversalState {
    visited_paths: HashSet<PathBuf>,
    visited_ids: HashSet<(u64, u64)>,
}

impl TraversalState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, id: &DirectoryIdentity) -> bool {
        self.visited_paths.contains(&id.resolved)
            || id
                .device_inode
                .map(|pair| self.visited_ids.contains(&pair))
                .unwrap_or(false)
    }

    fn insert(&mut self, id: DirectoryIdentity) {
        if let Some(pair) = id.device_inode {
            self.visited_ids.insert(pair);
        }
        self.visited_paths.insert(id.resolved);
    }

    /// Whether the directory at `path` was already visited under any alias
    pub fn is_visited(&self, path: &Path) -> bool {
        DirectoryIdentity::of(path)
            .map(|id| self.contains(&id))
            .unwrap_or(false)
    }

    /// Mark `path` visited; returns false if it already was
    pub fn mark_visited(&mut self, path: &Path) -> io::Result<bool> {
        let id = DirectoryIdentity::of(path)?;
        if self.contains(&id) {
            return Ok(false);
        }
        self.insert(id);
        Ok(true)
    }

    /// Number of distinct directories visited
    pub fn len(&self) -> usize {
        self.visited_paths.len()
    }

    /// Whether nothing has been visited yet
    pub fn is_empty(&self) -> bool {
        self.visited_paths.is_empty()
    }
}

/// Why a directory was not entered
#[derive(Debug, Clone, PartialEq, Eq)]
enum Refusal {
    NotFollowing,
    Broken,
    SelfReferential,
}

/// Breadth-first walker bound to a root directory
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    options: WalkOptions,
    state: TraversalState,
}

impl Walker {
    /// Create a walker for `root`
    pub fn new(root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            options,
            state: TraversalState::new(),
        }
    }

    /// Loop-detection state after (or during) a walk
    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    /// Visit every reachable directory once, calling `callback` for each
    ///
    /// # Errors
    ///
    /// Returns the first error for which [`TreesumError::is_fatal`] is true,
    /// or [`TreesumError::DirectoryAccess`] if the root itself is unusable.
    pub fn walk<F>(&mut self, mut callback: F) -> Result<WalkStats>
    where
        F: FnMut(&Path) -> Result<()>,
    {
        let mut stats = WalkStats::default();
        let root_meta = fs::metadata(&self.root).map_err(|source| TreesumError::DirectoryAccess {
            path: self.root.clone(),
            source,
        })?;
        if !root_meta.is_dir() {
            return Err(TreesumError::DirectoryAccess {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut queue = VecDeque::new();
        queue.push_back(self.root.clone());

        while let Some(dir) = queue.pop_front() {
            let id = match DirectoryIdentity::of(&dir) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping {:?}: {}", dir, e);
                    stats.errors += 1;
                    continue;
                }
            };
            if self.state.contains(&id) {
                trace!("Already visited {:?}", dir);
                stats.duplicates_skipped += 1;
                continue;
            }

            if dir != self.root {
                if let Err(reason) = self.may_enter(&dir, &id) {
                    debug!("Not entering {:?}: {:?}", dir, reason);
                    stats.symlinks_skipped += 1;
                    continue;
                }
            }
            self.state.insert(id);

            match callback(&dir) {
                Ok(()) => stats.directories_processed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Error processing {:?}: {}", dir, e);
                    stats.directories_processed += 1;
                    stats.errors += 1;
                }
            }

            if self.options.recursive {
                match self.subdirectories(&dir) {
                    Ok(children) => queue.extend(children),
                    Err(e) => {
                        warn!("{}", e);
                        stats.errors += 1;
                    }
                }
            }
        }

        debug!(
            "Walk of {:?} finished: {} directories, {} duplicates, {} symlinks skipped, {} errors",
            self.root,
            stats.directories_processed,
            stats.duplicates_skipped,
            stats.symlinks_skipped,
            stats.errors
        );
        Ok(stats)
    }

    fn may_enter(&self, dir: &Path, id: &DirectoryIdentity) -> std::result::Result<(), Refusal> {
        let is_link = fs::symlink_metadata(dir)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return Ok(());
        }
        if !self.options.follow_symlinks {
            return Err(Refusal::NotFollowing);
        }
        if !id.resolved.is_dir() {
            return Err(Refusal::Broken);
        }

        // A link living inside its own target would re-enter itself forever.
        let link_location = dir
            .parent()
            .and_then(|parent| fs::canonicalize(parent).ok())
            .zip(dir.file_name())
            .map(|(parent, name)| parent.join(name));
        match link_location {
            Some(location) if location.starts_with(&id.resolved) => Err(Refusal::SelfReferential),
            Some(_) => Ok(()),
            None => Err(Refusal::Broken),
        }
    }

    fn subdirectories(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let access = |source| TreesumError::DirectoryAccess {
            path: dir.to_path_buf(),
            source,
        };
        let mut children = Vec::new();
        for entry in fs::read_dir(dir).map_err(access)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry in {:?}: {}", dir, e);
                    continue;
                }
            };
            let path = entry.path();
            let is_dir = match entry.file_type() {
                Ok(ft) if ft.is_dir() => true,
                Ok(ft) if ft.is_symlink() => path.is_dir(),
                _ => false,
            };
            if !is_dir || self.is_excluded(&path) || self.state.is_visited(&path) {
                continue;
            }
            children.push(path);
        }
        children.sort();
        Ok(children)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.options.excluded_dirs.is_empty() {
            return false;
        }
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.options
            .excluded_dirs
            .iter()
            .any(|excluded| resolved == *excluded || path == excluded)
    }
}
