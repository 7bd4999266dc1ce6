//! Digest-file housekeeping
//!
//! [`DigestFileManager`] finds the per-directory `.shasum` files under a
//! root and can list, back up, restore or remove them. Backups mirror the
//! tree layout (`root/a/b/.shasum` is copied to `backup/a/b/.shasum`), so a
//! restore puts every file back where it came from.
//!
//! Every bulk operation keeps going after a per-file error and reports the
//! failures in its [`ManageReport`]. With `dry_run` nothing is touched and
//! the report lists what would have been done.

use crate::digest_file::{read_text, SHASUM_FILENAME};
use crate::error::{Result, TreesumError};
use crate::utils::{make_relative, modified_time};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Details of one digest file
#[derive(Debug, Clone, Serialize)]
pub struct DigestListing {
    /// Location of the digest file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Number of data lines, `None` if the file could not be read
    pub entries: Option<usize>,
}

/// Outcome of a bulk operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManageReport {
    /// Files handled (or that would be handled, in a dry run)
    pub processed: Vec<PathBuf>,
    /// Files that failed, with the error
    pub errors: Vec<(PathBuf, String)>,
    /// Whether this was a dry run
    pub dry_run: bool,
}

impl ManageReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    fn record(&mut self, path: &Path, outcome: std::io::Result<()>) {
        match outcome {
            Ok(()) => self.processed.push(path.to_path_buf()),
            Err(e) => {
                error!("{:?}: {}", path, e);
                self.errors.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    /// No errors
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Bulk operations on the `.shasum` files of a tree
#[derive(Debug, Clone)]
pub struct DigestFileManager {
    root: PathBuf,
    dry_run: bool,
}

impl DigestFileManager {
    /// Manager for the tree at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dry_run: false,
        }
    }

    /// Report instead of acting
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// All `.shasum` files under the root, sorted
    pub fn find(&self) -> Result<Vec<PathBuf>> {
        find_in(&self.root)
    }

    /// Size, mtime and entry count of every `.shasum` file
    pub fn list(&self) -> Result<Vec<DigestListing>> {
        let mut listings = Vec::new();
        for path in self.find()? {
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Cannot stat {:?}: {}", path, e);
                    continue;
                }
            };
            let entries = read_text(&path).ok().map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .count()
            });
            listings.push(DigestListing {
                size: metadata.len(),
                modified: modified_time(&metadata),
                entries,
                path,
            });
        }
        info!("Found {} digest files under {:?}", listings.len(), self.root);
        Ok(listings)
    }

    /// Copy every `.shasum` file into `backup_dir`, mirroring the tree
    pub fn backup(&self, backup_dir: &Path) -> Result<ManageReport> {
        let files = self.find()?;
        let mut report = ManageReport::new(self.dry_run);
        for file in files {
            let target = backup_dir.join(make_relative(&file, &self.root)?);
            debug!("Backup {:?} -> {:?}", file, target);
            if self.dry_run {
                report.processed.push(file);
                continue;
            }
            report.record(&file, copy_with_parents(&file, &target));
        }
        info!(
            "Backed up {} digest files to {:?} ({} errors)",
            report.processed.len(),
            backup_dir,
            report.errors.len()
        );
        Ok(report)
    }

    /// Copy every `.shasum` file in `backup_dir` back into the tree
    ///
    /// # Errors
    ///
    /// [`TreesumError::DirectoryAccess`] if `backup_dir` does not exist.
    pub fn restore(&self, backup_dir: &Path) -> Result<ManageReport> {
        if !backup_dir.is_dir() {
            return Err(TreesumError::DirectoryAccess {
                path: backup_dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "backup directory does not exist"),
            });
        }

        let mut report = ManageReport::new(self.dry_run);
        for file in find_in(backup_dir)? {
            let target = self.root.join(make_relative(&file, backup_dir)?);
            debug!("Restore {:?} -> {:?}", file, target);
            if self.dry_run {
                report.processed.push(target);
                continue;
            }
            let outcome = copy_with_parents(&file, &target);
            report.record(&target, outcome);
        }
        info!(
            "Restored {} digest files from {:?} ({} errors)",
            report.processed.len(),
            backup_dir,
            report.errors.len()
        );
        Ok(report)
    }

    /// Delete every `.shasum` file
    ///
    /// # Errors
    ///
    /// [`TreesumError::InvalidConfiguration`] unless `force` is set or this
    /// is a dry run.
    pub fn remove(&self, force: bool) -> Result<ManageReport> {
        if !force && !self.dry_run {
            return Err(TreesumError::config(
                "refusing to remove digest files without confirmation (use --yes)",
            ));
        }

        let mut report = ManageReport::new(self.dry_run);
        for file in self.find()? {
            if self.dry_run {
                report.processed.push(file);
                continue;
            }
            let outcome = fs::remove_file(&file);
            report.record(&file, outcome);
        }
        info!(
            "Removed {} digest files ({} errors)",
            report.processed.len(),
            report.errors.len()
        );
        Ok(report)
    }
}

fn find_in(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping during scan: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && entry.file_name() == SHASUM_FILENAME {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

fn copy_with_parents(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}
