//! Digest writers
//!
//! Two ways of persisting entries:
//!
//! - [`IndividualWriter`] writes one complete digest file per directory.
//!   Each file is written to a uniquely named temporary file in the same
//!   directory and renamed into place, so a reader (or a later resume) never
//!   sees a half-written `.shasum`.
//! - [`MonolithicWriter`] streams every directory's entries into a single
//!   tree-wide file. All writes go to `<output>.tmp`; the committed output is
//!   only replaced, atomically, by [`MonolithicWriter::commit`].
//!
//! ## Tree-wide lifecycle
//!
//! ```text
//! open / open_resume ──► append_directory (flush + fsync) ──► commit
//!                                  │                         (end marker,
//!                                  └──────────► abort / drop   rename)
//!                                               (temp removed)
//! ```
//!
//! A resumed writer starts from a copy of the committed output with its end
//! marker stripped, so new entries are appended after the old ones without
//! an end marker in the middle of the file. Names already present are never
//! appended twice.
//!
//! The previously committed output is never modified before `commit`; an
//! interrupted or failed run leaves it byte-identical.

use crate::digest_file::{format_entry_line, monolithic_header, render_individual, END_MARKER};
use crate::error::{Result, TreesumError};
use crate::types::{DigestEntry, HashAlgorithm};
use crate::utils::{atomic_replace, atomic_write, temp_path_for};
use chrono::Utc;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Bytes inspected at the end of a file when looking for the end marker
const TAIL_LEN: u64 = 256;

/// Writes complete per-directory digest files
#[derive(Debug, Clone, Copy)]
pub struct IndividualWriter {
    algorithm: HashAlgorithm,
}

impl IndividualWriter {
    /// Writer for `algorithm`
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Write `entries` to `digest_path`, replacing any previous file
    ///
    /// The parent directory is created if missing (shadow trees).
    ///
    /// # Errors
    ///
    /// [`TreesumError::OutputWrite`] if the file cannot be written.
    pub fn write(&self, digest_path: &Path, entries: &[DigestEntry]) -> Result<()> {
        if let Some(parent) = digest_path.parent() {
            fs::create_dir_all(parent).map_err(|source| TreesumError::OutputWrite {
                path: digest_path.to_path_buf(),
                source,
            })?;
        }
        let content = render_individual(entries, self.algorithm, Utc::now());
        atomic_write(digest_path, content.as_bytes())?;
        debug!("Wrote {} entries to {:?}", entries.len(), digest_path);
        Ok(())
    }
}

/// Streaming, atomically committed tree-wide digest writer
#[derive(Debug)]
pub struct MonolithicWriter {
    target: PathBuf,
    temp: PathBuf,
    file: Option<BufWriter<File>>,
    existing: HashSet<String>,
    appended: usize,
}

impl MonolithicWriter {
    /// Start a fresh tree-wide file for `root`
    ///
    /// Any stale temporary file from an earlier run is overwritten.
    ///
    /// # Errors
    ///
    /// [`TreesumError::OutputWrite`] if the output directory or the temporary
    /// file cannot be created.
    pub fn open(target: &Path, root: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        ensure_parent(target)?;
        let temp = temp_path_for(target);
        let mut writer = Self::create(target, &temp, false)?;
        let header = monolithic_header(algorithm, root, Utc::now());
        writer.write_raw(header.as_bytes())?;
        writer.sync()?;
        info!("Streaming tree-wide digests to {:?}", temp);
        Ok(writer)
    }

    /// Continue a tree-wide file from its committed state
    ///
    /// The committed `target` is copied to the temporary path and a trailing
    /// end marker is removed. `existing` holds the names already recorded;
    /// they are never appended again. Without a committed target this is the
    /// same as [`MonolithicWriter::open`].
    pub fn open_resume(
        target: &Path,
        root: &Path,
        algorithm: HashAlgorithm,
        existing: HashSet<String>,
    ) -> Result<Self> {
        ensure_parent(target)?;
        if !target.is_file() {
            let mut writer = Self::open(target, root, algorithm)?;
            writer.existing = existing;
            return Ok(writer);
        }

        let temp = temp_path_for(target);
        let output_err = |source: io::Error| TreesumError::OutputWrite {
            path: temp.clone(),
            source,
        };
        fs::copy(target, &temp).map_err(output_err)?;
        strip_end_marker(&temp).map_err(output_err)?;

        let mut writer = Self::create(target, &temp, true)?;
        writer.existing = existing;
        info!(
            "Resuming tree-wide digests in {:?} ({} entries already recorded)",
            target,
            writer.existing.len()
        );
        Ok(writer)
    }

    fn create(target: &Path, temp: &Path, append: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        if append {
            options.append(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        let file = options.open(temp).map_err(|source| TreesumError::OutputWrite {
            path: temp.to_path_buf(),
            source,
        })?;
        Ok(Self {
            target: target.to_path_buf(),
            temp: temp.to_path_buf(),
            file: Some(BufWriter::new(file)),
            existing: HashSet::new(),
            appended: 0,
        })
    }

    /// Final output path
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Temporary path being written
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Entries appended by this writer so far
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Whether `name` is already recorded
    pub fn contains(&self, name: &str) -> bool {
        self.existing.contains(name)
    }

    /// Append one directory's entries, sorted by name, then flush and fsync
    ///
    /// Entry names must already be tree-relative with `/` separators.
    /// Returns the number of lines written.
    pub fn append_directory(&mut self, entries: &[DigestEntry]) -> Result<usize> {
        let mut fresh: Vec<&DigestEntry> = entries
            .iter()
            .filter(|e| !self.existing.contains(&e.relative_name))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        fresh.sort_by(|a, b| a.relative_name.cmp(&b.relative_name));

        let mut block = String::new();
        for entry in &fresh {
            block.push_str(&format_entry_line(&entry.hash, &entry.relative_name));
        }
        self.write_raw(block.as_bytes())?;
        self.sync()?;

        for entry in fresh.iter() {
            self.existing.insert(entry.relative_name.clone());
        }
        self.appended += fresh.len();
        trace!("Appended {} entries to {:?}", fresh.len(), self.temp);
        Ok(fresh.len())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let temp = &self.temp;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| TreesumError::internal("tree-wide writer already closed"))?;
        file.write_all(bytes).map_err(|source| TreesumError::OutputWrite {
            path: temp.clone(),
            source,
        })
    }

    fn sync(&mut self) -> Result<()> {
        let temp = &self.temp;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| TreesumError::internal("tree-wide writer already closed"))?;
        file.flush().map_err(|source| TreesumError::OutputWrite {
            path: temp.clone(),
            source,
        })?;
        if let Err(e) = file.get_ref().sync_data() {
            warn!("fsync of {:?} failed: {}", temp, e);
        }
        Ok(())
    }

    /// Write the end marker and atomically replace the target
    ///
    /// # Errors
    ///
    /// [`TreesumError::OutputWrite`] if the marker cannot be written,
    /// [`TreesumError::CommitFailed`] if the rename fails. The temporary file
    /// is removed in both cases and the target is left as it was.
    pub fn commit(mut self) -> Result<PathBuf> {
        let marker = format!("{}\n", END_MARKER);
        let finished = self.write_raw(marker.as_bytes()).and_then(|_| self.close());
        if let Err(e) = finished {
            self.discard();
            return Err(e);
        }

        if let Err(source) = atomic_replace(&self.temp, &self.target) {
            self.discard();
            return Err(TreesumError::CommitFailed {
                path: self.target.clone(),
                source,
            });
        }
        info!("Committed {:?} ({} new entries)", self.target, self.appended);
        Ok(self.target.clone())
    }

    /// Drop the temporary file, leaving the target untouched
    pub fn abort(mut self) {
        self.discard();
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.file.take() {
            let temp = self.temp.clone();
            let file = writer.into_inner().map_err(|e| TreesumError::OutputWrite {
                path: temp.clone(),
                source: e.into_error(),
            })?;
            file.sync_all()
                .map_err(|source| TreesumError::OutputWrite { path: temp, source })?;
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.file = None;
        if self.temp.exists() {
            match fs::remove_file(&self.temp) {
                Ok(()) => debug!("Discarded {:?}", self.temp),
                Err(e) => warn!("Could not remove {:?}: {}", self.temp, e),
            }
        }
    }
}

impl Drop for MonolithicWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            self.discard();
        }
    }
}

/// Create the directory that will hold a tree-wide output
fn ensure_parent(target: &Path) -> Result<()> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| TreesumError::OutputWrite {
                path: target.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Truncate a trailing end-marker line and make sure the file ends in `\n`
fn strip_end_marker(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let start = len.saturating_sub(TAIL_LEN);
    file.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;

    let trimmed_len = tail
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    let trimmed = &tail[..trimmed_len];

    let mut new_len = start + trimmed_len as u64;
    if trimmed.ends_with(END_MARKER.as_bytes()) {
        let marker_start = trimmed_len - END_MARKER.len();
        let at_line_start = (marker_start == 0 && start == 0)
            || (marker_start > 0 && trimmed[marker_start - 1] == b'\n');
        if at_line_start {
            new_len = start + marker_start as u64;
        }
    }

    file.set_len(new_len)?;
    if new_len > 0 {
        file.seek(SeekFrom::Start(new_len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.seek(SeekFrom::End(0))?;
            file.write_all(b"\n")?;
        }
    }
    file.sync_all()
}
