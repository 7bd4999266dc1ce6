//! Utility functions for treesum
//!
//! Path manipulation, atomic file replacement and formatting helpers shared
//! by the writers, the verifier and the command-line front end.
//!
//! ## Categories of Utilities
//!
//! ### Path Manipulation
//! - Converting absolute paths to root-relative paths
//! - Encoding relative paths with `/` separators on every platform
//!
//! ### File Operations
//! - Atomic whole-file writes (temp file in the same directory + rename)
//! - Atomic replacement of a committed file by a finished temporary file
//! - Modification-time extraction
//!
//! ### Data Processing
//! - Byte formatting (human-readable sizes)
//!
//! ## Example Usage
//!
//! ```rust
//! use treesum::utils::{format_bytes, to_forward_slashes};
//! use std::path::Path;
//!
//! assert_eq!(to_forward_slashes(Path::new("a").join("b").join("c.txt").as_path()), "a/b/c.txt");
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! ```

use crate::error::{Result, TreesumError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Suffix appended to an output path to name its temporary sibling
pub const TEMP_SUFFIX: &str = ".tmp";

/// Make `path` relative to `base`
///
/// A lexical strip is tried first so symlinked paths keep the name they were
/// reached by. When that fails (different normalisation, `..` components)
/// both paths are canonicalised and compared again.
///
/// # Errors
///
/// [`TreesumError::PathOutsideRoot`] if `path` does not live under `base`.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let outside = || TreesumError::PathOutsideRoot {
        path: path.to_path_buf(),
        root: base.to_path_buf(),
    };
    let path_canon = path.canonicalize().map_err(|_| outside())?;
    let base_canon = base.canonicalize().map_err(|_| outside())?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| outside())
}

/// Join the normal components of a relative path with `/`
///
/// `.` components are dropped, so the root itself encodes as an empty string.
pub fn to_forward_slashes(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(&part.to_string_lossy());
            }
            Component::CurDir => {}
            other => {
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    out
}

/// Tree-relative name of `path`, `/`-separated
pub fn tree_relative_name(path: &Path, root: &Path) -> Result<String> {
    Ok(to_forward_slashes(&make_relative(path, root)?))
}

/// Turn a stored `/`-separated name back into a platform path under `root`
pub fn resolve_stored_name(root: &Path, name: &str) -> PathBuf {
    name.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Temporary sibling of an output file: `<name>.tmp` in the same directory
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    target.with_file_name(name)
}

/// Replace `target` with `temp`
///
/// On Unix this is a single `rename`, which atomically overwrites. Elsewhere
/// an existing target is first moved aside to `<target>.bak`, the temp file
/// is renamed into place, and the backup is restored if that rename fails.
pub fn atomic_replace(temp: &Path, target: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        fs::rename(temp, target)
    }

    #[cfg(not(unix))]
    {
        if !target.exists() {
            return fs::rename(temp, target);
        }

        let mut backup_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        backup_name.push(".bak");
        let backup = target.with_file_name(backup_name);
        if backup.exists() {
            fs::remove_file(&backup)?;
        }

        fs::rename(target, &backup)?;
        match fs::rename(temp, target) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&backup) {
                    tracing::warn!("Could not remove backup {:?}: {}", backup, e);
                }
                Ok(())
            }
            Err(e) => {
                if let Err(restore) = fs::rename(&backup, target) {
                    tracing::warn!("Could not restore {:?} from backup: {}", target, restore);
                }
                Err(e)
            }
        }
    }
}

/// Write `content` to `path` atomically
///
/// The bytes go to a uniquely named temporary file in the same directory,
/// which is fsynced and then renamed over `path`. Readers see either the old
/// file or the complete new one.
///
/// # Errors
///
/// [`TreesumError::OutputWrite`] if the temporary file cannot be created,
/// written or persisted.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output_err = |source: io::Error| TreesumError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(output_err)?;
    temp.write_all(content).map_err(output_err)?;
    temp.as_file().sync_all().map_err(output_err)?;
    temp.persist(path).map_err(|e| output_err(e.error))?;

    trace!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Modification time of a file as UTC
pub fn modified_time(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

/// Format bytes in human-readable format
///
/// ```rust
/// use treesum::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1048576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Create a directory symlink
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

/// Create a directory symlink
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link)?;
    Ok(())
}
