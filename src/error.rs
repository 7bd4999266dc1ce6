//! Error types for the treesum library
//!
//! This module defines all error types that can occur while generating,
//! writing or verifying digests. Errors carry the path they concern so the
//! presentation layer can report them without extra bookkeeping.
//!
//! ## Fatal vs. recoverable
//!
//! Only two kinds of failure abort a run: the tree-wide output could not be
//! written or committed, and the configuration was rejected before the walk
//! began. Everything else (an unreadable file, a directory deleted mid-walk,
//! a malformed digest file) is recorded against the file or directory it
//! concerns and the walk carries on. [`TreesumError::is_fatal`] encodes that
//! split.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the treesum library
pub type Result<T> = std::result::Result<T, TreesumError>;

/// Main error type for all treesum operations
#[derive(Debug, Error)]
pub enum TreesumError {
    /// I/O errors without more specific context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be read or stat'ed while hashing it
    #[error("Cannot read {path:?}: {source}")]
    FileRead {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A directory could not be listed
    #[error("Cannot access directory {path:?}: {source}")]
    DirectoryAccess {
        /// Directory that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A digest file contained a line that is neither a comment nor an entry
    #[error("Malformed digest file {path:?} at line {line}: {message}")]
    DigestParse {
        /// Digest file being parsed
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// A per-directory digest file or the tree-wide temporary file could not be written
    #[error("Cannot write digest output {path:?}: {source}")]
    OutputWrite {
        /// Output path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The tree-wide temporary file could not replace the committed file
    #[error("Cannot commit {path:?}: {source}")]
    CommitFailed {
        /// Final target path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A committed tree-wide file exists and overwriting was not allowed
    #[error("Output file already exists: {0:?}")]
    OutputExists(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(String),

    /// Path does not live under the root it must be relative to
    #[error("Path {path:?} is not under {root:?}")]
    PathOutsideRoot {
        /// Offending path
        path: PathBuf,
        /// Root it was expected under
        root: PathBuf,
    },

    /// Unknown hash algorithm name
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// An external hashing tool failed or produced unusable output
    #[error("External tool {tool} failed: {message}")]
    ExternalTool {
        /// Program name
        tool: String,
        /// Failure description
        message: String,
    },

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<globset::Error> for TreesumError {
    fn from(err: globset::Error) -> Self {
        TreesumError::InvalidPattern(err.to_string())
    }
}

impl TreesumError {
    /// Create an invalid-configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        TreesumError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        TreesumError::Internal(msg.into())
    }

    /// Wrap an I/O error raised while reading `path`
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TreesumError::FileRead { path: path.into(), source }
    }

    /// Check if this error must abort the whole run
    ///
    /// Output and commit failures leave no trustworthy place to record
    /// further results, and configuration errors are raised before any
    /// traversal. Everything else is recovered by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TreesumError::OutputWrite { .. }
                | TreesumError::CommitFailed { .. }
                | TreesumError::OutputExists(_)
                | TreesumError::InvalidConfiguration(_)
                | TreesumError::InvalidPattern(_)
                | TreesumError::UnsupportedAlgorithm(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TreesumError::OutputExists(path) => {
                format!(
                    "{:?} already exists. Use 'treesum update' for incremental updates, \
                     --resume to continue a previous run, --output for a different name, \
                     or -y to overwrite.",
                    path
                )
            }
            TreesumError::InvalidConfiguration(msg) if msg.contains("recursive") => {
                format!("{}. Add -r/--recursive.", msg)
            }
            TreesumError::UnsupportedAlgorithm(name) => {
                format!(
                    "Unsupported hash algorithm '{}'. Supported: md5, sha1, sha256, sha512.",
                    name
                )
            }
            TreesumError::CommitFailed { path, .. } => {
                format!(
                    "Could not replace {:?}. The previous file was left untouched.",
                    path
                )
            }
            _ => self.to_string(),
        }
    }
}
