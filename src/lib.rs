//! # Treesum - directory tree checksums
//!
//! A library for computing, storing and verifying per-file digests across
//! directory trees.
//!
//! ## Overview
//!
//! Treesum walks a tree one directory at a time and records a digest for
//! every file, either:
//! - in a `.shasum` file inside each directory (per-directory mode)
//! - in one tree-wide file with tree-relative paths (monolithic mode)
//! - or both
//!
//! The digest files use the `hash  name` line format of `sha256sum` and
//! friends, so standard tools can check them too.
//!
//! ## Architecture
//!
//! - **Loop-safe walker**: breadth-first, remembers every directory by resolved
//!   path and device/inode so symlink cycles and aliases are visited once
//! - **Streaming hasher**: 8 KiB chunks, with optional line-ending
//!   normalization for text files so digests match across platforms
//! - **Atomic writers**: per-directory files are replaced atomically; the
//!   tree-wide file is streamed to a temporary sibling, fsynced per directory
//!   and renamed into place only when the walk completes
//! - **Resume**: an interrupted run restarts without redoing directories that
//!   already have digests
//! - **Shadow trees**: digest files can live in a parallel tree, leaving the
//!   source untouched
//! - **Clone verification**: a tree-wide file verifies any copy of the tree,
//!   wherever it lives
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treesum::TreesumBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let treesum = TreesumBuilder::new().recursive(true).build("./photos")?;
//!
//! // Write a .shasum into every directory
//! let generated = treesum.generate()?;
//! println!("hashed {} files", generated.files_processed);
//!
//! // Later: check nothing changed
//! let totals = treesum.verify()?;
//! println!("{}", totals.status());
//! std::process::exit(totals.status().exit_code);
//! # }
//! ```
//!
//! ## Advanced Usage
//!
//! ### Tree-wide digests and clone verification
//!
//! ```rust,no_run
//! use treesum::{DigestMode, HashAlgorithm, TreesumBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! TreesumBuilder::new()
//!     .algorithm(HashAlgorithm::Sha512)
//!     .mode(DigestMode::Monolithic)
//!     .recursive(true)
//!     .output("/backups/photos.sha512")
//!     .build("./photos")?
//!     .generate()?;
//!
//! // Verify the copy on the backup drive with the same file
//! let totals = TreesumBuilder::new()
//!     .recursive(true)
//!     .output("/backups/photos.sha512")
//!     .build("/mnt/backup/photos")?
//!     .verify()?;
//! println!("{}", totals.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ### Streaming results
//!
//! ```rust,no_run
//! # use treesum::TreesumBuilder;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let treesum = TreesumBuilder::new().recursive(true).build(".")?;
//! treesum.verify_with(|result| {
//!     for failed in &result.failed {
//!         eprintln!("{}: {}", result.location.display(), failed.name);
//!     }
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, TreesumError>`. Problems with single files
//! or directories never abort a run: they are recorded in the per-directory
//! results. Only errors for which [`TreesumError::is_fatal`] holds stop the
//! walk (an unwritable tree-wide file, invalid configuration).
//!
//! ## Module Organization
//!
//! - [`treesum`]: `Treesum` and `TreesumBuilder`
//! - [`walker`]: loop-safe breadth-first traversal
//! - [`hasher`]: digests, line-ending normalization, native tools
//! - [`digest_file`]: digest file formats and auto-detection
//! - [`writer`]: per-directory and tree-wide writers
//! - [`verification`]: comparing digests with the disk
//! - [`summary`]: run totals and status classification
//! - [`types`]: common types
//! - [`error`]: error types

// Public API modules
pub mod digest_file;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod manage;
pub mod resume;
pub mod shadow;
pub mod summary;
pub mod treesum;
pub mod types;
pub mod utils;
pub mod verification;
pub mod walker;
pub mod writer;

// Re-export main types for convenience
pub use error::{Result, TreesumError};
pub use filter::FileFilter;
pub use hasher::Hasher;
pub use manage::{DigestFileManager, DigestListing, ManageReport};
pub use summary::{GenerationTotals, RunTotals, VerificationStatus};
pub use treesum::{Treesum, TreesumBuilder, TreesumConfig};
pub use types::*;
pub use verification::DigestVerifier;
