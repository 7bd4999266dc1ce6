//! Run totals and verification status
//!
//! The walker never keeps counters of its own. Each directory's result is
//! handed back to the caller, which folds it into [`GenerationTotals`] or
//! [`RunTotals`]. The totals are what the command-line front end prints and
//! what `--json` serializes.
//!
//! ## Status classification
//!
//! A verification run is summarised as a percentage of expected files that
//! verified, a label and a process exit code:
//!
//! | Success | Extras | Label | Exit |
//! |---|---|---|---|
//! | 100% | none | SUCCESS | 0 |
//! | 100% | some | SUCCESS | 2 |
//! | ≥ 99% | | ALMOST PERFECT | 2 |
//! | ≥ 95% | | SOME ISSUES | 3 |
//! | ≥ 80% | | FAILS | 4 |
//! | ≥ 50% | | MANY FAILS | 5 |
//! | > 0% | | MOSTLY FAILS | 6 |
//! | 0% | | FAILURE | 7 |
//! | nothing expected | some | UNEXPECTED FILES | 4 |
//! | nothing expected | none | SUCCESS | 0 |
//!
//! 100% is only reported when nothing failed or went missing; a single
//! failure among many files shows as 99%.
//!
//! A digest file that could not be used (malformed, unreadable, or a
//! tree-wide file that does not exist) never passes: with no entry verified
//! the run is a FAILURE, otherwise it is graded no better than SOME ISSUES.

use crate::types::{DigestFileProblem, DirectoryOutcome, VerificationResult};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Label, exit code and percentages for a verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationStatus {
    /// Status label, e.g. `ALMOST PERFECT`
    pub label: &'static str,
    /// Process exit code
    pub exit_code: i32,
    /// Share of expected files that verified
    pub success_percent: u8,
    /// Share of expected files that failed or are missing
    pub failure_percent: u8,
}

impl VerificationStatus {
    /// Classify counts of verified, failed, missing and extra files
    pub fn classify(verified: usize, failed: usize, missing: usize, extra: usize) -> Self {
        let expected = verified + failed + missing;
        if expected == 0 {
            return if extra > 0 {
                Self::new("UNEXPECTED FILES", 4, 0)
            } else {
                Self::new("SUCCESS", 0, 100)
            };
        }

        let problems = failed + missing;
        let success = if problems == 0 {
            100
        } else {
            ((verified * 100) / expected).min(99) as u8
        };

        match success {
            100 if extra == 0 => Self::new("SUCCESS", 0, success),
            100 => Self::new("SUCCESS", 2, success),
            99 => Self::new("ALMOST PERFECT", 2, success),
            95..=98 => Self::new("SOME ISSUES", 3, success),
            80..=94 => Self::new("FAILS", 4, success),
            50..=79 => Self::new("MANY FAILS", 5, success),
            _ if verified > 0 => Self::new("MOSTLY FAILS", 6, success),
            _ => Self::new("FAILURE", 7, success),
        }
    }

    fn new(label: &'static str, exit_code: i32, success_percent: u8) -> Self {
        Self {
            label,
            exit_code,
            success_percent,
            failure_percent: 100 - success_percent,
        }
    }

    /// Downgrade a status when some digest files could not be used
    pub fn with_unusable_digests(self, verified: usize) -> Self {
        if verified == 0 {
            Self::new("FAILURE", 7, 0)
        } else if self.exit_code < 3 {
            Self::new("SOME ISSUES", 3, self.success_percent.min(99))
        } else {
            self
        }
    }

    /// Exit code 0
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}%/{}% {}",
            self.success_percent, self.failure_percent, self.label
        )
    }
}

/// Aggregated verification results
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTotals {
    /// Results folded in
    pub directories_processed: usize,
    /// Everything verified, no extras
    pub directories_success: usize,
    /// Everything verified, but extra files present
    pub directories_partial: usize,
    /// Failures, missing files or an unusable digest file
    pub directories_failed: usize,
    /// No digest file found
    pub directories_no_digest: usize,
    /// Digest files that could not be trusted at all
    pub digest_files_unusable: usize,
    /// Entries that verified
    pub files_verified: usize,
    /// Entries that failed
    pub files_failed: usize,
    /// Entries whose file is gone
    pub files_missing: usize,
    /// Files without an entry
    pub files_extra: usize,
    /// Bytes hashed
    pub bytes_verified: u64,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

impl RunTotals {
    /// Empty totals
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one directory (or tree) result in
    pub fn add_result(&mut self, result: &VerificationResult) {
        self.directories_processed += 1;

        match &result.error {
            Some(DigestFileProblem::NotFound { .. }) => {
                self.directories_no_digest += 1;
                return;
            }
            Some(_) => {
                self.directories_failed += 1;
                self.digest_files_unusable += 1;
                return;
            }
            None => {}
        }

        self.files_verified += result.verified.len();
        self.files_failed += result.failed.len();
        self.files_missing += result.missing.len();
        self.files_extra += result.extra.len();
        self.bytes_verified += result.bytes;

        if result.has_failures() {
            self.directories_failed += 1;
        } else if !result.extra.is_empty() {
            self.directories_partial += 1;
        } else {
            self.directories_success += 1;
        }
    }

    /// Fold in the result of a tree-wide verification
    ///
    /// Unlike a directory without a `.shasum`, a missing tree-wide file
    /// means nothing could be checked.
    pub fn add_tree_result(&mut self, result: &VerificationResult) {
        if let Some(DigestFileProblem::NotFound { .. }) = &result.error {
            self.directories_processed += 1;
            self.directories_failed += 1;
            self.digest_files_unusable += 1;
            return;
        }
        self.add_result(result);
    }

    /// Record the run duration
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Classification of the whole run
    pub fn status(&self) -> VerificationStatus {
        let status = VerificationStatus::classify(
            self.files_verified,
            self.files_failed,
            self.files_missing,
            self.files_extra,
        );
        if self.digest_files_unusable > 0 {
            status.with_unusable_digests(self.files_verified)
        } else {
            status
        }
    }

    /// Files examined per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        let files = self.files_verified + self.files_failed + self.files_missing + self.files_extra;
        if secs > 0.0 {
            files as f64 / secs
        } else {
            0.0
        }
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "{} directories ({} ok, {} partial, {} failed, {} without digests); \
             {} verified, {} failed, {} missing, {} extra",
            self.directories_processed,
            self.directories_success,
            self.directories_partial,
            self.directories_failed,
            self.directories_no_digest,
            self.files_verified,
            self.files_failed,
            self.files_missing,
            self.files_extra
        )
    }
}

/// Aggregated generation (and update) results
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationTotals {
    /// Directories handed to the callback, including resumed ones
    pub directories_processed: usize,
    /// Directories skipped because an earlier run completed them
    pub directories_resumed: usize,
    /// Per-directory digest files written
    pub directories_written: usize,
    /// Update runs: directories whose digest file was already current
    pub directories_unchanged: usize,
    /// Directories whose digest file could not be written
    pub directories_failed: usize,
    /// Files hashed
    pub files_processed: usize,
    /// Files rejected by the filter
    pub files_skipped: usize,
    /// Files that could not be hashed
    pub files_failed: usize,
    /// Entries appended to the tree-wide file
    pub monolithic_entries: usize,
    /// Bytes hashed
    pub bytes: u64,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

impl GenerationTotals {
    /// Empty totals
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one directory outcome in
    pub fn add_outcome(&mut self, outcome: &DirectoryOutcome) {
        self.directories_processed += 1;
        if outcome.resumed {
            self.directories_resumed += 1;
            return;
        }

        self.files_processed += outcome.entries.len();
        self.files_skipped += outcome.skipped;
        self.files_failed += outcome.failures.len();
        self.monolithic_entries += outcome.monolithic_entries;
        self.bytes += outcome.bytes;

        if outcome.write_error.is_some() {
            self.directories_failed += 1;
        } else if outcome.unchanged {
            self.directories_unchanged += 1;
        } else if outcome.digest_file.is_some() {
            self.directories_written += 1;
        }
    }

    /// Record the run duration
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Whether any file or directory failed
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0 || self.directories_failed > 0
    }

    /// Bytes hashed per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}
