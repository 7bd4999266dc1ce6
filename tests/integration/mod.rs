//! Integration tests for treesum
//!
//! Real-world scenarios over generated trees: round trips, tampering,
//! tree-wide files, resume, shadow trees and clone verification.

use ::treesum::digest_file::{DigestFile, END_MARKER, SHASUM_FILENAME};
use ::treesum::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

pub const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
pub const WORLD_SHA256: &str = "486ea46224d1bb4fb680f34f7c9ad96a8f24ec88be73ea8e5a6c65260e9cb8a7";

/// Test harness owning a scratch tree
pub struct TreeHarness {
    pub temp_dir: TempDir,
    pub file_generator: FileGenerator,
    pub files: Vec<PathBuf>,
}

impl TreeHarness {
    /// Create a new harness with an empty tree
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            file_generator: FileGenerator::new(42),
            files: Vec::new(),
        }
    }

    /// Root of the tree
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file (creating parents) and remember it
    pub fn write(&mut self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        if !self.files.contains(&path) {
            self.files.push(path.clone());
        }
        path
    }

    /// Generate a nested tree of random files
    pub fn generate_tree(&mut self, config: TreeConfig) -> anyhow::Result<usize> {
        let mut count = 0;
        for depth in 0..=config.max_depth {
            for dir_idx in 0..config.dirs_per_level {
                let mut relative = PathBuf::new();
                for level in 0..depth {
                    relative = relative.join(format!("dir_{}_{}", level, dir_idx));
                }
                fs::create_dir_all(self.root().join(&relative))?;

                for file_idx in 0..config.files_per_dir {
                    let name = if file_idx % 3 == 0 {
                        format!("data_{}.bin", file_idx)
                    } else {
                        format!("file_{}.txt", file_idx)
                    };
                    let path = self.root().join(&relative).join(name);
                    if path.exists() {
                        continue;
                    }
                    let content = if file_idx % 3 == 0 {
                        self.file_generator.binary_content(config.file_size_range.clone())
                    } else {
                        self.file_generator.text_content(config.file_size_range.clone())
                    };
                    fs::write(&path, content)?;
                    self.files.push(path);
                    count += 1;
                }
            }
        }
        info!("Generated {} files under {:?}", count, self.root());
        Ok(count)
    }

    /// Every `.shasum` under `dir` with its bytes
    pub fn digest_snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut snapshot: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() == SHASUM_FILENAME)
            .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect();
        snapshot.sort();
        snapshot
    }
}

/// Shape of a generated tree
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub dirs_per_level: usize,
    pub files_per_dir: usize,
    pub file_size_range: Range<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            dirs_per_level: 2,
            files_per_dir: 4,
            file_size_range: 16..2048,
        }
    }
}

/// Deterministic file content
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Printable lines with mixed line endings
    pub fn text_content(&mut self, size: Range<usize>) -> Vec<u8> {
        let target = self.rng.random_range(size);
        let mut out = Vec::with_capacity(target + 2);
        while out.len() < target {
            let width = self.rng.random_range(1..60);
            for _ in 0..width {
                out.push(self.rng.random_range(b'a'..=b'z'));
            }
            if self.rng.random_range(0..4) == 0 {
                out.extend_from_slice(b"\r\n");
            } else {
                out.push(b'\n');
            }
        }
        out
    }

    /// Random bytes that always contain a NUL
    pub fn binary_content(&mut self, size: Range<usize>) -> Vec<u8> {
        let len = self.rng.random_range(size).max(1);
        let mut out: Vec<u8> = (0..len).map(|_| self.rng.random()).collect();
        out[0] = 0;
        out
    }
}

/// Copy every regular file of `from` into `to`, skipping digest files
pub fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let relative = entry.path().strip_prefix(from).unwrap();
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else if entry.file_type().is_file()
            && entry.file_name() != SHASUM_FILENAME
            && !entry.file_name().to_string_lossy().starts_with("checksums.")
        {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn two_file_tree() -> TreeHarness {
    let mut harness = TreeHarness::new();
    harness.write("a.txt", "hello");
    harness.write("b.txt", "world");
    harness
}

fn single_result(treesum: &Treesum) -> VerificationResult {
    let mut results = Vec::new();
    treesum.verify_with(|r| results.push(r.clone())).unwrap();
    assert_eq!(results.len(), 1);
    results.remove(0)
}

#[test]
fn test_basic_round_trip() {
    let harness = two_file_tree();
    let treesum = TreesumBuilder::new().build(harness.root()).unwrap();
    treesum.generate().unwrap();

    let content = fs::read_to_string(harness.root().join(SHASUM_FILENAME)).unwrap();
    let data: Vec<&str> = content.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(
        data,
        vec![
            format!("{}  a.txt", HELLO_SHA256),
            format!("{}  b.txt", WORLD_SHA256),
        ]
    );
    assert!(content.starts_with("# Treesum checksum file v"));
    assert!(content.lines().next().unwrap().contains(" - sha256 - "));
    assert_eq!(content.lines().last(), Some(END_MARKER));

    let result = single_result(&treesum);
    assert_eq!(result.verified, vec!["a.txt", "b.txt"]);
    assert!(result.failed.is_empty() && result.missing.is_empty() && result.extra.is_empty());
}

#[test]
fn test_missing_file() {
    let harness = two_file_tree();
    let treesum = TreesumBuilder::new().build(harness.root()).unwrap();
    treesum.generate().unwrap();
    fs::remove_file(harness.root().join("b.txt")).unwrap();

    let result = single_result(&treesum);
    assert_eq!(result.missing, vec!["b.txt"]);
    assert_eq!(result.verified, vec!["a.txt"]);
    assert!(result.failed.is_empty());
}

#[test]
fn test_tampered_file() {
    let harness = two_file_tree();
    let treesum = TreesumBuilder::new().build(harness.root()).unwrap();
    treesum.generate().unwrap();
    fs::write(harness.root().join("a.txt"), "HELLO").unwrap();

    let result = single_result(&treesum);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "a.txt");
    match &result.failed[0].reason {
        FailureReason::Mismatch { expected, actual } => {
            assert_eq!(expected, HELLO_SHA256);
            assert_ne!(expected, actual);
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
    assert_eq!(result.verified, vec!["b.txt"]);
}

#[test]
fn test_extra_file() {
    let mut harness = two_file_tree();
    let treesum = TreesumBuilder::new().build(harness.root()).unwrap();
    treesum.generate().unwrap();
    harness.write("c.txt", "new");

    let result = single_result(&treesum);
    assert_eq!(result.extra, vec!["c.txt"]);
    assert_eq!(result.verified, vec!["a.txt", "b.txt"]);

    let status = VerificationStatus::classify(2, 0, 0, 1);
    assert_eq!((status.label, status.exit_code), ("SUCCESS", 2));
}

#[test]
fn test_monolithic_resume_appends_only_new_directories() {
    let mut harness = TreeHarness::new();
    harness.write("d1/one.txt", "1");
    harness.write("d1/two.txt", "2");

    let builder = TreesumBuilder::new()
        .mode(DigestMode::Monolithic)
        .recursive(true);
    builder.clone().build(harness.root()).unwrap().generate().unwrap();

    // The run "stopped" after d1; d2 appears before the resumed run
    harness.write("d2/three.txt", "3");
    let totals = builder
        .resume(true)
        .build(harness.root())
        .unwrap()
        .generate()
        .unwrap();
    assert_eq!(totals.directories_resumed, 1);
    assert_eq!(totals.monolithic_entries, 1);

    let target = harness.root().join("checksums.sha256");
    let content = fs::read_to_string(&target).unwrap();
    assert_eq!(content.matches("  d1/one.txt\n").count(), 1);
    assert_eq!(content.matches("  d1/two.txt\n").count(), 1);
    assert_eq!(content.matches("  d2/three.txt\n").count(), 1);
    assert_eq!(content.matches(END_MARKER).count(), 1);
    assert!(content.trim_end().ends_with(END_MARKER));

    let parsed = DigestFile::read(&target).unwrap();
    assert_eq!(parsed.len(), 3);
    assert!(parsed.complete);
}

#[test]
fn test_resume_idempotence_individual() {
    let mut harness = TreeHarness::new();
    harness.generate_tree(TreeConfig::default()).unwrap();

    let builder = TreesumBuilder::new().recursive(true);
    let first = builder.clone().build(harness.root()).unwrap().generate().unwrap();
    let before = TreeHarness::digest_snapshot(harness.root());
    assert_eq!(before.len(), first.directories_written);

    let second = builder.resume(true).build(harness.root()).unwrap().generate().unwrap();
    assert_eq!(second.directories_written, 0);
    assert_eq!(second.directories_resumed, first.directories_written);
    assert_eq!(TreeHarness::digest_snapshot(harness.root()), before);
}

#[test]
fn test_resume_idempotence_monolithic() {
    let mut harness = TreeHarness::new();
    let files = harness.generate_tree(TreeConfig::default()).unwrap();

    let builder = TreesumBuilder::new().mode(DigestMode::Monolithic).recursive(true);
    builder.clone().build(harness.root()).unwrap().generate().unwrap();
    let target = harness.root().join("checksums.sha256");
    let before = fs::read(&target).unwrap();

    let again = builder.resume(true).build(harness.root()).unwrap().generate().unwrap();
    assert_eq!(again.monolithic_entries, 0);
    assert_eq!(fs::read(&target).unwrap(), before);
    assert_eq!(DigestFile::read(&target).unwrap().len(), files);
}

#[test]
fn test_clone_verification_is_path_independent() {
    let mut harness = TreeHarness::new();
    harness.generate_tree(TreeConfig::default()).unwrap();
    TreesumBuilder::new()
        .mode(DigestMode::Monolithic)
        .recursive(true)
        .build(harness.root())
        .unwrap()
        .generate()
        .unwrap();
    let digest = harness.root().join("checksums.sha256");

    let clone_dir = TempDir::new().unwrap();
    let clone_root = clone_dir.path().join("copy");
    copy_tree(harness.root(), &clone_root);

    let totals = TreesumBuilder::new()
        .recursive(true)
        .output(&digest)
        .build(&clone_root)
        .unwrap()
        .verify()
        .unwrap();
    assert_eq!(totals.files_verified, harness.files.len());
    assert_eq!(totals.files_extra, 0);
    assert!(totals.status().is_success());

    // A change in the clone is still caught
    let victim = harness.files[0].strip_prefix(harness.root()).unwrap();
    fs::write(clone_root.join(victim), "changed").unwrap();
    let totals = TreesumBuilder::new()
        .recursive(true)
        .output(&digest)
        .build(&clone_root)
        .unwrap()
        .verify()
        .unwrap();
    assert_eq!(totals.files_failed, 1);
}

#[test]
fn test_auto_detects_tree_wide_file() {
    let mut harness = TreeHarness::new();
    harness.write("x/y/z.txt", "deep");
    harness.write("top.txt", "top");
    TreesumBuilder::new()
        .algorithm(HashAlgorithm::Md5)
        .mode(DigestMode::Monolithic)
        .recursive(true)
        .build(harness.root())
        .unwrap()
        .generate()
        .unwrap();

    // Individual mode, sha256: the md5 tree-wide file is found and its algorithm honoured
    let totals = TreesumBuilder::new()
        .recursive(true)
        .build(harness.root())
        .unwrap()
        .verify()
        .unwrap();
    assert_eq!(totals.directories_processed, 1);
    assert_eq!(totals.files_verified, 2);
    assert!(totals.status().is_success());
}

#[test]
fn test_tree_wide_output_in_new_subdirectory() {
    let mut harness = TreeHarness::new();
    harness.write("a/one.txt", "one");
    harness.write("two.txt", "two");

    let treesum = TreesumBuilder::new()
        .mode(DigestMode::Monolithic)
        .recursive(true)
        .output("reports/all.sha256")
        .build(harness.root())
        .unwrap();
    let generated = treesum.generate().unwrap();
    assert_eq!(generated.files_processed, 2);

    let target = harness.root().join("reports/all.sha256");
    let digest = DigestFile::read(&target).unwrap();
    assert!(digest.complete);
    assert_eq!(digest.len(), 2);

    let totals = treesum.verify().unwrap();
    assert_eq!(totals.files_verified, 2);
    assert_eq!(totals.files_extra, 0);
    assert!(totals.status().is_success());
}

#[test]
fn test_shadow_directory_keeps_source_clean() {
    let mut harness = TreeHarness::new();
    harness.generate_tree(TreeConfig::default()).unwrap();
    let shadow = TempDir::new().unwrap();

    let treesum = TreesumBuilder::new()
        .recursive(true)
        .shadow_dir(shadow.path())
        .build(harness.root())
        .unwrap();
    let generated = treesum.generate().unwrap();
    assert!(TreeHarness::digest_snapshot(harness.root()).is_empty());
    assert_eq!(
        TreeHarness::digest_snapshot(shadow.path()).len(),
        generated.directories_written
    );
    assert!(shadow.path().join("dir_0_0").join(SHASUM_FILENAME).is_file());

    let totals = treesum.verify().unwrap();
    assert_eq!(totals.files_verified, harness.files.len());
    assert!(totals.status().is_success());

    fs::write(&harness.files[1], "tampered").unwrap();
    assert_eq!(treesum.verify().unwrap().files_failed, 1);
}

#[test]
fn test_nested_shadow_directory_is_not_walked() {
    let mut harness = TreeHarness::new();
    harness.write("a.txt", "a");
    harness.write("sub/b.txt", "b");

    let treesum = TreesumBuilder::new()
        .recursive(true)
        .shadow_dir(harness.root().join(".digests"))
        .build(harness.root())
        .unwrap();
    let generated = treesum.generate().unwrap();
    assert_eq!(generated.directories_processed, 2);
    assert!(harness.root().join(".digests/sub").join(SHASUM_FILENAME).is_file());

    let totals = treesum.verify().unwrap();
    assert_eq!(totals.files_verified, 2);
    assert_eq!(totals.files_extra, 0);
}

#[test]
fn test_monolithic_in_shadow_directory() {
    let mut harness = TreeHarness::new();
    harness.write("a.txt", "a");
    harness.write("sub/b.txt", "b");
    let shadow = TempDir::new().unwrap();

    let treesum = TreesumBuilder::new()
        .mode(DigestMode::Monolithic)
        .recursive(true)
        .shadow_dir(shadow.path())
        .build(harness.root())
        .unwrap();
    treesum.generate().unwrap();
    assert!(shadow.path().join("checksums.sha256").is_file());
    assert!(!harness.root().join("checksums.sha256").exists());

    let totals = treesum.verify().unwrap();
    assert_eq!(totals.files_verified, 2);
    assert!(totals.status().is_success());
}

#[test]
fn test_filters_apply_to_generation_and_extras() {
    let mut harness = TreeHarness::new();
    harness.write("keep.txt", "keep");
    harness.write("noise.log", "noise");
    harness.write("build/out.o", "object");

    let treesum = TreesumBuilder::new()
        .recursive(true)
        .exclude_patterns(vec!["*.log".to_string(), "build/*".to_string()])
        .build(harness.root())
        .unwrap();
    let generated = treesum.generate().unwrap();
    assert_eq!(generated.files_processed, 1);
    assert_eq!(generated.files_skipped, 2);
    assert!(!harness.root().join("build").join(SHASUM_FILENAME).exists());

    harness.write("later.log", "more noise");
    let totals = treesum.verify().unwrap();
    assert_eq!(totals.files_verified, 1);
    assert_eq!(totals.files_extra, 0);
}

#[test]
fn test_non_recursive_only_touches_root() {
    let mut harness = TreeHarness::new();
    harness.generate_tree(TreeConfig::default()).unwrap();

    let generated = TreesumBuilder::new().build(harness.root()).unwrap().generate().unwrap();
    assert_eq!(generated.directories_processed, 1);
    assert_eq!(TreeHarness::digest_snapshot(harness.root()).len(), 1);
}

#[test]
fn test_both_mode_large_tree() {
    let mut harness = TreeHarness::new();
    let files = harness
        .generate_tree(TreeConfig {
            max_depth: 4,
            dirs_per_level: 3,
            files_per_dir: 6,
            file_size_range: 1..20_000,
        })
        .unwrap();

    let treesum = TreesumBuilder::new()
        .mode(DigestMode::Both)
        .recursive(true)
        .build(harness.root())
        .unwrap();
    let generated = treesum.generate().unwrap();
    assert_eq!(generated.files_processed, files);
    assert_eq!(generated.monolithic_entries, files);

    let totals = treesum.verify().unwrap();
    assert_eq!(totals.files_verified, files);
    assert!(totals.status().is_success());

    let tree_wide = TreesumBuilder::new()
        .mode(DigestMode::Monolithic)
        .recursive(true)
        .build(harness.root())
        .unwrap()
        .verify()
        .unwrap();
    assert_eq!(tree_wide.files_verified, files);
    assert_eq!(tree_wide.files_extra, 0);
}

#[cfg(unix)]
#[test]
fn test_symlink_cycle_visits_each_directory_once() {
    let mut harness = TreeHarness::new();
    harness.write("a/file.txt", "a");
    harness.write("a/b/file.txt", "b");
    utils::create_symlink(&harness.root().join("a"), &harness.root().join("a/b/loop")).unwrap();
    utils::create_symlink(&harness.root().join("a/b"), &harness.root().join("alias")).unwrap();

    let mut visited = Vec::new();
    let totals = TreesumBuilder::new()
        .recursive(true)
        .follow_symlinks(true)
        .build(harness.root())
        .unwrap()
        .generate_with(|o| visited.push(o.directory.clone()))
        .unwrap();

    // root, a, a/b; the loop and the alias lead to directories already seen
    assert_eq!(totals.directories_processed, 3);
    let mut canonical: Vec<PathBuf> = visited.iter().map(|d| fs::canonicalize(d).unwrap()).collect();
    canonical.sort();
    canonical.dedup();
    assert_eq!(canonical.len(), 3);
}
