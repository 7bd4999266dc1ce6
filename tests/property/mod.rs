//! Property-based testing for treesum
//!
//! Uses proptest to check the round-trip, clone, resume and normalization
//! invariants over randomly generated trees.

use ::treesum::digest_file::{DigestFile, SHASUM_FILENAME};
use ::treesum::hasher::hash_bytes;
use ::treesum::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate relative file paths: up to three directory levels, then a file
fn path_strategy() -> impl Strategy<Value = String> {
    let dirs = prop::collection::vec("[a-z]{1,6}", 0..=3);
    let filename = prop_oneof![
        "[a-z]{1,8}\\.txt".prop_map(|s| s),
        "[a-z]{1,8}\\.bin".prop_map(|s| s),
        "file [0-9]{1,3}\\.dat".prop_map(|s| s),
    ];
    (dirs, filename).prop_map(|(dirs, name)| {
        let mut parts = dirs;
        parts.push(name);
        parts.join("/")
    })
}

/// Random file contents, text-like or binary
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..512),
        "[ -~\n]{0,256}".prop_map(|s| s.into_bytes()),
    ]
}

fn file_set_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(path_strategy(), content_strategy(), 1..12)
}

fn mode_strategy() -> impl Strategy<Value = DigestMode> {
    prop_oneof![
        Just(DigestMode::Individual),
        Just(DigestMode::Monolithic),
        Just(DigestMode::Both),
    ]
}

fn algorithm_strategy() -> impl Strategy<Value = HashAlgorithm> {
    prop::sample::select(HashAlgorithm::ALL.to_vec())
}

fn write_files(root: &Path, files: &BTreeMap<String, Vec<u8>>) -> anyhow::Result<()> {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Generate then verify on an untouched tree verifies every file
    #[test]
    fn round_trip_verifies_everything(
        files in file_set_strategy(),
        mode in mode_strategy(),
        algorithm in algorithm_strategy(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        write_files(temp_dir.path(), &files).unwrap();

        let treesum = TreesumBuilder::new()
            .algorithm(algorithm)
            .mode(mode)
            .recursive(true)
            .build(temp_dir.path())
            .unwrap();
        let generated = treesum.generate().unwrap();
        prop_assert_eq!(generated.files_processed, files.len());

        let totals = treesum.verify().unwrap();
        prop_assert_eq!(totals.files_verified, files.len());
        prop_assert_eq!(totals.files_failed, 0);
        prop_assert_eq!(totals.files_missing, 0);
        prop_assert_eq!(totals.files_extra, 0);
        prop_assert_eq!(totals.status().exit_code, 0);
    }

    /// The root recorded in a tree-wide file has no effect on verification
    #[test]
    fn clone_verification_ignores_recorded_root(files in file_set_strategy()) {
        let original = TempDir::new().unwrap();
        let clone = TempDir::new().unwrap();
        write_files(original.path(), &files).unwrap();
        write_files(clone.path(), &files).unwrap();

        let digest = original.path().join("tree.sha256");
        TreesumBuilder::new()
            .mode(DigestMode::Monolithic)
            .recursive(true)
            .output(&digest)
            .build(original.path())
            .unwrap()
            .generate()
            .unwrap();

        let verify = |root: &Path| {
            TreesumBuilder::new()
                .recursive(true)
                .output(&digest)
                .build(root)
                .unwrap()
                .verify()
                .unwrap()
        };
        let here = verify(original.path());
        let there = verify(clone.path());
        prop_assert_eq!(here.files_verified, files.len());
        prop_assert_eq!(there.files_verified, here.files_verified);
        prop_assert_eq!(there.files_extra, 0);
        prop_assert_eq!(there.status(), here.status());
    }

    /// Resuming a tree-wide run never records an entry twice
    #[test]
    fn resume_never_duplicates_entries(
        dirs in prop::collection::btree_set("[a-z]{1,6}", 1..5),
        files_per_dir in 1usize..4,
        done in 0usize..5,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let dirs: Vec<String> = dirs.into_iter().collect();
        let done = done.min(dirs.len());
        let populate = |dir: &str| {
            for i in 0..files_per_dir {
                let path = root.join(dir).join(format!("f{}.txt", i));
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, format!("{}/{}", dir, i)).unwrap();
            }
        };

        let builder = TreesumBuilder::new().mode(DigestMode::Monolithic).recursive(true);
        dirs[..done].iter().for_each(|d| populate(d.as_str()));
        builder.clone().build(root).unwrap().generate().unwrap();

        dirs[done..].iter().for_each(|d| populate(d.as_str()));
        let resumed = builder.resume(true).build(root).unwrap().generate().unwrap();
        prop_assert_eq!(resumed.directories_resumed, done);
        prop_assert_eq!(resumed.monolithic_entries, (dirs.len() - done) * files_per_dir);

        let target = root.join("checksums.sha256");
        let content = fs::read_to_string(&target).unwrap();
        for dir in &dirs {
            for i in 0..files_per_dir {
                let line_suffix = format!("  {}/f{}.txt\n", dir, i);
                prop_assert_eq!(content.matches(line_suffix.as_str()).count(), 1);
            }
        }
        prop_assert_eq!(DigestFile::read(&target).unwrap().len(), dirs.len() * files_per_dir);
    }

    /// Text digests do not depend on the line terminators used on disk
    #[test]
    fn line_endings_do_not_change_text_digest(
        lines in prop::collection::vec("[ -~]{0,40}", 1..20),
        algorithm in algorithm_strategy(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let lf = temp_dir.path().join("lf.txt");
        let crlf = temp_dir.path().join("crlf.txt");
        let cr = temp_dir.path().join("cr.txt");
        fs::write(&lf, lines.join("\n")).unwrap();
        fs::write(&crlf, lines.join("\r\n")).unwrap();
        fs::write(&cr, lines.join("\r")).unwrap();

        for policy in [LineEndingPolicy::Auto, LineEndingPolicy::Unix, LineEndingPolicy::Windows] {
            let hasher = Hasher::new(algorithm, policy);
            let expected = hasher.hash_file(&lf).unwrap();
            prop_assert_eq!(hasher.hash_file(&crlf).unwrap(), expected.clone());
            prop_assert_eq!(hasher.hash_file(&cr).unwrap(), expected);
        }

        let windows = Hasher::new(algorithm, LineEndingPolicy::Windows);
        prop_assert_eq!(
            windows.hash_file(&lf).unwrap(),
            hash_bytes(lines.join("\r\n").as_bytes(), algorithm)
        );
    }

    /// Any single changed byte is reported as a failure
    #[test]
    fn single_byte_change_is_detected(
        content in prop::collection::vec(any::<u8>(), 1..4096),
        index in any::<prop::sample::Index>(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let path: PathBuf = temp_dir.path().join("payload.dat");
        fs::write(&path, &content).unwrap();

        let treesum = TreesumBuilder::new()
            .line_endings(LineEndingPolicy::Preserve)
            .build(temp_dir.path())
            .unwrap();
        treesum.generate().unwrap();
        prop_assert!(temp_dir.path().join(SHASUM_FILENAME).is_file());

        let mut changed = content.clone();
        let at = index.index(changed.len());
        changed[at] ^= 0xFF;
        fs::write(&path, &changed).unwrap();

        let totals = treesum.verify().unwrap();
        prop_assert_eq!(totals.files_failed, 1);
        prop_assert_eq!(totals.files_verified, 0);
    }
}
