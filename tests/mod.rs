//! Main test module for Treesum
//!
//! This module includes all test suites:
//! - Integration tests for complete generate, verify and update runs
//! - Chaos tests for damaged trees and interrupted runs
//! - Property-based tests for invariants
//! - Edge cases for unusual names and content

pub mod integration;
pub mod property;

pub use integration::{FileGenerator, TreeConfig, TreeHarness};

#[cfg(test)]
mod edge_cases {
    use ::treesum::digest_file::{DigestFile, SHASUM_FILENAME};
    use ::treesum::hasher::hash_bytes;
    use ::treesum::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("nested/deeper")).unwrap();

        let treesum = TreesumBuilder::new().recursive(true).build(temp_dir.path()).unwrap();
        let generated = treesum.generate().unwrap();
        assert_eq!(generated.directories_processed, 3);
        assert_eq!(generated.directories_written, 0);
        assert_eq!(generated.files_processed, 0);
        assert!(!temp_dir.path().join(SHASUM_FILENAME).exists());

        // Nothing recorded and nothing on disk is a success
        let totals = treesum.verify().unwrap();
        assert_eq!(totals.directories_no_digest, 3);
        assert_eq!(totals.status().label, "SUCCESS");
        assert_eq!(totals.status().exit_code, 0);
    }

    #[test]
    fn test_empty_tree_monolithic() {
        let temp_dir = TempDir::new().unwrap();
        let treesum = TreesumBuilder::new()
            .mode(DigestMode::Monolithic)
            .recursive(true)
            .build(temp_dir.path())
            .unwrap();
        treesum.generate().unwrap();

        let digest = DigestFile::read(&temp_dir.path().join("checksums.sha256")).unwrap();
        assert!(digest.is_empty());
        assert!(digest.complete);
        assert!(treesum.verify().unwrap().status().is_success());
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file  with  double  spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
            " leading space.txt",
            "*starred.bin",
        ];

        let mut created = Vec::new();
        for name in &special_names {
            if fs::write(temp_dir.path().join(name), format!("Content of {}", name)).is_ok() {
                created.push(*name);
            }
        }

        let treesum = TreesumBuilder::new().build(temp_dir.path()).unwrap();
        let generated = treesum.generate().unwrap();
        assert_eq!(generated.files_processed, created.len());

        let digest = DigestFile::read(&temp_dir.path().join(SHASUM_FILENAME)).unwrap();
        for name in &created {
            assert!(digest.entries.contains_key(*name), "{:?} not recorded", name);
        }

        let totals = treesum.verify().unwrap();
        assert_eq!(totals.files_verified, created.len());
        assert_eq!(totals.status().label, "SUCCESS");
    }

    #[test]
    fn test_unicode_filenames() {
        let temp_dir = TempDir::new().unwrap();

        let unicode_names = vec![
            "файл.txt",     // Russian
            "文件.txt",     // Chinese
            "ファイル.txt", // Japanese
            "αρχείο.txt",   // Greek
            "🚀🌟💾.txt",   // Emojis
        ];

        let mut created = Vec::new();
        for name in &unicode_names {
            let dir = temp_dir.path().join(format!("dir_{}", created.len()));
            fs::create_dir_all(&dir).unwrap();
            match fs::write(dir.join(name), format!("Unicode content: {}", name)) {
                Ok(_) => created.push(*name),
                Err(_) => continue, // Skip unsupported names
            }
        }
        if created.is_empty() {
            return;
        }

        for mode in [DigestMode::Individual, DigestMode::Monolithic] {
            let treesum = TreesumBuilder::new()
                .mode(mode)
                .recursive(true)
                .overwrite(true)
                .build(temp_dir.path())
                .unwrap();
            treesum.generate().unwrap();
            let totals = treesum.verify().unwrap();
            assert_eq!(totals.files_verified, created.len(), "{:?}", mode);
            assert_eq!(totals.files_extra, 0, "{:?}", mode);
        }
    }

    #[test]
    fn test_crlf_text_under_each_policy() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, "one\r\ntwo\r\nthree").unwrap();

        let expected = [
            (LineEndingPolicy::Auto, hash_bytes(b"one\ntwo\nthree", HashAlgorithm::Sha256)),
            (LineEndingPolicy::Unix, hash_bytes(b"one\ntwo\nthree", HashAlgorithm::Sha256)),
            (LineEndingPolicy::Windows, hash_bytes(b"one\r\ntwo\r\nthree", HashAlgorithm::Sha256)),
            (LineEndingPolicy::Preserve, hash_bytes(b"one\r\ntwo\r\nthree", HashAlgorithm::Sha256)),
        ];

        for (policy, hash) in expected {
            let hasher = Hasher::new(HashAlgorithm::Sha256, policy);
            assert_eq!(hasher.hash_file(&path).unwrap(), hash, "{:?}", policy);
        }
    }

    #[test]
    fn test_binary_file_is_never_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("image.dat");
        let content = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR".to_vec();
        fs::write(&path, &content).unwrap();

        let raw = hash_bytes(&content, HashAlgorithm::Sha1);
        for policy in [LineEndingPolicy::Auto, LineEndingPolicy::Unix, LineEndingPolicy::Windows] {
            let hasher = Hasher::new(HashAlgorithm::Sha1, policy);
            assert_eq!(hasher.hash_file(&path).unwrap(), raw, "{:?}", policy);
        }
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("empty.txt"), "").unwrap();

        let treesum = TreesumBuilder::new().algorithm(HashAlgorithm::Md5).build(temp_dir.path()).unwrap();
        treesum.generate().unwrap();

        let digest = DigestFile::read(&temp_dir.path().join(SHASUM_FILENAME)).unwrap();
        assert_eq!(
            digest.entries.get("empty.txt").map(String::as_str),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert_eq!(treesum.verify().unwrap().files_verified, 1);
    }

    #[test]
    fn test_hidden_files_are_included() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".env"), "KEY=value\n").unwrap();
        fs::create_dir_all(temp_dir.path().join(".config")).unwrap();
        fs::write(temp_dir.path().join(".config/settings"), "x").unwrap();

        let treesum = TreesumBuilder::new().recursive(true).build(temp_dir.path()).unwrap();
        assert_eq!(treesum.generate().unwrap().files_processed, 2);
    }
}
