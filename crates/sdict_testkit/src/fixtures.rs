//! Test fixtures.

use sdict_protocol::Record;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Query password used by the fixtures.
pub const READ_PASSWORD: &str = "fumiama";
/// Mutation password used by the fixtures.
pub const WRITE_PASSWORD: &str = "fumiama-set";

/// A small dictionary with mixed-case and non-ASCII content.
pub fn sample_records() -> Vec<Record> {
    vec![
        Record::new("apple", "a red fruit"),
        Record::new("Banana", "a yellow fruit"),
        Record::new("carrot", "an orange vegetable"),
        Record::new("日本", "Japan"),
    ]
}

/// A temporary cache directory with automatic cleanup.
pub struct TestCacheDir {
    temp_dir: TempDir,
}

impl TestCacheDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the path of a file inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

impl Default for TestCacheDir {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestCacheDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCacheDir")
            .field("path", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_removed_on_drop() {
        let dir = TestCacheDir::new();
        let path = dir.path().to_path_buf();
        std::fs::write(dir.file("dsp"), b"blob").unwrap();
        assert!(path.exists());

        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn sample_keys_are_unique() {
        let records = sample_records();
        let mut keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), records.len());
    }
}
