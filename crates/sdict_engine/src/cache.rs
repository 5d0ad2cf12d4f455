//! Local snapshot cache.
//!
//! The cache directory holds two files:
//! - `dsp` - the raw dictionary blob of the last changed fetch
//! - `md5` - the 16-byte MD5 digest of that blob

use crate::error::{CacheError, CacheResult};
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Blob file name.
pub const SNAPSHOT_FILE: &str = "dsp";
/// Digest file name.
pub const DIGEST_FILE: &str = "md5";

const TEMP_SUFFIX: &str = ".tmp";

/// A cached dictionary blob and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Raw dictionary blob.
    pub blob: Vec<u8>,
    /// MD5 digest as stored next to the blob.
    pub digest: [u8; 16],
}

/// Persists the last successfully fetched dictionary blob.
///
/// # Invariants
///
/// - Both files are written together, each through a temporary sibling that
///   is renamed into place
/// - A disabled cache never touches the filesystem
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    dir: Option<PathBuf>,
}

impl SnapshotCache {
    /// Creates a cache rooted at `dir`, or a disabled one for `None`.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Creates a disabled cache.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Returns true if a directory is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Loads the snapshot.
    ///
    /// Returns `Ok(None)` if caching is disabled or either file is missing.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or a digest file of the wrong size.
    pub fn load(&self) -> CacheResult<Option<Snapshot>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };

        let Some(digest) = read_optional(&dir.join(DIGEST_FILE))? else {
            return Ok(None);
        };
        let Some(blob) = read_optional(&dir.join(SNAPSHOT_FILE))? else {
            return Ok(None);
        };

        let digest: [u8; 16] = digest
            .as_slice()
            .try_into()
            .map_err(|_| CacheError::CorruptDigest { len: digest.len() })?;
        Ok(Some(Snapshot { blob, digest }))
    }

    /// Stores `blob` and its freshly computed digest.
    ///
    /// Returns the digest, or `None` if caching is disabled.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or a file cannot be written.
    pub fn store(&self, blob: &[u8]) -> CacheResult<Option<[u8; 16]>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        fs::create_dir_all(dir)?;

        let digest = digest(blob);
        write_atomic(dir, SNAPSHOT_FILE, blob)?;
        write_atomic(dir, DIGEST_FILE, &digest)?;
        Ok(Some(digest))
    }
}

/// Computes the MD5 digest of a blob.
#[must_use]
pub fn digest(blob: &[u8]) -> [u8; 16] {
    Md5::digest(blob).into()
}

fn read_optional(path: &Path) -> CacheResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> CacheResult<()> {
    let path = dir.join(name);
    let temp_path = dir.join(format!("{name}{TEMP_SUFFIX}"));

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, &path)?;
    Ok(())
}
