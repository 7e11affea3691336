//! Storage locator: named disks mapped to root directories.
//!
//! Spreadsheets are referenced as `(disk, relative path)`. The `local` disk
//! always exists.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{StorageError, StorageResult};

/// Name of the default disk.
pub const LOCAL_DISK: &str = "local";

/// Default root of the `local` disk.
pub const DEFAULT_DISK_ROOT: &str = "storage/app";

/// Disk registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disks {
    roots: BTreeMap<String, PathBuf>,
}

impl Default for Disks {
    fn default() -> Self {
        Self::new(DEFAULT_DISK_ROOT)
    }
}

impl Disks {
    /// Registry with the `local` disk rooted at `local_root`.
    pub fn new(local_root: impl AsRef<Path>) -> Self {
        let mut roots = BTreeMap::new();
        roots.insert(LOCAL_DISK.to_string(), local_root.as_ref().to_path_buf());
        Self { roots }
    }

    /// Add or replace a disk.
    pub fn with_disk(mut self, name: impl Into<String>, root: impl AsRef<Path>) -> Self {
        self.roots.insert(name.into(), root.as_ref().to_path_buf());
        self
    }

    pub fn root(&self, disk: &str) -> StorageResult<&Path> {
        self.roots
            .get(disk)
            .map(PathBuf::as_path)
            .ok_or_else(|| StorageError::UnknownDisk(disk.to_string()))
    }

    /// Resolve an existing file on a disk.
    pub fn path(&self, disk: &str, relative: &str) -> StorageResult<PathBuf> {
        let path = self.resolve(disk, relative)?;
        if !path.is_file() {
            return Err(StorageError::NotFound { disk: disk.to_string(), path: relative.to_string() });
        }
        Ok(path)
    }

    /// Write a file on a disk, creating parent directories.
    pub fn put(&self, disk: &str, relative: &str, bytes: &[u8]) -> StorageResult<PathBuf> {
        let path = self.resolve(disk, relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Delete a file on a disk; a missing file is not an error.
    pub fn delete(&self, disk: &str, relative: &str) -> StorageResult<()> {
        let path = self.resolve(disk, relative)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Join a relative path onto the disk root; absolute paths and `..` are
    /// refused.
    fn resolve(&self, disk: &str, relative: &str) -> StorageResult<PathBuf> {
        let root = self.root(disk)?;
        let rel = Path::new(relative);

        let escapes = relative.is_empty()
            || rel.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StorageError::InvalidPath { disk: disk.to_string(), path: relative.to_string() });
        }

        Ok(root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_and_path() {
        let dir = tempdir().unwrap();
        let disks = Disks::new(dir.path());

        let written = disks.put(LOCAL_DISK, "imports/users.csv", b"a;b").unwrap();
        assert_eq!(disks.path(LOCAL_DISK, "imports/users.csv").unwrap(), written);

        disks.delete(LOCAL_DISK, "imports/users.csv").unwrap();
        disks.delete(LOCAL_DISK, "imports/users.csv").unwrap();
        assert!(matches!(
            disks.path(LOCAL_DISK, "imports/users.csv"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_disk() {
        let disks = Disks::default();
        assert!(matches!(disks.path("s3", "a.csv"), Err(StorageError::UnknownDisk(_))));
        assert_eq!(disks.root(LOCAL_DISK).unwrap(), Path::new(DEFAULT_DISK_ROOT));
    }

    #[test]
    fn test_traversal_is_refused() {
        let dir = tempdir().unwrap();
        let disks = Disks::new(dir.path()).with_disk("uploads", dir.path().join("up"));

        for bad in ["../secret.csv", "/etc/passwd", "a/../../b.csv", ""] {
            assert!(
                matches!(disks.path("uploads", bad), Err(StorageError::InvalidPath { .. })),
                "{} should be refused",
                bad
            );
        }
    }
}
