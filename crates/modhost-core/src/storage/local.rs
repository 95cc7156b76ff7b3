use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::kernel::error::{Error, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::provider::StorageProvider;

/// Local filesystem storage provider rooted at a base directory
#[derive(Clone)]
pub struct LocalStorageProvider {
    base_path: PathBuf,
}

impl LocalStorageProvider {
    /// Create a new local storage provider with the given base path
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a relative path against the base path
    fn resolve_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.base_path.join(path)
    }

    /// Rejects paths that would escape the base directory
    pub fn is_contained(path: &Path) -> bool {
        path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    }
}

impl StorageProvider for LocalStorageProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve_path(path).is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve_path(path).is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path).map_err(|e| Error::io(e, "create_dir_all", full_path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let full_path = self.resolve_path(path);
        fs::read_to_string(&full_path).map_err(|e| Error::io(e, "read_to_string", full_path))
    }

    fn read_to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).map_err(|e| Error::io(e, "read_to_bytes", full_path))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<()> {
        self.write_bytes(path, contents.as_bytes())
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path);
        let parent = match full_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => {
                return Err(StorageSystemError::OperationFailed {
                    operation: "write_bytes".to_string(),
                    path: Some(full_path),
                    message: "Cannot write to path without parent directory".to_string(),
                }
                .into());
            }
        };
        if !parent.is_dir() {
            fs::create_dir_all(&parent).map_err(|e| Error::io(e, "create_dir_all", parent.clone()))?;
        }

        // Write next to the target, then swap it in
        let mut temp_file =
            NamedTempFile::new_in(&parent).map_err(|e| Error::io(e, "create_temp_file", parent.clone()))?;
        temp_file
            .write_all(contents)
            .map_err(|e| Error::io(e, "write_to_temp_file", temp_file.path().to_path_buf()))?;
        temp_file
            .persist(&full_path)
            .map_err(|e| Error::io(e.error, "persist_temp_file", full_path.clone()))?;

        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::remove_file(&full_path).map_err(|e| Error::io(e, "remove_file", full_path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full_path = self.resolve_path(path);
        let entries = fs::read_dir(&full_path).map_err(|e| Error::io(e, "read_dir", full_path.clone()))?;
        let mut result = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| Error::io(e, "read_dir_entry", full_path.clone()))?;
            let path = entry.path();
            match path.strip_prefix(&self.base_path) {
                Ok(rel_path) => result.push(rel_path.to_path_buf()),
                Err(_) => result.push(path),
            }
        }
        result.sort();

        Ok(result)
    }
}

impl fmt::Debug for LocalStorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStorageProvider")
            .field("base_path", &self.base_path)
            .finish()
    }
}
