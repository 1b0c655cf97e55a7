//! Host directory storage
//!
//! Every path is canonicalized before it is joined onto the root, so `..`
//! can never reach outside the directory the store was opened on.

use super::{path, Storage};
use crate::error::{Result, RuntimeError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// [`Storage`] rooted at a host directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open a store on an existing directory
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(RuntimeError::NoSuchEntry(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, entry_path: &str) -> Result<PathBuf> {
        let canonical = path::canonicalize_dir(entry_path)?;
        let mut full = self.root.clone();
        for segment in canonical.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        Ok(full)
    }

    fn metadata(&self, entry_path: &str) -> Result<Option<fs::Metadata>> {
        let full = self.resolve(entry_path)?;
        match fs::metadata(&full) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RuntimeError::Io(e)),
        }
    }
}

impl Storage for FileStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.metadata(path)?.is_some())
    }

    fn is_file(&self, path: &str) -> Result<bool> {
        Ok(self.metadata(path)?.map(|m| m.is_file()).unwrap_or(false))
    }

    fn is_folder(&self, path: &str) -> Result<bool> {
        Ok(self.metadata(path)?.map(|m| m.is_dir()).unwrap_or(false))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self.metadata(path)? {
            None => Err(RuntimeError::NoSuchEntry(path.to_string())),
            Some(meta) if meta.is_dir() => Err(RuntimeError::EntryIsFolder(path.to_string())),
            Some(_) => Ok(fs::read(self.resolve(path)?)?),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        match self.metadata(path)? {
            None => Err(RuntimeError::NoSuchEntry(path.to_string())),
            Some(meta) if !meta.is_dir() => Err(RuntimeError::EntryIsFile(path.to_string())),
            Some(_) => {
                let mut names = Vec::new();
                for entry in fs::read_dir(self.resolve(path)?)? {
                    let entry = entry?;
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
                names.sort();
                Ok(names)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, FileStorage) {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("lib/sub")).unwrap();
        fs::write(temp_dir.path().join("lib/a.js"), "a").unwrap();
        fs::write(temp_dir.path().join("main.js"), "main").unwrap();
        let storage = FileStorage::open(temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_read_and_list() {
        let (_dir, storage) = fixture();

        assert_eq!(storage.read("lib/a.js").unwrap(), b"a");
        assert_eq!(storage.read("/lib/sub/../a.js").unwrap(), b"a");
        assert_eq!(storage.list("").unwrap(), vec!["lib".to_string(), "main.js".to_string()]);
        assert_eq!(storage.list("lib").unwrap(), vec!["a.js".to_string(), "sub".to_string()]);
        assert!(storage.is_folder("lib/sub").unwrap());
        assert!(storage.is_file("main.js").unwrap());
        assert!(!storage.exists("nope.js").unwrap());
    }

    #[test]
    fn test_errors() {
        let (_dir, storage) = fixture();

        assert!(matches!(storage.read("lib"), Err(RuntimeError::EntryIsFolder(_))));
        assert!(matches!(storage.read("nope.js"), Err(RuntimeError::NoSuchEntry(_))));
        assert!(matches!(storage.list("main.js"), Err(RuntimeError::EntryIsFile(_))));
        assert!(matches!(storage.read("../outside.js"), Err(RuntimeError::Path(_))));
        assert!(matches!(storage.exists("lib/../../x"), Err(RuntimeError::Path(_))));
    }

    #[test]
    fn test_open_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(FileStorage::open(temp_dir.path().join("missing")).is_err());
    }
}
