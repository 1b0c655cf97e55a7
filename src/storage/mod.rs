//! Storage layer
//!
//! Byte-addressable hierarchical stores the loaders read code from. The
//! loaders depend only on the [`Storage`] trait; the adapters below cover a
//! host directory, an in-memory tree and a content-addressed commit tree.

pub mod path;
pub mod fs;
pub mod memory;
pub mod tree;

pub use fs::FileStorage;
pub use memory::MemoryStorage;
pub use tree::{Object, ObjectId, ObjectStore, TreeEntry, TreeStorage};

use crate::error::Result;

/// Capability surface of a code store.
///
/// Paths are slash-separated and relative to the store's root; every adapter
/// canonicalizes them with [`path`] before use.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;

    fn is_file(&self, path: &str) -> Result<bool>;

    fn is_folder(&self, path: &str) -> Result<bool>;

    /// Fails with `NoSuchEntry` or `EntryIsFolder`
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Sorted entry names; fails with `NoSuchEntry` or `EntryIsFile`
    fn list(&self, path: &str) -> Result<Vec<String>>;
}

/// Read a file, mapping not-found and folder mismatches to `None`.
///
/// This is the only place the runtime swallows a storage error; it exists so
/// resolution chains can fall through to the next candidate.
pub fn read_safely(storage: &dyn Storage, path: &str) -> Result<Option<Vec<u8>>> {
    match storage.read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.is_absent_entry() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Read a file as UTF-8 source text.
pub fn read_text(storage: &dyn Storage, path: &str) -> Result<String> {
    let bytes = storage.read(path)?;
    String::from_utf8(bytes).map_err(|e| crate::RuntimeError::Value(format!("{} is not valid UTF-8: {}", path, e)))
}

/// `read_safely` for source text.
pub fn read_text_safely(storage: &dyn Storage, path: &str) -> Result<Option<String>> {
    match read_safely(storage, path)? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| crate::RuntimeError::Value(format!("{} is not valid UTF-8: {}", path, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeError;

    #[test]
    fn test_read_safely() {
        let storage = MemoryStorage::new();
        storage.insert("lib/a.js", "1").unwrap();

        assert_eq!(read_safely(&storage, "lib/a.js").unwrap(), Some(b"1".to_vec()));
        assert_eq!(read_safely(&storage, "lib/missing.js").unwrap(), None);
        // Folder mismatch is absence too
        assert_eq!(read_safely(&storage, "lib").unwrap(), None);
        // Path errors are not swallowed
        assert!(matches!(read_safely(&storage, "../a.js"), Err(RuntimeError::Path(_))));
    }

    #[test]
    fn test_read_text() {
        let storage = MemoryStorage::new();
        storage.insert("a.js", vec![0xff, 0xfe]).unwrap();
        assert!(matches!(read_text(&storage, "a.js"), Err(RuntimeError::Value(_))));
        assert_eq!(read_text_safely(&storage, "b.js").unwrap(), None);
    }
}
