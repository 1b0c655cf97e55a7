//! In-memory folder tree
//!
//! Holds built-in modules and test fixtures. Reads are counted so callers can
//! observe cache behaviour.

use super::{path, Storage};
use crate::error::{Result, RuntimeError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Folder(BTreeMap<String, Node>),
}

impl Node {
    fn lookup(&self, segments: &[&str]) -> Option<&Node> {
        let mut node = self;
        for segment in segments {
            match node {
                Node::Folder(children) => node = children.get(*segment)?,
                Node::File(_) => return None,
            }
        }
        Some(node)
    }
}

/// Thread-safe in-memory [`Storage`]
pub struct MemoryStorage {
    root: RwLock<Node>,
    reads: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::Folder(BTreeMap::new())),
            reads: AtomicUsize::new(0),
        }
    }

    /// Build a storage from `(path, content)` pairs
    pub fn with_files<I, P, C>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<Vec<u8>>,
    {
        let storage = Self::new();
        for (path, content) in files {
            storage.insert(path.as_ref(), content)?;
        }
        Ok(storage)
    }

    /// Write a file, creating parent folders
    pub fn insert(&self, file_path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let canonical = path::canonicalize(file_path)?;
        let segments: Vec<&str> = canonical.split('/').collect();
        let Some((name, parents)) = segments.split_last() else {
            return Err(RuntimeError::Path(file_path.to_string()));
        };

        let mut root = self.root.write();
        let mut node = &mut *root;
        for segment in parents {
            let children = match node {
                Node::Folder(children) => children,
                Node::File(_) => return Err(RuntimeError::EntryIsFile(canonical.clone())),
            };
            node = children
                .entry(segment.to_string())
                .or_insert_with(|| Node::Folder(BTreeMap::new()));
        }
        match node {
            Node::Folder(children) => {
                if let Some(Node::Folder(_)) = children.get(*name) {
                    return Err(RuntimeError::EntryIsFolder(canonical.clone()));
                }
                children.insert(name.to_string(), Node::File(content.into()));
                Ok(())
            }
            Node::File(_) => Err(RuntimeError::EntryIsFile(canonical.clone())),
        }
    }

    /// Remove a file or folder; returns whether anything was removed
    pub fn remove(&self, file_path: &str) -> Result<bool> {
        let canonical = path::canonicalize(file_path)?;
        let segments: Vec<&str> = canonical.split('/').collect();
        let Some((name, parents)) = segments.split_last() else {
            return Err(RuntimeError::Path(file_path.to_string()));
        };

        let mut root = self.root.write();
        let mut node = &mut *root;
        for segment in parents {
            node = match node {
                Node::Folder(children) => match children.get_mut(*segment) {
                    Some(child) => child,
                    None => return Ok(false),
                },
                Node::File(_) => return Ok(false),
            };
        }
        match node {
            Node::Folder(children) => Ok(children.remove(*name).is_some()),
            Node::File(_) => Ok(false),
        }
    }

    /// Number of `read` calls served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn with_node<T>(&self, entry_path: &str, f: impl FnOnce(Option<&Node>) -> T) -> Result<T> {
        let canonical = path::canonicalize_dir(entry_path)?;
        let segments: Vec<&str> = canonical.split('/').filter(|s| !s.is_empty()).collect();
        let root = self.root.read();
        Ok(f(root.lookup(&segments)))
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        self.with_node(path, |node| node.is_some())
    }

    fn is_file(&self, path: &str) -> Result<bool> {
        self.with_node(path, |node| matches!(node, Some(Node::File(_))))
    }

    fn is_folder(&self, path: &str) -> Result<bool> {
        self.with_node(path, |node| matches!(node, Some(Node::Folder(_))))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.with_node(path, |node| match node {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(Node::Folder(_)) => Err(RuntimeError::EntryIsFolder(path.to_string())),
            None => Err(RuntimeError::NoSuchEntry(path.to_string())),
        })?
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        self.with_node(path, |node| match node {
            Some(Node::Folder(children)) => Ok(children.keys().cloned().collect()),
            Some(Node::File(_)) => Err(RuntimeError::EntryIsFile(path.to_string())),
            None => Err(RuntimeError::NoSuchEntry(path.to_string())),
        })?
    }
}
