//! Content-addressed object store and commit-tree storage
//!
//! Repositories hold immutable blobs, trees, commits and tags addressed by
//! the SHA-256 of their encoding, plus a mutable table of named refs.
//! [`TreeStorage`] exposes the tree of one commit through [`Storage`].

use super::{path, Storage};
use crate::error::{Result, RuntimeError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Ref prefixes tried, in order, when dereferencing a short name
const REF_PREFIXES: [&str; 4] = ["", "refs/", "refs/tags/", "refs/heads/"];

/// Marker of a symbolic ref value
const SYMBOLIC_REF: &str = "ref: ";

/// Hex-encoded SHA-256 object id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    fn of(object: &Object) -> Result<Self> {
        let encoded = bincode::serialize(object)?;
        let digest = Sha256::digest(&encoded);
        let hex = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One named child of a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub id: ObjectId,
    pub is_tree: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    Blob(Vec<u8>),
    /// Entries sorted by name
    Tree(Vec<TreeEntry>),
    Commit {
        tree: ObjectId,
        parents: Vec<ObjectId>,
        message: String,
    },
    Tag {
        target: ObjectId,
        name: String,
    },
}

impl Object {
    fn kind(&self) -> &'static str {
        match self {
            Object::Blob(_) => "blob",
            Object::Tree(_) => "tree",
            Object::Commit { .. } => "commit",
            Object::Tag { .. } => "tag",
        }
    }
}

/// In-memory content-addressed repository
#[derive(Default)]
pub struct ObjectStore {
    objects: RwLock<HashMap<ObjectId, Arc<Object>>>,
    refs: RwLock<BTreeMap<String, String>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object; storing the same content twice yields the same id
    pub fn put(&self, object: Object) -> Result<ObjectId> {
        let id = ObjectId::of(&object)?;
        self.objects.write().entry(id.clone()).or_insert_with(|| Arc::new(object));
        Ok(id)
    }

    pub fn get(&self, id: &ObjectId) -> Result<Arc<Object>> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::Value(format!("No such object: {}", id)))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }

    /// Point a ref at an object id
    pub fn set_ref(&self, name: &str, id: &ObjectId) {
        self.refs.write().insert(name.to_string(), id.as_str().to_string());
    }

    /// Make `name` a symbolic ref to another ref
    pub fn set_symbolic_ref(&self, name: &str, target: &str) {
        self.refs.write().insert(name.to_string(), format!("{}{}", SYMBOLIC_REF, target));
    }

    pub fn ref_names(&self) -> Vec<String> {
        self.refs.read().keys().cloned().collect()
    }

    /// Resolve a short ref name to an object id, following symbolic refs
    pub fn deref(&self, reference: &str) -> Result<ObjectId> {
        let refs = self.refs.read();
        let mut link = REF_PREFIXES
            .iter()
            .find_map(|prefix| refs.get(&format!("{}{}", prefix, reference)))
            .ok_or_else(|| RuntimeError::Value(format!("No such reference: {}", reference)))?;

        let mut hops = 0;
        while let Some(target) = link.strip_prefix(SYMBOLIC_REF) {
            hops += 1;
            if hops > refs.len() {
                return Err(RuntimeError::Value(format!("Symbolic ref loop at {}", reference)));
            }
            link = refs
                .get(target)
                .ok_or_else(|| RuntimeError::Value(format!("No such reference: {}", target)))?;
        }
        Ok(ObjectId(link.clone()))
    }

    /// Accept either a full object id or a ref name
    pub fn resolve(&self, reference: &str) -> Result<ObjectId> {
        let direct = ObjectId(reference.to_string());
        if self.contains(&direct) {
            return Ok(direct);
        }
        self.deref(reference)
    }

    /// Build trees for a flat file list and commit them
    pub fn commit_files<I, P, C>(&self, files: I, message: &str, parents: Vec<ObjectId>) -> Result<ObjectId>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<Vec<u8>>,
    {
        let mut root = PendingTree::default();
        for (file_path, content) in files {
            let canonical = path::canonicalize(file_path.as_ref())?;
            root.insert(&canonical.split('/').collect::<Vec<_>>(), content.into())?;
        }
        let tree = root.store(self)?;
        self.put(Object::Commit {
            tree,
            parents,
            message: message.to_string(),
        })
    }

    /// Tag an object and point `refs/tags/<name>` at the tag
    pub fn tag(&self, name: &str, target: &ObjectId) -> Result<ObjectId> {
        let id = self.put(Object::Tag {
            target: target.clone(),
            name: name.to_string(),
        })?;
        self.set_ref(&format!("refs/tags/{}", name), &id);
        Ok(id)
    }
}

/// Mutable tree used while building a commit
#[derive(Default)]
struct PendingTree {
    files: BTreeMap<String, Vec<u8>>,
    folders: BTreeMap<String, PendingTree>,
}

impl PendingTree {
    fn insert(&mut self, segments: &[&str], content: Vec<u8>) -> Result<()> {
        match segments {
            [] => Err(RuntimeError::Path("empty path".into())),
            [name] => {
                if self.folders.contains_key(*name) {
                    return Err(RuntimeError::EntryIsFolder(name.to_string()));
                }
                self.files.insert(name.to_string(), content);
                Ok(())
            }
            [name, rest @ ..] => {
                if self.files.contains_key(*name) {
                    return Err(RuntimeError::EntryIsFile(name.to_string()));
                }
                self.folders.entry(name.to_string()).or_default().insert(rest, content)
            }
        }
    }

    fn store(self, store: &ObjectStore) -> Result<ObjectId> {
        let mut entries = Vec::with_capacity(self.files.len() + self.folders.len());
        for (name, content) in self.files {
            let id = store.put(Object::Blob(content))?;
            entries.push(TreeEntry { name, id, is_tree: false });
        }
        for (name, folder) in self.folders {
            let id = folder.store(store)?;
            entries.push(TreeEntry { name, id, is_tree: true });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        store.put(Object::Tree(entries))
    }
}

enum Located {
    Missing,
    File(ObjectId),
    Folder(Arc<Object>),
}

/// [`Storage`] over the tree of one commit
pub struct TreeStorage {
    store: Arc<ObjectStore>,
    root: Arc<Object>,
    commit: ObjectId,
}

impl TreeStorage {
    /// Open the commit named by an id, a ref or a tag
    pub fn new(store: Arc<ObjectStore>, reference: &str) -> Result<Self> {
        let mut id = store.resolve(reference)?;
        let mut object = store.get(&id)?;
        if let Object::Tag { target, .. } = &*object {
            id = target.clone();
            object = store.get(&id)?;
        }
        let tree = match &*object {
            Object::Commit { tree, .. } => tree.clone(),
            other => {
                return Err(RuntimeError::Value(format!("Non-commit git object: {}", other.kind())));
            }
        };
        let root = store.get(&tree)?;
        Ok(Self { store, root, commit: id })
    }

    pub fn commit(&self) -> &ObjectId {
        &self.commit
    }

    fn locate(&self, entry_path: &str) -> Result<Located> {
        let segments = path::segments(entry_path)?;
        let mut current = Arc::clone(&self.root);
        for (idx, segment) in segments.iter().enumerate() {
            let entry = match &*current {
                Object::Tree(entries) => entries.iter().find(|e| e.name == *segment).cloned(),
                _ => None,
            };
            let Some(entry) = entry else {
                return Ok(Located::Missing);
            };
            if !entry.is_tree {
                return Ok(if idx + 1 == segments.len() {
                    Located::File(entry.id)
                } else {
                    Located::Missing
                });
            }
            current = self.store.get(&entry.id)?;
        }
        Ok(Located::Folder(current))
    }
}

impl Storage for TreeStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(!matches!(self.locate(path)?, Located::Missing))
    }

    fn is_file(&self, path: &str) -> Result<bool> {
        Ok(matches!(self.locate(path)?, Located::File(_)))
    }

    fn is_folder(&self, path: &str) -> Result<bool> {
        Ok(matches!(self.locate(path)?, Located::Folder(_)))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self.locate(path)? {
            Located::Missing => Err(RuntimeError::NoSuchEntry(path.to_string())),
            Located::Folder(_) => Err(RuntimeError::EntryIsFolder(path.to_string())),
            Located::File(id) => match &*self.store.get(&id)? {
                Object::Blob(bytes) => Ok(bytes.clone()),
                other => Err(RuntimeError::Value(format!("Expected blob, found {}", other.kind()))),
            },
        }
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        match self.locate(path)? {
            Located::Missing => Err(RuntimeError::NoSuchEntry(path.to_string())),
            Located::File(_) => Err(RuntimeError::EntryIsFile(path.to_string())),
            Located::Folder(tree) => match &*tree {
                Object::Tree(entries) => Ok(entries.iter().map(|e| e.name.clone()).collect()),
                _ => Ok(Vec::new()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (Arc<ObjectStore>, ObjectId) {
        let store = Arc::new(ObjectStore::new());
        let commit = store
            .commit_files([("index.js", "i"), ("lib/util.js", "u"), ("lib/deep/x.js", "x")], "init", vec![])
            .unwrap();
        store.set_ref("refs/heads/master", &commit);
        store.set_symbolic_ref("HEAD", "refs/heads/master");
        (store, commit)
    }

    #[test]
    fn test_content_addressing() {
        let store = ObjectStore::new();
        let a = store.put(Object::Blob(b"same".to_vec())).unwrap();
        let b = store.put(Object::Blob(b"same".to_vec())).unwrap();
        let c = store.put(Object::Blob(b"other".to_vec())).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_deref_prefixes_and_symbolic() {
        let (store, commit) = repo();
        assert_eq!(store.deref("master").unwrap(), commit);
        assert_eq!(store.deref("heads/master").unwrap(), commit);
        assert_eq!(store.deref("HEAD").unwrap(), commit);
        assert!(matches!(store.deref("nope"), Err(RuntimeError::Value(_))));
    }

    #[test]
    fn test_tree_storage() {
        let (store, commit) = repo();
        let storage = TreeStorage::new(Arc::clone(&store), "master").unwrap();

        assert_eq!(storage.commit(), &commit);
        assert_eq!(storage.read("lib/util.js").unwrap(), b"u");
        assert_eq!(storage.read("lib/deep/../util.js").unwrap(), b"u");
        assert_eq!(storage.list("").unwrap(), vec!["index.js".to_string(), "lib".to_string()]);
        assert_eq!(storage.list("lib").unwrap(), vec!["deep".to_string(), "util.js".to_string()]);
        assert!(storage.is_folder("lib/deep").unwrap());
        assert!(storage.is_file("index.js").unwrap());
        assert!(!storage.exists("index.js/x").unwrap());
        assert!(matches!(storage.read("lib"), Err(RuntimeError::EntryIsFolder(_))));
        assert!(matches!(storage.list("index.js"), Err(RuntimeError::EntryIsFile(_))));
        assert!(matches!(storage.read("missing.js"), Err(RuntimeError::NoSuchEntry(_))));
        assert!(matches!(storage.read("../x"), Err(RuntimeError::Path(_))));
    }

    #[test]
    fn test_tags_and_versions() {
        let (store, v1) = repo();
        store.tag("0.1", &v1).unwrap();
        let v2 = store.commit_files([("index.js", "i2")], "second", vec![v1.clone()]).unwrap();
        store.set_ref("refs/heads/master", &v2);

        let old = TreeStorage::new(Arc::clone(&store), "0.1").unwrap();
        let new = TreeStorage::new(Arc::clone(&store), "HEAD").unwrap();
        assert_eq!(old.read("index.js").unwrap(), b"i");
        assert_eq!(new.read("index.js").unwrap(), b"i2");
        // Direct commit ids work too
        assert_eq!(TreeStorage::new(store, v1.as_str()).unwrap().commit(), &v1);
    }

    #[test]
    fn test_non_commit_rejected() {
        let store = Arc::new(ObjectStore::new());
        let blob = store.put(Object::Blob(b"x".to_vec())).unwrap();
        store.set_ref("refs/heads/bad", &blob);
        assert!(matches!(TreeStorage::new(store, "bad"), Err(RuntimeError::Value(_))));
    }
}
