//! External library repositories

use super::root::LibraryDescriptor;
use crate::error::{Result, RuntimeError};
use crate::storage::{ObjectStore, Storage, TreeStorage};
use dashmap::DashMap;
use std::sync::Arc;

/// Opens the storage of a library version
pub trait LibraryProvider: Send + Sync {
    fn open(&self, lib: &LibraryDescriptor) -> Result<Arc<dyn Storage>>;
}

/// Repositories by case-folded `owner/name`; versions are refs
#[derive(Default)]
pub struct LibraryRegistry {
    repos: DashMap<String, Arc<ObjectStore>>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(owner: &str, name: &str) -> String {
        format!("{}/{}", owner, name).to_lowercase()
    }

    pub fn register(&self, owner: &str, name: &str, repo: Arc<ObjectStore>) {
        self.repos.insert(Self::key(owner, name), repo);
    }

    pub fn repository(&self, owner: &str, name: &str) -> Option<Arc<ObjectStore>> {
        self.repos.get(&Self::key(owner, name)).map(|repo| repo.value().clone())
    }
}

impl LibraryProvider for LibraryRegistry {
    fn open(&self, lib: &LibraryDescriptor) -> Result<Arc<dyn Storage>> {
        let repo = self
            .repository(&lib.owner, &lib.name)
            .ok_or_else(|| RuntimeError::Require(format!("No such library {}/{}", lib.owner, lib.name)))?;
        let tree = TreeStorage::new(repo, &lib.version)
            .map_err(|e| RuntimeError::Require(format!("Cannot open library {}: {}", lib, e)))?;
        Ok(Arc::new(tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_by_version() {
        let repo = Arc::new(ObjectStore::new());
        let commit = repo.commit_files([("index.js", "{}")], "init", Vec::new()).unwrap();
        repo.tag("1.0", &commit).unwrap();

        let registry = LibraryRegistry::new();
        registry.register("Bob", "Utils", repo);

        let storage = registry.open(&LibraryDescriptor::parse("bob/utils:1.0").unwrap()).unwrap();
        assert!(storage.is_file("index.js").unwrap());

        let missing_version = LibraryDescriptor::parse("bob/utils:2.0").unwrap();
        assert!(matches!(registry.open(&missing_version), Err(RuntimeError::Require(_))));
        let missing_repo = LibraryDescriptor::parse("bob/other:1.0").unwrap();
        assert!(matches!(registry.open(&missing_repo), Err(RuntimeError::Require(_))));
    }
}
