//! Storage roots code is loaded from

use super::manifest::Manifest;
use crate::config::LoaderConfig;
use crate::error::{Result, RuntimeError};
use crate::storage::Storage;
use std::fmt;
use std::sync::Arc;

/// `owner/library:version`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryDescriptor {
    pub owner: String,
    pub name: String,
    pub version: String,
}

impl LibraryDescriptor {
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || {
            RuntimeError::Require(format!(
                "Malformed library descriptor \"{}\", expected owner/library:version",
                text
            ))
        };
        let (path, version) = text.split_once(':').ok_or_else(malformed)?;
        let (owner, name) = path.split_once('/').ok_or_else(malformed)?;
        if [owner, name, version].iter().any(|part| part.is_empty()) || name.contains('/') {
            return Err(malformed());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Roots are memoized per context under this key
    pub fn cache_key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for LibraryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootId {
    /// Built-in modules
    Default,
    /// Code of the running application
    App,
    Library(LibraryDescriptor),
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootId::Default => f.write_str("default"),
            RootId::App => f.write_str("app"),
            RootId::Library(lib) => write!(f, "{}", lib),
        }
    }
}

/// A storage plus the manifest read from its top when the root was opened
pub struct Root {
    id: RootId,
    storage: Arc<dyn Storage>,
    manifest: Manifest,
}

impl Root {
    pub fn open(id: RootId, storage: Arc<dyn Storage>, config: &LoaderConfig) -> Result<Self> {
        let manifest = Manifest::load(storage.as_ref(), &config.manifest_file)?;
        Ok(Self { id, storage, manifest })
    }

    pub fn id(&self) -> &RootId {
        &self.id
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let lib = LibraryDescriptor::parse("Bob/Utils:1.0").unwrap();
        assert_eq!(lib.owner, "Bob");
        assert_eq!(lib.name, "Utils");
        assert_eq!(lib.version, "1.0");
        assert_eq!(lib.cache_key(), "bob/utils:1.0");

        for text in ["bob/utils", "utils:1.0", "bob/:1", "/utils:1", "bob/utils:", "a/b/c:1"] {
            assert!(matches!(LibraryDescriptor::parse(text), Err(RuntimeError::Require(_))), "{}", text);
        }
    }
}
