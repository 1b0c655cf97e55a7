//! Library manifests: `{"libs": {"alias": "owner/library:version"}}`

use super::root::LibraryDescriptor;
use crate::error::{Result, RuntimeError};
use crate::storage::{read_text_safely, Storage};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    libs: BTreeMap<String, LibraryDescriptor>,
}

impl Manifest {
    /// Read `file` from the top of `storage`; a missing file is an empty manifest
    pub fn load(storage: &dyn Storage, file: &str) -> Result<Self> {
        match read_text_safely(storage, file)? {
            Some(text) => Self::parse(&text).map_err(|e| match e {
                RuntimeError::Require(message) => RuntimeError::Require(format!("{}: {}", file, message)),
                other => other,
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text).map_err(|e| RuntimeError::Require(e.to_string()))?;
        let object = json
            .as_object()
            .ok_or_else(|| RuntimeError::Require(format!("Manifest must be an object, got {}", json)))?;

        let mut libs = BTreeMap::new();
        match object.get("libs") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Object(entries)) => {
                for (alias, descriptor) in entries {
                    let descriptor = descriptor.as_str().ok_or_else(|| {
                        RuntimeError::Require(format!("Library \"{}\" must be a descriptor string", alias))
                    })?;
                    libs.insert(alias.clone(), LibraryDescriptor::parse(descriptor)?);
                }
            }
            Some(other) => {
                return Err(RuntimeError::Require(format!("\"libs\" must be an object, got {}", other)));
            }
        }
        Ok(Self { libs })
    }

    pub fn lib(&self, alias: &str) -> Option<&LibraryDescriptor> {
        self.libs.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.libs.keys().map(String::as_str)
    }
}
