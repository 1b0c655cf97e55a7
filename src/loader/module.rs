//! Loaded modules and their exports

use super::root::RootId;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Shared, mutable exports object of a module
#[derive(Debug, Clone, Default)]
pub struct Exports(Arc<RwLock<serde_json::Map<String, serde_json::Value>>>);

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: serde_json::Value) {
        self.0.write().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        self.0.read().get(name).cloned()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.read().clone())
    }

    /// Identity, not structural equality
    pub fn ptr_eq(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The `module` binding of one executed module
#[derive(Debug)]
pub struct Module {
    id: String,
    root: RootId,
    exports: Mutex<Option<Exports>>,
}

impl Module {
    pub(crate) fn new(id: impl Into<String>, root: RootId, exports: Exports) -> Self {
        Self {
            id: id.into(),
            root,
            exports: Mutex::new(Some(exports)),
        }
    }

    /// Canonical id without extension
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &RootId {
        &self.root
    }

    /// `None` once a failed execution rolled the module back
    pub fn exports(&self) -> Option<Exports> {
        self.exports.lock().clone()
    }

    /// `module.exports = ...`
    pub fn set_exports(&self, exports: Exports) {
        *self.exports.lock() = Some(exports);
    }

    pub(crate) fn clear_exports(&self) {
        *self.exports.lock() = None;
    }
}
