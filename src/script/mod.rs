//! Script engine seam
//!
//! The runtime never interprets application code itself. Loaders hand a
//! [`SourceUnit`] plus the bindings for it to a [`ScriptEngine`]; whatever
//! the engine returns or fails with is propagated unchanged.

pub mod scripted;

pub use scripted::ScriptedEngine;

use crate::error::Result;
use crate::loader::{IncludeScope, ModuleScope};

/// Source text labelled for stack traces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// `app:path` for other apps' code, `path` otherwise
    pub label: String,
    pub text: String,
}

impl SourceUnit {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

pub trait ScriptEngine: Send + Sync {
    /// Run a module body with `require`, `exports` and `module` bound
    fn run_module(&self, unit: &SourceUnit, scope: &mut ModuleScope<'_>) -> Result<()>;

    /// Run a legacy script; returns the value of its last expression
    fn run_script(&self, unit: &SourceUnit, scope: &mut IncludeScope<'_>) -> Result<serde_json::Value>;
}
