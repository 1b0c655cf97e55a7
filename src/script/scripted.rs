//! Host-side script engine
//!
//! Maps source texts to Rust closures. Embedders use it to provide built-in
//! modules implemented natively; tests use it to stand in for a real
//! interpreter. Sources without a registered body are read as JSON: a module
//! whose text is a JSON object exports its members, a script whose text is
//! JSON evaluates to it. Anything else is a syntax error.

use super::{ScriptEngine, SourceUnit};
use crate::error::{Result, ScriptError, ScriptErrorKind};
use crate::loader::{IncludeScope, ModuleScope};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type ModuleBody = Arc<dyn Fn(&mut ModuleScope<'_>) -> Result<()> + Send + Sync>;
type ScriptBody = Arc<dyn Fn(&mut IncludeScope<'_>) -> Result<serde_json::Value> + Send + Sync>;

/// [`ScriptEngine`] backed by registered closures
#[derive(Default)]
pub struct ScriptedEngine {
    modules: DashMap<String, ModuleBody>,
    scripts: DashMap<String, ScriptBody>,
    runs: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body of every module whose (trimmed) source is `source`
    pub fn on_module<F>(&self, source: &str, body: F)
    where
        F: Fn(&mut ModuleScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.modules.insert(source.trim().to_string(), Arc::new(body));
    }

    /// Body of every legacy script whose (trimmed) source is `source`
    pub fn on_script<F>(&self, source: &str, body: F)
    where
        F: Fn(&mut IncludeScope<'_>) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.scripts.insert(source.trim().to_string(), Arc::new(body));
    }

    /// Units run so far, successful or not
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

fn syntax_error(unit: &SourceUnit, err: serde_json::Error) -> ScriptError {
    ScriptError::new(ScriptErrorKind::Syntax, unit.label.clone(), err.to_string())
}

impl ScriptEngine for ScriptedEngine {
    fn run_module(&self, unit: &SourceUnit, scope: &mut ModuleScope<'_>) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        // Clone out of the map so bodies may require other modules
        let body = self.modules.get(unit.text.trim()).map(|entry| entry.value().clone());
        if let Some(body) = body {
            return body(scope);
        }

        let value: serde_json::Value = serde_json::from_str(&unit.text).map_err(|e| syntax_error(unit, e))?;
        match value {
            serde_json::Value::Object(members) => {
                for (name, value) in members {
                    scope.exports.set(name, value);
                }
                Ok(())
            }
            other => Err(ScriptError::new(
                ScriptErrorKind::Syntax,
                unit.label.clone(),
                format!("Module source must be an object, got {}", other),
            )
            .into()),
        }
    }

    fn run_script(&self, unit: &SourceUnit, scope: &mut IncludeScope<'_>) -> Result<serde_json::Value> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let body = self.scripts.get(unit.text.trim()).map(|entry| entry.value().clone());
        if let Some(body) = body {
            return body(scope);
        }
        Ok(serde_json::from_str(&unit.text).map_err(|e| syntax_error(unit, e))?)
    }
}
