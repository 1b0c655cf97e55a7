//! Legacy `include` / `use`
//!
//! Included scripts share one namespace and return the value of their last
//! expression. Each file runs once per context per app; the result is
//! memoized. Navigation state (current app, directories, path) is pushed
//! for the duration of an include and restored on every exit path.

use crate::error::{Result, RuntimeError};
use crate::script::{ScriptEngine, SourceUnit};
use crate::storage::{path, read_text, Storage};
use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Code trees of the applications on the platform
pub trait CodeStore: Send + Sync {
    /// Fails with `NoSuchApp`
    fn app_code(&self, app: &str) -> Result<Arc<dyn Storage>>;
}

/// [`CodeStore`] over registered storages
#[derive(Default)]
pub struct AppCodeRegistry {
    apps: DashMap<String, Arc<dyn Storage>>,
}

impl AppCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, app: impl Into<String>, code: Arc<dyn Storage>) {
        self.apps.insert(app.into(), code);
    }
}

impl CodeStore for AppCodeRegistry {
    fn app_code(&self, app: &str) -> Result<Arc<dyn Storage>> {
        self.apps
            .get(app)
            .map(|code| code.value().clone())
            .ok_or_else(|| RuntimeError::NoSuchApp(app.to_string()))
    }
}

/// Memo key: `None` is the running app
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeKey {
    pub app: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
struct Navigation {
    base_app: Option<String>,
    base_dir: String,
    curr_dir: String,
    path: Option<String>,
}

#[derive(Debug, Default)]
struct IncludeState {
    nav: Navigation,
    stack: Vec<IncludeKey>,
}

/// Restores the includer's navigation when an include ends
struct NavigationGuard<'a> {
    state: &'a Mutex<IncludeState>,
    saved: Navigation,
}

impl Drop for NavigationGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.nav = std::mem::take(&mut self.saved);
        state.stack.pop();
    }
}

pub struct Includer {
    app_name: String,
    local: Arc<dyn Storage>,
    apps: Arc<dyn CodeStore>,
    engine: Arc<dyn ScriptEngine>,
    init_file: String,
    state: Mutex<IncludeState>,
    results: Mutex<AHashMap<IncludeKey, serde_json::Value>>,
}

impl Includer {
    pub fn new(
        app_name: impl Into<String>,
        local: Arc<dyn Storage>,
        apps: Arc<dyn CodeStore>,
        engine: Arc<dyn ScriptEngine>,
        init_file: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            local,
            apps,
            engine,
            init_file: init_file.into(),
            state: Mutex::new(IncludeState::default()),
            results: Mutex::new(AHashMap::new()),
        }
    }

    /// `include(path)`: relative to the current file, or to the base
    /// directory when `path` starts with `/`
    pub fn include(&self, file_path: &str) -> Result<serde_json::Value> {
        let (app, full_path) = {
            let state = self.state.lock();
            let nav = &state.nav;
            let full_path = if file_path.starts_with('/') {
                format!("{}{}", nav.base_dir, file_path)
            } else {
                format!("{}/{}", nav.curr_dir, file_path)
            };
            (nav.base_app.clone(), full_path)
        };
        self.run(app, &full_path, false)
    }

    /// `include(libPath, path)` where `libPath` is `app` or `app/subpath`
    pub fn include_from(&self, lib_path: &str, file_path: &str) -> Result<serde_json::Value> {
        let (app, full_path) = match lib_path.split_once('/') {
            Some((app, subpath)) => (app, format!("{}/{}", subpath, file_path)),
            None => (lib_path, file_path.to_string()),
        };
        let app = if app == self.app_name { None } else { Some(app.to_string()) };
        self.run(app, &full_path, true)
    }

    /// `use(libPath)`
    pub fn use_lib(&self, lib_path: &str) -> Result<serde_json::Value> {
        let init_file = self.init_file.clone();
        self.include_from(lib_path, &init_file)
    }

    /// Positional form used by scripts: `[path]` or `[libPath, path]`
    pub fn include_dynamic(&self, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        fn text(arg: &serde_json::Value) -> String {
            match arg {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }
        match args {
            [] => Err(RuntimeError::Usage("At least one argument required".to_string())),
            [file_path] => self.include(&text(file_path)),
            [lib_path, file_path, ..] => self.include_from(&text(lib_path), &text(file_path)),
        }
    }

    /// Path of the file being included, if any
    pub fn current_path(&self) -> Option<String> {
        self.state.lock().nav.path.clone()
    }

    /// App of the file being included; `None` is the running app
    pub fn current_app(&self) -> Option<String> {
        self.state.lock().nav.base_app.clone()
    }

    fn run(&self, app: Option<String>, file_path: &str, qualified: bool) -> Result<serde_json::Value> {
        let key = IncludeKey {
            app,
            path: path::canonicalize(file_path)?,
        };
        if let Some(result) = self.results.lock().get(&key) {
            debug!(path = %key.path, "include memo hit");
            return Ok(result.clone());
        }

        let guard = self.enter(&key, qualified)?;

        let storage = match &key.app {
            Some(app) => self.apps.app_code(app)?,
            None => self.local.clone(),
        };
        let text = read_text(storage.as_ref(), &key.path)?;
        let label = match &key.app {
            Some(app) => format!("{}:{}", app, key.path),
            None => key.path.clone(),
        };

        let result = self
            .engine
            .run_script(&SourceUnit::new(label, text), &mut IncludeScope { includer: self })?;
        self.results.lock().insert(key, result.clone());
        drop(guard);
        Ok(result)
    }

    fn enter(&self, key: &IncludeKey, qualified: bool) -> Result<NavigationGuard<'_>> {
        let mut state = self.state.lock();
        if state.stack.contains(key) {
            let app = key
                .app
                .as_ref()
                .map(|app| format!(" of {} app", app))
                .unwrap_or_default();
            return Err(RuntimeError::CyclicInclude(format!(
                "Recursive include of file \"{}\"{}",
                key.path, app
            )));
        }

        let curr_dir = path::dirname(&key.path).to_string();
        let saved = state.nav.clone();
        state.nav = Navigation {
            base_app: key.app.clone(),
            base_dir: if qualified { curr_dir.clone() } else { saved.base_dir.clone() },
            curr_dir,
            path: Some(key.path.clone()),
        };
        state.stack.push(key.clone());

        Ok(NavigationGuard {
            state: &self.state,
            saved,
        })
    }
}

/// Bindings injected into a legacy script
pub struct IncludeScope<'a> {
    pub includer: &'a Includer,
}

impl IncludeScope<'_> {
    pub fn include(&self, file_path: &str) -> Result<serde_json::Value> {
        self.includer.include(file_path)
    }

    pub fn include_from(&self, lib_path: &str, file_path: &str) -> Result<serde_json::Value> {
        self.includer.include_from(lib_path, file_path)
    }

    pub fn use_lib(&self, lib_path: &str) -> Result<serde_json::Value> {
        self.includer.use_lib(lib_path)
    }

    /// `ak.path`
    pub fn path(&self) -> Option<String> {
        self.includer.current_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptedEngine;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn includer(engine: Arc<ScriptedEngine>, local: MemoryStorage, lib: MemoryStorage) -> Includer {
        let apps = AppCodeRegistry::new();
        apps.register("lib", Arc::new(lib));
        Includer::new("me", Arc::new(local), Arc::new(apps), engine, "__init__.js")
    }

    #[test]
    fn test_relative_and_base_dir() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.on_script("// outer", |scope| {
            assert_eq!(scope.path().as_deref(), Some("pkg/sub/outer.js"));
            let relative = scope.include("inner.js")?;
            let absolute = scope.include("/top.js")?;
            Ok(json!([relative, absolute]))
        });
        let lib = MemoryStorage::with_files([
            ("pkg/sub/outer.js", "// outer"),
            ("pkg/sub/inner.js", "1"),
            ("pkg/sub/top.js", "2"),
        ])
        .unwrap();
        let includer = includer(engine, MemoryStorage::new(), lib);

        // A qualified include resets the base directory to the file's own
        assert_eq!(includer.include_from("lib/pkg", "sub/outer.js").unwrap(), json!([1, 2]));
        assert_eq!(includer.current_path(), None);
        assert_eq!(includer.current_app(), None);
    }

    #[test]
    fn test_own_app_is_local() {
        let local = MemoryStorage::with_files([("a.js", "\"local\"")]).unwrap();
        let includer = includer(Arc::new(ScriptedEngine::new()), local, MemoryStorage::new());
        assert_eq!(includer.include_from("me", "a.js").unwrap(), json!("local"));
        assert_eq!(includer.include("a.js").unwrap(), json!("local"));
        assert!(matches!(includer.include_from("ghost", "a.js"), Err(RuntimeError::NoSuchApp(_))));
        assert!(matches!(includer.include("b.js"), Err(RuntimeError::NoSuchEntry(_))));
        assert!(matches!(includer.include("../a.js"), Err(RuntimeError::Path(_))));
    }

    #[test]
    fn test_cycle_restores_state() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.on_script("// a", |scope| scope.include("b.js"));
        engine.on_script("// b", |scope| scope.include("a.js"));
        let lib = MemoryStorage::with_files([("a.js", "// a"), ("b.js", "// b")]).unwrap();
        let includer = includer(engine, MemoryStorage::new(), lib);

        let err = includer.include_from("lib", "a.js").unwrap_err();
        assert_eq!(err.to_string(), "Cyclic include: Recursive include of file \"a.js\" of lib app");
        assert_eq!(includer.current_path(), None);
        assert!(includer.state.lock().stack.is_empty());
    }

    #[test]
    fn test_dynamic_args() {
        let local = MemoryStorage::with_files([("x.js", "3"), ("__init__.js", "4")]).unwrap();
        let includer = includer(Arc::new(ScriptedEngine::new()), local, MemoryStorage::new());
        assert!(matches!(includer.include_dynamic(&[]), Err(RuntimeError::Usage(_))));
        assert_eq!(includer.include_dynamic(&[json!("x.js")]).unwrap(), json!(3));
        assert_eq!(includer.use_lib("me").unwrap(), json!(4));
    }
}
