//! CommonJS-style module loader
//!
//! One [`Loader`] lives in each execution context. It owns the roots opened
//! in that context and a cache of executed modules keyed by root and
//! canonical id. A module runs at most once per context; a module whose body
//! fails is evicted and its exports cleared before the error propagates.

use super::library::LibraryProvider;
use super::module::{Exports, Module};
use super::root::{LibraryDescriptor, Root, RootId};
use crate::config::LoaderConfig;
use crate::error::{Result, RuntimeError};
use crate::script::{ScriptEngine, SourceUnit};
use crate::storage::{read_text_safely, Storage};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache key of an executed module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    pub root: RootId,
    pub id: String,
}

/// Canonical form of a requested id
struct ResolvedId {
    id: String,
    relative: bool,
    single_segment: bool,
}

pub struct Loader {
    config: LoaderConfig,
    engine: Arc<dyn ScriptEngine>,
    libraries: Arc<dyn LibraryProvider>,
    app_root: Arc<Root>,
    default_root: Arc<Root>,
    /// Library roots by case-folded descriptor
    named_roots: Mutex<AHashMap<String, Arc<Root>>>,
    modules: Mutex<AHashMap<ModuleKey, Arc<Module>>>,
    main_key: Mutex<Option<ModuleKey>>,
    main: Mutex<Option<Arc<Module>>>,
}

impl Loader {
    /// Open the app and default roots, reading their manifests
    pub fn new(
        config: LoaderConfig,
        engine: Arc<dyn ScriptEngine>,
        libraries: Arc<dyn LibraryProvider>,
        app_code: Arc<dyn Storage>,
        default_code: Arc<dyn Storage>,
    ) -> Result<Self> {
        let app_root = Arc::new(Root::open(RootId::App, app_code, &config)?);
        let default_root = Arc::new(Root::open(RootId::Default, default_code, &config)?);
        Ok(Self {
            config,
            engine,
            libraries,
            app_root,
            default_root,
            named_roots: Mutex::new(AHashMap::new()),
            modules: Mutex::new(AHashMap::new()),
            main_key: Mutex::new(None),
            main: Mutex::new(None),
        })
    }

    /// `require(id)` from the top of the app root
    pub fn require(&self, id: &str) -> Result<Exports> {
        self.top_level().require(id)
    }

    /// `require(alias, id)` from the top of the app root
    pub fn require_from(&self, alias: &str, id: &str) -> Result<Exports> {
        self.top_level().require_from(alias, id)
    }

    /// Run the entry module; it becomes `require.main`
    pub fn run_main(&self, id: &str) -> Result<Exports> {
        let resolved = self.resolve_id(&[], id)?;
        *self.main_key.lock() = Some(ModuleKey {
            root: RootId::App,
            id: resolved.id,
        });
        self.require(id)
    }

    pub fn main(&self) -> Option<Arc<Module>> {
        self.main.lock().clone()
    }

    /// Cached module, if it has run in this context
    pub fn module(&self, root: &RootId, id: &str) -> Option<Arc<Module>> {
        let key = ModuleKey {
            root: root.clone(),
            id: id.to_string(),
        };
        self.modules.lock().get(&key).cloned()
    }

    pub fn cached_modules(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn app_root(&self) -> &Arc<Root> {
        &self.app_root
    }

    pub fn default_root(&self) -> &Arc<Root> {
        &self.default_root
    }

    fn top_level(&self) -> ModuleRequire<'_> {
        ModuleRequire {
            loader: self,
            root: self.app_root.clone(),
            dir: Vec::new(),
        }
    }

    fn resolve_id(&self, dir: &[String], id: &str) -> Result<ResolvedId> {
        if id.is_empty() {
            return Err(RuntimeError::Require("Module id must be a non-empty string".to_string()));
        }
        let relative = id.starts_with('.');
        let parts: Vec<&str> = id.split('/').collect();
        let mut location: Vec<String> = if relative { dir.to_vec() } else { Vec::new() };

        for (idx, part) in parts.iter().enumerate() {
            match *part {
                "" | "." => {}
                ".." => {
                    if location.pop().is_none() {
                        return Err(RuntimeError::Require(format!(
                            "Module id \"{}\" climbs above its root",
                            id
                        )));
                    }
                }
                name if idx + 1 == parts.len() => location.push(self.config.strip_extension(name).to_string()),
                name => location.push(name.to_string()),
            }
        }
        if location.is_empty() {
            return Err(not_found(id));
        }

        Ok(ResolvedId {
            id: location.join("/"),
            relative,
            single_segment: parts.len() == 1,
        })
    }

    fn named_root(&self, lib: &LibraryDescriptor) -> Result<Arc<Root>> {
        let key = lib.cache_key();
        let mut roots = self.named_roots.lock();
        if let Some(root) = roots.get(&key) {
            return Ok(root.clone());
        }
        debug!(library = %lib, "opening library root");
        let storage = self.libraries.open(lib)?;
        let root = Arc::new(Root::open(RootId::Library(lib.clone()), storage, &self.config)?);
        roots.insert(key, root.clone());
        Ok(root)
    }

    /// Root an alias names from `root`, if any
    fn alias_root(&self, root: &Root, alias: &str) -> Result<Option<Arc<Root>>> {
        if alias == self.config.default_alias {
            return Ok(Some(self.default_root.clone()));
        }
        match root.manifest().lib(alias) {
            Some(lib) => self.named_root(lib).map(Some),
            None => Ok(None),
        }
    }

    fn resolve(&self, root: &Arc<Root>, dir: &[String], alias: Option<&str>, id: &str) -> Result<Arc<Module>> {
        let resolved = self.resolve_id(dir, id)?;

        if let Some(alias) = alias {
            let target = self
                .alias_root(root, alias)?
                .ok_or_else(|| RuntimeError::Require(format!("No such library alias \"{}\"", alias)))?;
            return self
                .load(&target, &resolved.id)?
                .ok_or_else(|| RuntimeError::Require(format!("Cannot find module \"{}\" in \"{}\"", id, alias)));
        }

        if let Some(module) = self.load(root, &resolved.id)? {
            return Ok(module);
        }
        if resolved.single_segment {
            if let Some(target) = self.alias_root(root, &resolved.id)? {
                if let Some(module) = self.load(&target, &self.config.index_module)? {
                    return Ok(module);
                }
            }
        }
        if !resolved.relative && *root.id() != RootId::Default {
            if let Some(module) = self.load(&self.default_root, &resolved.id)? {
                return Ok(module);
            }
        }
        Err(not_found(id))
    }

    /// Fetch from the cache or execute; `None` when the source is absent
    fn load(&self, root: &Arc<Root>, id: &str) -> Result<Option<Arc<Module>>> {
        let key = ModuleKey {
            root: root.id().clone(),
            id: id.to_string(),
        };
        if let Some(module) = self.modules.lock().get(&key) {
            debug!(root = %key.root, id, "module cache hit");
            return Ok(Some(module.clone()));
        }

        let file = self.config.file_name(id);
        let Some(text) = read_text_safely(root.storage().as_ref(), &file)? else {
            return Ok(None);
        };

        let module = Arc::new(Module::new(id, root.id().clone(), Exports::new()));
        self.modules.lock().insert(key.clone(), module.clone());
        if self.main_key.lock().as_ref() == Some(&key) {
            *self.main.lock() = Some(module.clone());
        }

        let label = match root.id() {
            RootId::App => file,
            other => format!("{}:{}", other, file),
        };
        debug!(module = %label, "executing module");

        let mut dir: Vec<String> = id.split('/').map(str::to_string).collect();
        dir.pop();
        let mut scope = ModuleScope {
            require: ModuleRequire {
                loader: self,
                root: root.clone(),
                dir,
            },
            exports: module.exports().unwrap_or_default(),
            module: module.clone(),
        };

        if let Err(e) = self.engine.run_module(&SourceUnit::new(label.as_str(), text), &mut scope) {
            self.modules.lock().remove(&key);
            module.clear_exports();
            let mut main = self.main.lock();
            if main.as_ref().is_some_and(|m| Arc::ptr_eq(m, &module)) {
                *main = None;
            }
            warn!(module = %label, error = %e, "module failed, evicted from cache");
            return Err(e);
        }
        Ok(Some(module))
    }
}

fn not_found(id: &str) -> RuntimeError {
    RuntimeError::Require(format!("Cannot find module \"{}\"", id))
}

fn exports_of(module: &Module) -> Result<Exports> {
    module
        .exports()
        .ok_or_else(|| RuntimeError::Require(format!("Module \"{}\" has no exports", module.id())))
}

/// The `require` binding of one module: closed over its root and directory
pub struct ModuleRequire<'a> {
    loader: &'a Loader,
    root: Arc<Root>,
    dir: Vec<String>,
}

impl ModuleRequire<'_> {
    pub fn require(&self, id: &str) -> Result<Exports> {
        let module = self.loader.resolve(&self.root, &self.dir, None, id)?;
        exports_of(&module)
    }

    pub fn require_from(&self, alias: &str, id: &str) -> Result<Exports> {
        let module = self.loader.resolve(&self.root, &self.dir, Some(alias), id)?;
        exports_of(&module)
    }

    /// `require.main`
    pub fn main(&self) -> Option<Arc<Module>> {
        self.loader.main()
    }

    pub fn root(&self) -> &RootId {
        self.root.id()
    }

    /// Directory of the module, slash-joined
    pub fn dir(&self) -> String {
        self.dir.join("/")
    }
}

/// Bindings injected into a module body
pub struct ModuleScope<'a> {
    pub require: ModuleRequire<'a>,
    pub exports: Exports,
    pub module: Arc<Module>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LibraryRegistry;
    use crate::script::ScriptedEngine;
    use crate::storage::{MemoryStorage, ObjectStore};
    use serde_json::json;

    fn loader(engine: Arc<ScriptedEngine>, app: MemoryStorage, default: MemoryStorage) -> Loader {
        let registry = LibraryRegistry::new();
        let repo = Arc::new(ObjectStore::new());
        let commit = repo
            .commit_files([("index.js", r#"{"lib": "utils"}"#), ("text.js", r#"{"lib": "text"}"#)], "v1", Vec::new())
            .unwrap();
        repo.tag("1.0", &commit).unwrap();
        registry.register("bob", "utils", repo);

        Loader::new(
            LoaderConfig::default(),
            engine,
            Arc::new(registry),
            Arc::new(app),
            Arc::new(default),
        )
        .unwrap()
    }

    fn files(list: &[(&str, &str)]) -> MemoryStorage {
        MemoryStorage::with_files(list.iter().copied()).unwrap()
    }

    #[test]
    fn test_relative_and_extension() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.on_module("// a/b", |scope| {
            let sibling = scope.require.require("./c.js")?;
            scope.exports.set("c", sibling.get("name").unwrap_or_default());
            assert_eq!(scope.require.dir(), "a");
            Ok(())
        });
        let loader = loader(
            engine,
            files(&[("a/b.js", "// a/b"), ("a/c.js", r#"{"name": "c"}"#)]),
            MemoryStorage::new(),
        );

        let exports = loader.require("a/b").unwrap();
        assert_eq!(exports.get("c"), Some(json!("c")));
        assert!(loader.require("a/c.js").unwrap().ptr_eq(&loader.require("./a/c").unwrap()));
    }

    #[test]
    fn test_malformed_ids() {
        let loader = loader(Arc::new(ScriptedEngine::new()), MemoryStorage::new(), MemoryStorage::new());
        for id in ["", "..", "./..", "a/../..", "nope"] {
            assert!(matches!(loader.require(id), Err(RuntimeError::Require(_))), "{:?}", id);
        }
    }

    #[test]
    fn test_default_fallback_and_alias() {
        let loader = loader(
            Arc::new(ScriptedEngine::new()),
            files(&[("manifest.json", r#"{"libs": {"utils": "Bob/Utils:1.0"}}"#), ("local.js", r#"{"x": 1}"#)]),
            files(&[("core.js", r#"{"core": true}"#), ("local.js", r#"{"x": 2}"#)]),
        );

        // Same root wins over the default root
        assert_eq!(loader.require("local").unwrap().get("x"), Some(json!(1)));
        assert_eq!(loader.require("core").unwrap().get("core"), Some(json!(true)));
        assert!(loader.require("./core").is_err());
        assert_eq!(loader.require_from("default", "local").unwrap().get("x"), Some(json!(2)));

        // Single segment retried as alias/index
        assert_eq!(loader.require("utils").unwrap().get("lib"), Some(json!("utils")));
        assert_eq!(loader.require_from("utils", "text").unwrap().get("lib"), Some(json!("text")));
        assert!(matches!(loader.require_from("utils", "missing"), Err(RuntimeError::Require(_))));
        assert!(matches!(loader.require_from("nope", "text"), Err(RuntimeError::Require(_))));

        // Keyed by the descriptor as the manifest spells it
        let lib = LibraryDescriptor::parse("Bob/Utils:1.0").unwrap();
        assert!(loader.module(&RootId::Library(lib), "index").is_some());
    }

    #[test]
    fn test_bad_manifest_fails_fast() {
        let result = Loader::new(
            LoaderConfig::default(),
            Arc::new(ScriptedEngine::new()),
            Arc::new(LibraryRegistry::new()),
            Arc::new(files(&[("manifest.json", "{oops")])),
            Arc::new(MemoryStorage::new()),
        );
        assert!(matches!(result, Err(RuntimeError::Require(_))));
    }

    #[test]
    fn test_main_and_rollback() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.on_module("// main", |scope| {
            let main = scope.require.main().expect("main is set while it runs");
            assert!(Arc::ptr_eq(&main, &scope.module));
            scope.exports.set("ok", json!(true));
            Ok(())
        });
        engine.on_module("// broken", |scope| {
            scope.exports.set("partial", json!(1));
            Err(crate::error::ScriptError::thrown(scope.module.id(), "boom").into())
        });
        let loader = loader(
            engine.clone(),
            files(&[("main.js", "// main"), ("broken.js", "// broken")]),
            MemoryStorage::new(),
        );

        loader.run_main("main").unwrap();
        assert_eq!(loader.main().unwrap().id(), "main");

        let err = loader.require("broken").unwrap_err();
        assert!(matches!(err, RuntimeError::Script(_)));
        assert!(loader.module(&RootId::App, "broken").is_none());
        let before = engine.run_count();
        assert!(loader.require("broken").is_err());
        assert_eq!(engine.run_count(), before + 1);
    }
}
