//! Runtime and execution contexts
//!
//! A [`Runtime`] holds what one application shares across requests: its code,
//! its database, the library and app registries and the script engine. Each
//! request gets an [`ExecutionContext`] with its own module cache, include
//! memo table and navigation state; dropping the context discards them.

use crate::api::Db;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::loader::{AppCodeRegistry, CodeStore, Exports, Includer, LibraryProvider, LibraryRegistry, Loader};
use crate::rpc::{AppClient, AppGateway};
use crate::script::ScriptEngine;
use crate::storage::{MemoryStorage, Storage};
use std::sync::Arc;
use tracing::debug;

/// Shared state of one application
pub struct Runtime {
    config: RuntimeConfig,
    app_name: String,
    app_code: Arc<dyn Storage>,
    default_code: Arc<dyn Storage>,
    libraries: Arc<dyn LibraryProvider>,
    apps: Arc<dyn CodeStore>,
    engine: Arc<dyn ScriptEngine>,
    db: Db,
    gateway: Arc<AppGateway>,
}

impl Runtime {
    pub fn builder(app_name: impl Into<String>, engine: Arc<dyn ScriptEngine>) -> RuntimeBuilder {
        RuntimeBuilder::new(app_name, engine)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn gateway(&self) -> &Arc<AppGateway> {
        &self.gateway
    }

    /// Start a request: fresh caches, shared database
    pub fn context(&self) -> Result<ExecutionContext> {
        debug!(app = %self.app_name, "new execution context");
        let loader = Loader::new(
            self.config.loader.clone(),
            self.engine.clone(),
            self.libraries.clone(),
            self.app_code.clone(),
            self.default_code.clone(),
        )?;
        let includer = Includer::new(
            self.app_name.clone(),
            self.app_code.clone(),
            self.apps.clone(),
            self.engine.clone(),
            self.config.loader.init_file.clone(),
        );
        Ok(ExecutionContext {
            loader,
            includer,
            db: self.db.clone(),
            apps: AppClient::new(self.gateway.clone(), self.app_name.clone()),
        })
    }
}

pub struct RuntimeBuilder {
    config: RuntimeConfig,
    app_name: String,
    engine: Arc<dyn ScriptEngine>,
    app_code: Option<Arc<dyn Storage>>,
    default_code: Option<Arc<dyn Storage>>,
    libraries: Option<Arc<dyn LibraryProvider>>,
    apps: Option<Arc<dyn CodeStore>>,
    db: Option<Db>,
    gateway: Option<Arc<AppGateway>>,
}

impl RuntimeBuilder {
    pub fn new(app_name: impl Into<String>, engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            config: RuntimeConfig::default(),
            app_name: app_name.into(),
            engine,
            app_code: None,
            default_code: None,
            libraries: None,
            apps: None,
            db: None,
            gateway: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn app_code(mut self, code: Arc<dyn Storage>) -> Self {
        self.app_code = Some(code);
        self
    }

    /// Tree behind the `default` alias
    pub fn default_code(mut self, code: Arc<dyn Storage>) -> Self {
        self.default_code = Some(code);
        self
    }

    pub fn libraries(mut self, libraries: Arc<dyn LibraryProvider>) -> Self {
        self.libraries = Some(libraries);
        self
    }

    /// Code of other apps, for qualified includes
    pub fn apps(mut self, apps: Arc<dyn CodeStore>) -> Self {
        self.apps = Some(apps);
        self
    }

    pub fn db(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }

    pub fn gateway(mut self, gateway: Arc<AppGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Missing parts default to empty trees and registries, an in-memory
    /// database and a private gateway
    pub fn build(self) -> Runtime {
        let config = self.config;
        let db = self.db.unwrap_or_else(|| Db::in_memory(config.quotas.clone()));
        let gateway = self.gateway.unwrap_or_else(|| Arc::new(AppGateway::new(&config.rpc)));
        Runtime {
            app_name: self.app_name,
            app_code: self.app_code.unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            default_code: self.default_code.unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            libraries: self.libraries.unwrap_or_else(|| Arc::new(LibraryRegistry::new())),
            apps: self.apps.unwrap_or_else(|| Arc::new(AppCodeRegistry::new())),
            engine: self.engine,
            db,
            gateway,
            config,
        }
    }
}

/// One request/session
pub struct ExecutionContext {
    pub loader: Loader,
    pub includer: Includer,
    pub db: Db,
    pub apps: AppClient,
}

impl ExecutionContext {
    pub fn require(&self, id: &str) -> Result<Exports> {
        self.loader.require(id)
    }

    pub fn run_main(&self, id: &str) -> Result<Exports> {
        self.loader.run_main(id)
    }

    pub fn include(&self, path: &str) -> Result<serde_json::Value> {
        self.includer.include(path)
    }

    pub fn include_from(&self, lib_path: &str, path: &str) -> Result<serde_json::Value> {
        self.includer.include_from(lib_path, path)
    }

    pub fn request_app(&self, target: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.apps.request(target, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptedEngine;
    use serde_json::json;

    #[test]
    fn test_contexts_are_isolated() {
        let engine = Arc::new(ScriptedEngine::new());
        let code = MemoryStorage::with_files([("m.js", r#"{"v": 1}"#), ("s.js", "5")]).unwrap();
        let runtime = Runtime::builder("app", engine.clone()).app_code(Arc::new(code)).build();

        let first = runtime.context().unwrap();
        let a = first.require("m").unwrap();
        assert!(a.ptr_eq(&first.require("./m").unwrap()));
        assert_eq!(first.include("s.js").unwrap(), json!(5));
        assert_eq!(engine.run_count(), 2);

        let second = runtime.context().unwrap();
        assert!(!a.ptr_eq(&second.require("m").unwrap()));
        assert_eq!(second.include("s.js").unwrap(), json!(5));
        assert_eq!(engine.run_count(), 4);
    }

    #[test]
    fn test_db_is_shared() {
        let runtime = Runtime::builder("app", Arc::new(ScriptedEngine::new())).build();
        let first = runtime.context().unwrap();
        first
            .db
            .create_json("T", &json!({"x": "number"}), &json!(null))
            .unwrap();
        let second = runtime.context().unwrap();
        assert_eq!(second.db.list().unwrap(), vec!["T".to_string()]);
    }
}
