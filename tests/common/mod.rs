#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use tenant_runtime::loader::AppCodeRegistry;
use tenant_runtime::storage::MemoryStorage;
use tenant_runtime::{Runtime, ScriptedEngine, Value};

/// Runtime named `app` over `code`, with `others` registered as apps
pub fn runtime(
    engine: Arc<ScriptedEngine>,
    code: Arc<MemoryStorage>,
    others: Vec<(&str, Arc<MemoryStorage>)>,
) -> Runtime {
    let apps = AppCodeRegistry::new();
    for (name, storage) in others {
        apps.register(name, storage);
    }
    Runtime::builder("app", engine)
        .app_code(code)
        .apps(Arc::new(apps))
        .build()
}

pub fn files(entries: &[(&str, &str)]) -> Arc<MemoryStorage> {
    Arc::new(MemoryStorage::with_files(entries.iter().copied()).unwrap())
}

pub fn row<const N: usize>(values: [(&str, Value); N]) -> BTreeMap<String, Value> {
    values.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
