//! Runtime configuration and quotas
//!
//! Every limit the runtime enforces lives here so a deployment can tune them
//! from one JSON file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-tenant database quotas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Maximum length of relvar and attribute names
    pub max_name_len: usize,

    /// Maximum number of attributes in one relvar
    pub max_attrs: usize,

    /// Maximum number of relvars in one tenant database
    pub max_rel_vars: usize,

    /// Maximum serialized size of one row (bytes)
    pub max_row_size: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_name_len: 60,
            max_attrs: 500,
            max_rel_vars: 500,
            max_row_size: 1024 * 1024, // 1MB
        }
    }
}

impl QuotaConfig {
    /// Tight limits for tests and sandboxes
    pub fn small() -> Self {
        Self {
            max_name_len: 16,
            max_attrs: 8,
            max_rel_vars: 8,
            max_row_size: 4 * 1024,
        }
    }
}

/// Module loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Manifest file read from the top of every storage root
    pub manifest_file: String,

    /// Extension appended to module ids
    pub extension: String,

    /// Submodule used when an id is retried as a library alias
    pub index_module: String,

    /// Entry file executed by `use`
    pub init_file: String,

    /// Alias that always names the default root
    pub default_alias: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            manifest_file: "manifest.json".to_string(),
            extension: "js".to_string(),
            index_module: "index".to_string(),
            init_file: "__init__.js".to_string(),
            default_alias: "default".to_string(),
        }
    }
}

impl LoaderConfig {
    /// File name of a module id (`a/b` -> `a/b.js`)
    pub fn file_name(&self, id: &str) -> String {
        format!("{}.{}", id, self.extension)
    }

    /// Strips the module extension from the last id segment, if present
    pub fn strip_extension<'a>(&self, segment: &'a str) -> &'a str {
        segment
            .strip_suffix(&self.extension)
            .and_then(|s| s.strip_suffix('.'))
            .filter(|s| !s.is_empty())
            .unwrap_or(segment)
    }
}

/// Inter-application request configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Time a caller waits for the callee's response (milliseconds)
    pub timeout_ms: u64,
    /// Handler threads one app may have running, timed out ones included
    pub max_in_flight: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_in_flight: 64,
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub quotas: QuotaConfig,
    pub loader: LoaderConfig,
    pub rpc: RpcConfig,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_quotas(mut self, quotas: QuotaConfig) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.quotas.max_name_len, 60);
        assert_eq!(config.quotas.max_rel_vars, 500);
        assert_eq!(config.loader.manifest_file, "manifest.json");
        assert_eq!(config.rpc.timeout(), Duration::from_secs(30));
        assert_eq!(config.rpc.max_in_flight, 64);
    }

    #[test]
    fn test_partial_json() {
        let config = RuntimeConfig::from_json_str(r#"{"quotas": {"max_rel_vars": 3}}"#).unwrap();
        assert_eq!(config.quotas.max_rel_vars, 3);
        assert_eq!(config.quotas.max_attrs, 500);
        assert_eq!(config.loader, LoaderConfig::default());
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, r#"{"rpc": {"timeout_ms": 250}}"#).unwrap();
        let config = RuntimeConfig::from_json_file(&path).unwrap();
        assert_eq!(config.rpc.timeout(), Duration::from_millis(250));
        assert_eq!(config.rpc.max_in_flight, RpcConfig::default().max_in_flight);
    }

    #[test]
    fn test_strip_extension() {
        let loader = LoaderConfig::default();
        assert_eq!(loader.strip_extension("42.js"), "42");
        assert_eq!(loader.strip_extension("core"), "core");
        assert_eq!(loader.strip_extension(".js"), ".js");
        assert_eq!(loader.file_name("a/b"), "a/b.js");
    }
}
