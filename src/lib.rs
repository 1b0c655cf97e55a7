//! Tenant Runtime
//!
//! Application runtime core of a multi-tenant platform-as-a-service.
//!
//! ## Components
//! - Storage: canonical paths over filesystem, in-memory and content-addressed trees
//! - Loaders: CommonJS-style `require` across app, default and library roots;
//!   legacy `include` / `use` with memoization and cycle detection
//! - Relational layer: relvar schemas, constraints, evolution and quotas
//!   (`Db`), a query facade and an in-memory reference engine
//! - Inter-application requests with timeouts
//!
//! Script execution is delegated to a [`ScriptEngine`]; the crate ships
//! [`ScriptedEngine`], which binds sources to host closures.

pub mod config;
pub mod storage;
pub mod types;
pub mod catalog;
pub mod engine;
pub mod query;
pub mod script;
pub mod loader;
pub mod rpc;
pub mod context;

mod api;
mod error;

pub use config::{LoaderConfig, QuotaConfig, RpcConfig, RuntimeConfig};
pub use error::{Result, RuntimeError, ScriptError, ScriptErrorKind};

// Main API
pub use api::Db;
pub use context::{ExecutionContext, Runtime, RuntimeBuilder};
pub use engine::{MemoryEngine, QueryEngine};
pub use loader::{Exports, Includer, Loader};
pub use query::{OrderBy, Query, QueryOptions, Queryable, RelVarHandle};
pub use rpc::{AppClient, AppGateway, AppHandler};
pub use script::{ScriptEngine, ScriptedEngine, SourceUnit};
pub use storage::Storage;
pub use types::{AttrType, Constraints, Header, Tuple, Value};
