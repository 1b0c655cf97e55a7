//! Code loading
//!
//! Two loaders live side by side in an execution context:
//!
//! - [`Loader`]: CommonJS-style `require`. Modules are singletons per
//!   context, keyed by code root and canonical id. A root is the running
//!   app, the shared default library, or an external library version named
//!   in a manifest.
//! - [`Includer`]: legacy `include` / `use`. Scripts run in a shared
//!   namespace and each file's result is memoized per app.

pub mod include;
pub mod library;
pub mod manifest;
pub mod module;
pub mod require;
pub mod root;

pub use include::{AppCodeRegistry, CodeStore, IncludeKey, IncludeScope, Includer};
pub use library::{LibraryProvider, LibraryRegistry};
pub use manifest::Manifest;
pub use module::{Exports, Module};
pub use require::{Loader, ModuleKey, ModuleRequire, ModuleScope};
pub use root::{LibraryDescriptor, Root, RootId};
