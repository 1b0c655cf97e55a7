//! Error types for the tenant runtime
//!
//! Every kind surfaced to application code is a distinct variant so callers
//! can discriminate with `matches!` the way scripts discriminate with
//! `instanceof`.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    // Paths and storage
    #[error("Path error: {0}")]
    Path(String),

    #[error("No such entry: {0}")]
    NoSuchEntry(String),

    #[error("Entry is folder: {0}")]
    EntryIsFolder(String),

    #[error("Entry is file: {0}")]
    EntryIsFile(String),

    // Code loading
    #[error("Require error: {0}")]
    Require(String),

    #[error("Cyclic include: {0}")]
    CyclicInclude(String),

    #[error("No such app: {0}")]
    NoSuchApp(String),

    // Relational layer
    #[error("Relation variable already exists: {0}")]
    RelVarExists(String),

    #[error("No such relation variable: {0}")]
    NoSuchRelVar(String),

    #[error("No such attribute: {0}")]
    NoSuchAttr(String),

    #[error("Attribute already exists: {0}")]
    AttrExists(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    // Argument validation
    #[error("Value error: {0}")]
    Value(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    // Inter-application requests
    #[error("Request to app '{0}' timed out")]
    TimedOut(String),

    #[error("App '{app}' failed to process the request: {message}")]
    ProcessingFailed { app: String, message: String },

    #[error("App '{0}' cannot request itself")]
    SelfRequest(String),

    // Script engine pass-through
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RuntimeError {
    /// Kinds raised by the relational layer.
    pub fn is_db_error(&self) -> bool {
        matches!(
            self,
            RuntimeError::RelVarExists(_)
                | RuntimeError::NoSuchRelVar(_)
                | RuntimeError::NoSuchAttr(_)
                | RuntimeError::AttrExists(_)
                | RuntimeError::Dependency(_)
                | RuntimeError::Constraint(_)
                | RuntimeError::Query(_)
                | RuntimeError::Quota(_)
        )
    }

    /// Kinds raised by paths, storage adapters and the legacy includer.
    pub fn is_fs_error(&self) -> bool {
        matches!(
            self,
            RuntimeError::Path(_)
                | RuntimeError::NoSuchEntry(_)
                | RuntimeError::EntryIsFolder(_)
                | RuntimeError::EntryIsFile(_)
                | RuntimeError::CyclicInclude(_)
        )
    }

    /// Not-found conditions that `read_safely` turns into an absent value.
    pub(crate) fn is_absent_entry(&self) -> bool {
        matches!(self, RuntimeError::NoSuchEntry(_) | RuntimeError::EntryIsFolder(_))
    }
}

impl From<bincode::Error> for RuntimeError {
    fn from(err: bincode::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}

/// Category of an error raised by the script engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// Source failed to compile
    Syntax,
    /// Unresolved name during execution
    Reference,
    /// Operation applied to a value of the wrong type
    Type,
    /// Deliberate application-level throw
    Thrown,
}

impl fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptErrorKind::Syntax => "SyntaxError",
            ScriptErrorKind::Reference => "ReferenceError",
            ScriptErrorKind::Type => "TypeError",
            ScriptErrorKind::Thrown => "Error",
        };
        f.write_str(name)
    }
}

/// Error raised while compiling or running a source unit.
///
/// The loaders never wrap these; a script error reaches the entry point with
/// its kind and label intact.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} in {label}: {message}")]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    /// Label the unit was compiled under (`app:path` or `path`)
    pub label: String,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            label: label.into(),
        }
    }

    pub fn thrown(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Thrown, label, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_groups() {
        assert!(RuntimeError::Quota("x".into()).is_db_error());
        assert!(!RuntimeError::Quota("x".into()).is_fs_error());
        assert!(RuntimeError::CyclicInclude("a.js".into()).is_fs_error());
        assert!(RuntimeError::NoSuchEntry("a".into()).is_absent_entry());
        assert!(!RuntimeError::Path("..".into()).is_absent_entry());
    }

    #[test]
    fn test_script_error_display() {
        let err = RuntimeError::from(ScriptError::new(ScriptErrorKind::Syntax, "lib:a.js", "unexpected token"));
        assert_eq!(err.to_string(), "SyntaxError in lib:a.js: unexpected token");
        assert!(matches!(err, RuntimeError::Script(ScriptError { kind: ScriptErrorKind::Syntax, .. })));
    }
}
