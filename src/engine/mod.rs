//! Relational engine interface
//!
//! The facade and the schema layer reach the engine only through
//! [`QueryEngine`]. Every method is one atomic statement: it either applies
//! completely or leaves the database untouched.

pub mod lang;
pub mod memory;

pub use memory::MemoryEngine;

use crate::error::Result;
use crate::types::{AttrSpec, Constraints, RelVarSchema, Tuple, Value};
use std::collections::BTreeMap;

/// Canonical form of a query invocation
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub params: Vec<Value>,
    /// Ordering expressions, applied left to right
    pub by: Vec<String>,
    pub by_params: Vec<Value>,
    pub start: usize,
    /// `None` means unbounded
    pub length: Option<usize>,
    /// Project onto these attributes (set semantics)
    pub only: Option<Vec<String>>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
            by: Vec::new(),
            by_params: Vec::new(),
            start: 0,
            length: None,
            only: None,
        }
    }
}

/// Attribute added by [`SchemaChange::AddAttrs`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttr {
    pub name: String,
    pub spec: AttrSpec,
    pub default: Option<Value>,
    /// Value for existing rows; falls back to `default`
    pub backfill: Option<Value>,
}

/// Incremental change of one relvar's schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    /// New attributes plus the constraints declared on them
    AddAttrs {
        attrs: Vec<NewAttr>,
        constraints: Constraints,
    },
    DropAttrs(Vec<String>),
    AddDefaults(BTreeMap<String, Value>),
    DropDefaults(Vec<String>),
    AddConstraints(Constraints),
    DropAllConstraints,
}

/// Row-level update: attribute -> expression over the old row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    pub exprs: BTreeMap<String, String>,
    pub params: Vec<Value>,
}

pub trait QueryEngine: Send + Sync {
    fn execute(&self, request: &QueryRequest) -> Result<Vec<Tuple>>;

    /// Sorted names
    fn rel_var_names(&self) -> Result<Vec<String>>;

    fn describe(&self, name: &str) -> Result<RelVarSchema>;

    fn create_rel_var(&self, schema: RelVarSchema, constraints: Constraints) -> Result<()>;

    fn drop_rel_vars(&self, names: &[String]) -> Result<()>;

    fn alter_rel_var(&self, name: &str, change: SchemaChange) -> Result<()>;

    /// Insert one row; returns it with defaults and serials filled in
    fn insert(&self, name: &str, values: BTreeMap<String, Value>) -> Result<Tuple>;

    /// Update the rows `request` selects; returns how many changed
    fn update(&self, request: &QueryRequest, assignments: &Assignments) -> Result<usize>;

    /// Delete the rows `request` selects; returns how many were removed
    fn delete(&self, request: &QueryRequest) -> Result<usize>;
}
