//! Relational data types

mod attr;
mod schema;
mod tuple;
mod value;

pub use attr::{header_from_json, AttrSpec, AttrTrait, AttrType, MAX_SERIAL};
pub use schema::{Constraints, ForeignKey, RelVarSchema};
pub use tuple::Tuple;
pub use value::{BaseType, Value};

use std::collections::BTreeMap;

/// Declared attributes of a relvar, by name
pub type Header = BTreeMap<String, AttrType>;
