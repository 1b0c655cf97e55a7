//! Database capability
//!
//! `Db` is what application code sees as `db`: schema definition and
//! evolution, row operations, queries and introspection for one tenant.
//! Every entry point validates its arguments locally and then issues a
//! single engine statement, so each call is all-or-nothing.

use crate::catalog::{constraints, names};
use crate::config::QuotaConfig;
use crate::engine::{MemoryEngine, NewAttr, QueryEngine, SchemaChange};
use crate::error::{Result, RuntimeError};
use crate::query::{normalize_query_args, Query, QueryOptions, Queryable, RelVarHandle};
use crate::types::{header_from_json, AttrSpec, AttrType, Constraints, ForeignKey, Header, RelVarSchema, Tuple, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Database of one tenant
///
/// # Examples
///
/// ```ignore
/// let db = Db::in_memory(QuotaConfig::default());
///
/// let mut header = Header::new();
/// header.insert("id".into(), AttrType::number().serial()?.unique());
/// header.insert("name".into(), AttrType::string());
/// db.create("User", &header, Constraints::new())?;
///
/// db.insert("User", [("name".to_string(), Value::from("anton"))].into())?;
/// let anton = db.whose("User where name == $", QueryOptions::new().params(["anton"]))?;
/// ```
#[derive(Clone)]
pub struct Db {
    engine: Arc<dyn QueryEngine>,
    quotas: QuotaConfig,
}

impl Db {
    pub fn new(engine: Arc<dyn QueryEngine>, quotas: QuotaConfig) -> Self {
        Self { engine, quotas }
    }

    /// Db over a fresh [`MemoryEngine`]
    pub fn in_memory(quotas: QuotaConfig) -> Self {
        let engine = Arc::new(MemoryEngine::new(quotas.clone()));
        Self::new(engine, quotas)
    }

    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }

    pub fn quotas(&self) -> &QuotaConfig {
        &self.quotas
    }

    // ============================================================================
    // 1. Schema definition
    // ============================================================================

    /// Create a relvar.
    ///
    /// Constraint sugar carried by the header's types is merged into
    /// `constraints`.
    pub fn create(&self, name: &str, header: &Header, constraints: Constraints) -> Result<()> {
        names::check_rel_var_name(name, &self.quotas)?;
        names::check_header(header, &self.quotas)?;
        let constraints = Constraints::from_header(header).merge(constraints);
        constraints::check_shape(&constraints)?;

        debug!(rel_var = name, attrs = header.len(), "creating relation variable");
        self.engine
            .create_rel_var(RelVarSchema::from_header(name, header), constraints)
    }

    /// Drop several relvars at once; they may reference each other
    pub fn drop(&self, names: &[&str]) -> Result<()> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        self.engine.drop_rel_vars(&names)
    }

    pub fn drop_all(&self) -> Result<()> {
        let names = self.engine.rel_var_names()?;
        if names.is_empty() {
            return Ok(());
        }
        self.engine.drop_rel_vars(&names)
    }

    // ============================================================================
    // 2. Schema evolution
    // ============================================================================

    /// Add attributes; each comes with an optional value for existing rows
    pub fn add_attrs(&self, name: &str, attrs: BTreeMap<String, (AttrType, Option<Value>)>) -> Result<()> {
        let header: Header = attrs.iter().map(|(attr, (ty, _))| (attr.clone(), ty.clone())).collect();
        for attr in header.keys() {
            names::check_attr_name(attr, &self.quotas)?;
        }
        let constraints = Constraints::from_header(&header);
        constraints::check_shape(&constraints)?;

        let mut new_attrs = Vec::with_capacity(attrs.len());
        for (attr, (ty, backfill)) in attrs {
            if ty.spec().is_serial() && backfill.is_some() {
                return Err(RuntimeError::NotImplemented(format!(
                    "Backfilling serial attribute {}",
                    attr
                )));
            }
            new_attrs.push(NewAttr {
                name: attr,
                spec: ty.spec(),
                default: ty.default_value().cloned(),
                backfill,
            });
        }
        self.engine.alter_rel_var(
            name,
            SchemaChange::AddAttrs {
                attrs: new_attrs,
                constraints,
            },
        )
    }

    pub fn drop_attrs(&self, name: &str, attrs: &[&str]) -> Result<()> {
        let attrs = distinct_names(attrs)?;
        self.engine.alter_rel_var(name, SchemaChange::DropAttrs(attrs))
    }

    pub fn add_default(&self, name: &str, defaults: BTreeMap<String, Value>) -> Result<()> {
        self.engine.alter_rel_var(name, SchemaChange::AddDefaults(defaults))
    }

    /// Dropping a default that is not set is a no-op
    pub fn drop_default(&self, name: &str, attrs: &[&str]) -> Result<()> {
        let attrs = distinct_names(attrs)?;
        self.engine.alter_rel_var(name, SchemaChange::DropDefaults(attrs))
    }

    pub fn add_constrs(&self, name: &str, constraints: Constraints) -> Result<()> {
        constraints::check_shape(&constraints)?;
        self.engine.alter_rel_var(name, SchemaChange::AddConstraints(constraints))
    }

    /// Drop explicit unique sets, foreign keys and checks; the implicit key stays
    pub fn drop_all_constrs(&self, name: &str) -> Result<()> {
        self.engine.alter_rel_var(name, SchemaChange::DropAllConstraints)
    }

    // ============================================================================
    // 3. Rows
    // ============================================================================

    /// Insert a row; returns it with defaults and serials filled in
    pub fn insert(&self, name: &str, values: BTreeMap<String, Value>) -> Result<Tuple> {
        self.engine.insert(name, values)
    }

    /// Handle to a whole relvar
    pub fn rel(&self, name: &str) -> Result<RelVarHandle> {
        self.engine.describe(name)?;
        Ok(RelVarHandle::new(self.engine.clone(), name))
    }

    pub fn update(
        &self,
        query: &str,
        options: QueryOptions,
        exprs: BTreeMap<String, String>,
        params: Vec<Value>,
    ) -> Result<usize> {
        self.prepare(query, options).update(exprs, params)
    }

    pub fn update_by_values(&self, query: &str, options: QueryOptions, values: BTreeMap<String, Value>) -> Result<usize> {
        self.prepare(query, options).update_by_values(values)
    }

    pub fn delete(&self, query: &str, options: QueryOptions) -> Result<usize> {
        self.prepare(query, options).delete()
    }

    // ============================================================================
    // 4. Queries
    // ============================================================================

    /// Query without executing it
    pub fn prepare(&self, query: &str, options: QueryOptions) -> Query {
        Query::new(self.engine.clone(), options.into_request(query))
    }

    pub fn query(&self, query: &str, options: QueryOptions) -> Result<Vec<Tuple>> {
        self.prepare(query, options).all()
    }

    /// Values of one attribute, without duplicates
    pub fn field(&self, attr: &str, query: &str, options: QueryOptions) -> Result<Vec<Value>> {
        self.prepare(query, options).field(attr)
    }

    /// The only row the query yields
    pub fn whose(&self, query: &str, options: QueryOptions) -> Result<Tuple> {
        let mut rows = self.query(query, options)?;
        if rows.len() != 1 {
            return Err(RuntimeError::Query(format!("whose() query got {} tuples", rows.len())));
        }
        Ok(rows.remove(0))
    }

    pub fn count(&self, query: &str, options: QueryOptions) -> Result<usize> {
        self.prepare(query, options).count()
    }

    // ============================================================================
    // 5. Introspection
    // ============================================================================

    /// Sorted relvar names
    pub fn list(&self) -> Result<Vec<String>> {
        self.engine.rel_var_names()
    }

    pub fn describe(&self, name: &str) -> Result<RelVarSchema> {
        self.engine.describe(name)
    }

    /// Sorted attribute names
    pub fn header(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.describe(name)?.header())
    }

    pub fn attr_types(&self, name: &str) -> Result<BTreeMap<String, AttrSpec>> {
        Ok(self.describe(name)?.attrs)
    }

    pub fn integers(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.describe(name)?.integers())
    }

    pub fn serials(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.describe(name)?.serials())
    }

    pub fn defaults(&self, name: &str) -> Result<BTreeMap<String, Value>> {
        Ok(self.describe(name)?.defaults)
    }

    /// Explicit unique sets plus the implicit key
    pub fn unique_keys(&self, name: &str) -> Result<Vec<BTreeSet<String>>> {
        Ok(self.describe(name)?.keys())
    }

    pub fn foreign_keys(&self, name: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.describe(name)?.foreign)
    }

    // ============================================================================
    // 6. Dynamic (JSON) forms
    // ============================================================================

    /// `create(name, {"attr": type, ...}, {unique, foreign, check})`
    pub fn create_json(&self, name: &str, header: &serde_json::Value, constraints: &serde_json::Value) -> Result<()> {
        let header = header_from_json(header)?;
        self.create(name, &header, Constraints::from_json(constraints)?)
    }

    /// `add_attrs(name, {"attr": [type, backfill], ...})`
    pub fn add_attrs_json(&self, name: &str, attrs: &serde_json::Value) -> Result<()> {
        let object = attrs
            .as_object()
            .ok_or_else(|| RuntimeError::Type(format!("Attributes must be an object, got {}", attrs)))?;
        let mut parsed = BTreeMap::new();
        for (attr, spec) in object {
            let pair = spec
                .as_array()
                .filter(|items| items.len() == 2)
                .ok_or_else(|| RuntimeError::Type(format!("Attribute {} must be [type, value], got {}", attr, spec)))?;
            let backfill = match &pair[1] {
                serde_json::Value::Null => None,
                value => Some(Value::from_json(value)),
            };
            parsed.insert(attr.clone(), (AttrType::from_json(&pair[0])?, backfill));
        }
        self.add_attrs(name, parsed)
    }

    /// `add_default(name, {"attr": value, ...})`
    pub fn add_default_json(&self, name: &str, defaults: &serde_json::Value) -> Result<()> {
        let object = defaults
            .as_object()
            .ok_or_else(|| RuntimeError::Type(format!("Defaults must be an object, got {}", defaults)))?;
        let defaults = object
            .iter()
            .map(|(attr, value)| (attr.clone(), Value::from_json(value)))
            .collect();
        self.add_default(name, defaults)
    }

    /// `add_constrs(name, {unique, foreign, check})`
    pub fn add_constrs_json(&self, name: &str, constraints: &serde_json::Value) -> Result<()> {
        self.add_constrs(name, Constraints::from_json(constraints)?)
    }

    /// `insert(name, {"attr": value, ...})`
    pub fn insert_json(&self, name: &str, values: &serde_json::Value) -> Result<serde_json::Value> {
        let object = values
            .as_object()
            .ok_or_else(|| RuntimeError::Type(format!("Values must be an object, got {}", values)))?;
        let values = object
            .iter()
            .map(|(attr, value)| (attr.clone(), Value::from_json(value)))
            .collect();
        Ok(self.insert(name, values)?.to_json())
    }

    /// `query(q, params, by, byParams, start, length)`
    pub fn query_json(&self, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        let request = normalize_query_args(args)?;
        let rows = self.engine.execute(&request)?;
        Ok(serde_json::Value::Array(rows.iter().map(Tuple::to_json).collect()))
    }
}

fn distinct_names(attrs: &[&str]) -> Result<Vec<String>> {
    let set: BTreeSet<&str> = attrs.iter().copied().collect();
    if set.len() != attrs.len() {
        return Err(RuntimeError::Value(format!("Duplicate attribute in {:?}", attrs)));
    }
    Ok(attrs.iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db() -> Db {
        Db::in_memory(QuotaConfig::default())
    }

    #[test]
    fn test_create_validates_names() {
        let db = db();
        let header = Header::new();
        assert!(matches!(db.create("1User", &header, Constraints::new()), Err(RuntimeError::Value(_))));
        assert!(matches!(db.create(&"U".repeat(61), &header, Constraints::new()), Err(RuntimeError::Quota(_))));

        let mut bad_attr = Header::new();
        bad_attr.insert("bad-name".into(), AttrType::string());
        assert!(matches!(db.create("User", &bad_attr, Constraints::new()), Err(RuntimeError::Value(_))));
        assert!(db.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_folds_sugar() {
        let db = db();
        db.create_json("User", &json!({"id": "serial", "name": "string"}), &json!({"unique": [["id"]]}))
            .unwrap();

        let mut header = Header::new();
        header.insert("author".into(), AttrType::number().integer().unwrap().foreign("User", "id"));
        header.insert("title".into(), AttrType::string().unique().check("title != \"\""));
        db.create("Post", &header, Constraints::new()).unwrap();

        assert_eq!(db.foreign_keys("Post").unwrap(), vec![ForeignKey::new(["author"], "User", ["id"])]);
        assert_eq!(db.unique_keys("Post").unwrap().len(), 2);
        assert!(matches!(
            db.insert_json("Post", &json!({"author": 0, "title": "x"})),
            Err(RuntimeError::Constraint(_))
        ));
    }

    #[test]
    fn test_shape_checked_before_engine() {
        let db = db();
        let constraints = Constraints::new().unique(["a", "a"]);
        let mut header = Header::new();
        header.insert("a".into(), AttrType::number());
        assert!(matches!(db.create("R", &header, constraints), Err(RuntimeError::Value(_))));
        assert!(matches!(db.drop_attrs("R", &["a", "a"]), Err(RuntimeError::Value(_))));
    }

    #[test]
    fn test_add_attrs_json() {
        let db = db();
        db.create_json("R", &json!({"a": "number"}), &json!(null)).unwrap();
        db.insert_json("R", &json!({"a": 1})).unwrap();

        assert!(matches!(
            db.add_attrs_json("R", &json!({"s": ["serial", 1]})),
            Err(RuntimeError::NotImplemented(_))
        ));
        assert!(matches!(db.add_attrs_json("R", &json!({"b": "string"})), Err(RuntimeError::Type(_))));

        db.add_attrs_json("R", &json!({"b": [["string", "dflt"], "old"], "s": ["serial", null]})).unwrap();
        let row = db.whose("R", QueryOptions::new()).unwrap();
        assert_eq!(row.get("b"), Some(&Value::from("old")));
        assert_eq!(row.get("s"), Some(&Value::from(0)));
        assert_eq!(db.defaults("R").unwrap().get("b"), Some(&Value::from("dflt")));
    }

    #[test]
    fn test_query_json() {
        let db = db();
        db.create_json("R", &json!({"n": "number"}), &json!(null)).unwrap();
        for n in [3, 1, 2] {
            db.insert_json("R", &json!({ "n": n })).unwrap();
        }
        let rows = db
            .query_json(&[json!("R where n > $"), json!([1]), json!("n desc")])
            .unwrap();
        assert_eq!(rows, json!([{"n": 3}, {"n": 2}]));
        assert!(matches!(db.query_json(&[]), Err(RuntimeError::Type(_))));
    }

    #[test]
    fn test_drop_all() {
        let db = db();
        db.create_json("User", &json!({"id": "serial"}), &json!({"unique": [["id"]]})).unwrap();
        db.create_json("Post", &json!({"author": "integer"}), &json!({"foreign": [[["author"], "User", ["id"]]]}))
            .unwrap();
        assert!(matches!(db.drop(&["User"]), Err(RuntimeError::Dependency(_))));
        db.drop_all().unwrap();
        assert!(db.list().unwrap().is_empty());
        db.drop_all().unwrap();
    }
}
