//! In-memory reference engine
//!
//! Every statement runs against a clone of the current state under the write
//! lock. The clone is verified against all constraints and swapped in only
//! when the statement and the verification both succeed, so a failed
//! statement leaves nothing behind. With a data directory, the state is
//! snapshotted with bincode after each committed statement.

use super::lang::{check_attrs, check_params, parse_expr, parse_ordering, parse_query, Evaluator};
use super::{Assignments, NewAttr, QueryEngine, QueryRequest, SchemaChange};
use crate::catalog::{constraints, names, Catalog};
use crate::config::QuotaConfig;
use crate::error::{Result, RuntimeError};
use crate::types::{Constraints, RelVarSchema, Tuple, Value, MAX_SERIAL};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SNAPSHOT_FILE: &str = "engine.bin";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RelVarData {
    /// Insertion order
    rows: Vec<Tuple>,
    /// Next value per serial attribute
    sequences: BTreeMap<String, u64>,
}

impl RelVarData {
    fn next_serial(&mut self, attr: &str) -> Result<Value> {
        let next = self.sequences.entry(attr.to_string()).or_insert(0);
        if *next as f64 > MAX_SERIAL {
            return Err(RuntimeError::Quota(format!("Sequence of serial attribute {} is exhausted", attr)));
        }
        let value = Value::Number(*next as f64);
        *next += 1;
        Ok(value)
    }

    /// Keep the sequence ahead of explicitly supplied serial values
    fn observe_serial(&mut self, attr: &str, value: &Value) {
        if let Some(n) = value.as_f64().filter(|n| (0.0..=MAX_SERIAL).contains(n)) {
            let next = self.sequences.entry(attr.to_string()).or_insert(0);
            let n = n as u64;
            if n >= *next {
                *next = n.saturating_add(1);
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EngineState {
    catalog: Catalog,
    data: BTreeMap<String, RelVarData>,
}

impl EngineState {
    fn data_mut(&mut self, name: &str) -> &mut RelVarData {
        self.data.entry(name.to_string()).or_default()
    }

    fn rows(&self, name: &str) -> &[Tuple] {
        self.data.get(name).map(|d| d.rows.as_slice()).unwrap_or(&[])
    }

    /// Indices of the rows a query selects, in insertion order
    fn select(&self, query: &str, params: &[Value]) -> Result<(&RelVarSchema, Vec<usize>)> {
        let parsed = parse_query(query)?;
        let schema = self.catalog.get(&parsed.rel_var)?;
        let rows = self.rows(&schema.name);
        let Some(filter) = parsed.filter else {
            return Ok((schema, (0..rows.len()).collect()));
        };

        check_attrs(&filter, schema)?;
        check_params(&filter, params.len())?;
        let evaluator = Evaluator::new(params);
        let mut selected = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            if evaluator.matches(&filter, row)? {
                selected.push(idx);
            }
        }
        Ok((schema, selected))
    }

    /// Reorder selected row indices by the request's orderings
    fn order(&self, schema: &RelVarSchema, selected: Vec<usize>, request: &QueryRequest) -> Result<Vec<usize>> {
        if request.by.is_empty() {
            return Ok(selected);
        }
        let mut orderings = Vec::with_capacity(request.by.len());
        for text in &request.by {
            let ordering = parse_ordering(text)?;
            check_attrs(&ordering.expr, schema)?;
            check_params(&ordering.expr, request.by_params.len())?;
            orderings.push(ordering);
        }

        let rows = self.rows(&schema.name);
        let evaluator = Evaluator::new(&request.by_params);
        let mut keyed = Vec::with_capacity(selected.len());
        for idx in selected {
            let key = orderings
                .iter()
                .map(|ordering| evaluator.eval(&ordering.expr, &rows[idx]))
                .collect::<Result<Vec<Value>>>()?;
            keyed.push((key, idx));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), ordering) in a.iter().zip(b).zip(&orderings) {
                let ord = x.total_cmp(y);
                if ord != std::cmp::Ordering::Equal {
                    return if ordering.descending { ord.reverse() } else { ord };
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, idx)| idx).collect())
    }

    /// Indices of the rows an update or delete touches: filtered, ordered, then windowed
    fn target(&self, request: &QueryRequest, statement: &str) -> Result<(&RelVarSchema, Vec<usize>)> {
        if request.only.is_some() {
            return Err(RuntimeError::Usage(format!("Cannot {} a projected query", statement)));
        }
        let (schema, selected) = self.select(&request.query, &request.params)?;
        let ordered = self.order(schema, selected, request)?;
        Ok((schema, window(ordered, request)))
    }

    /// Check every relvar against its constraints
    fn verify(&self) -> Result<()> {
        for schema in self.catalog.schemas() {
            let rows = self.rows(&schema.name);

            let distinct: BTreeSet<&Tuple> = rows.iter().collect();
            if distinct.len() != rows.len() {
                return Err(RuntimeError::Constraint(format!("Duplicate tuple in {}", schema.name)));
            }

            for set in &schema.unique {
                let attrs: Vec<&String> = set.iter().collect();
                let projected: BTreeSet<Vec<Option<&Value>>> =
                    rows.iter().map(|row| attrs.iter().map(|a| row.get(a)).collect()).collect();
                if projected.len() != rows.len() {
                    return Err(RuntimeError::Constraint(format!(
                        "Unique constraint {:?} of {} violated",
                        set, schema.name
                    )));
                }
            }

            for fk in &schema.foreign {
                let targets: BTreeSet<Vec<Option<&Value>>> = self
                    .rows(&fk.target)
                    .iter()
                    .map(|row| fk.target_attrs.iter().map(|a| row.get(a)).collect())
                    .collect();
                for row in rows {
                    let values: Vec<Option<&Value>> = fk.attrs.iter().map(|a| row.get(a)).collect();
                    if !targets.contains(&values) {
                        return Err(RuntimeError::Constraint(format!(
                            "Foreign key {:?} of {} references a missing tuple of {}",
                            fk.attrs, schema.name, fk.target
                        )));
                    }
                }
            }

            for check in &schema.checks {
                let expr = parse_expr(check)?;
                let evaluator = Evaluator::new(&[]);
                for row in rows {
                    if !evaluator.matches(&expr, row)? {
                        return Err(RuntimeError::Constraint(format!(
                            "Check \"{}\" of {} failed",
                            check, schema.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-memory [`QueryEngine`] with optional on-disk snapshots
pub struct MemoryEngine {
    state: RwLock<EngineState>,
    quotas: QuotaConfig,
    persist_path: Option<PathBuf>,
}

impl MemoryEngine {
    /// Create an engine that keeps everything in memory
    pub fn new(quotas: QuotaConfig) -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            quotas,
            persist_path: None,
        }
    }

    /// Open an engine persisted under `data_dir`, loading any snapshot
    pub fn open<P: AsRef<Path>>(data_dir: P, quotas: QuotaConfig) -> Result<Self> {
        fs::create_dir_all(data_dir.as_ref())?;
        let persist_path = data_dir.as_ref().join(SNAPSHOT_FILE);

        let state = if persist_path.exists() {
            let data = fs::read(&persist_path)?;
            bincode::deserialize(&data)?
        } else {
            EngineState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            quotas,
            persist_path: Some(persist_path),
        })
    }

    pub fn quotas(&self) -> &QuotaConfig {
        &self.quotas
    }

    fn persist(&self, state: &EngineState) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = bincode::serialize(state)?;
        let tmp_path = path.with_extension("bin.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Run one statement all-or-nothing
    fn mutate<T>(&self, statement: &str, f: impl FnOnce(&mut EngineState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let mut draft = state.clone();

        let result = f(&mut draft).and_then(|value| {
            draft.verify()?;
            self.persist(&draft)?;
            Ok(value)
        });

        match result {
            Ok(value) => {
                *state = draft;
                Ok(value)
            }
            Err(e) => {
                warn!(statement, error = %e, "statement rolled back");
                Err(e)
            }
        }
    }

    fn check_row_size(&self, rel_var: &str, row: &Tuple) -> Result<()> {
        check_row_size(rel_var, row, &self.quotas)
    }
}

fn check_row_size(rel_var: &str, row: &Tuple, quotas: &QuotaConfig) -> Result<()> {
    let size = bincode::serialized_size(row)?;
    if size > quotas.max_row_size {
        return Err(RuntimeError::Quota(format!(
            "Tuple of {} takes {} bytes, limit is {}",
            rel_var, size, quotas.max_row_size
        )));
    }
    Ok(())
}

/// Apply `start` and `length`
fn window<T>(items: Vec<T>, request: &QueryRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(request.start)
        .take(request.length.unwrap_or(usize::MAX))
        .collect()
}

fn check_defaults(schema: &RelVarSchema) -> Result<()> {
    for (attr, value) in &schema.defaults {
        let spec = schema.attr(attr)?;
        if spec.is_serial() {
            return Err(RuntimeError::Usage(format!("Serial attribute {} cannot have a default", attr)));
        }
        spec.coerce(value.clone())?;
    }
    Ok(())
}

fn add_attrs(state: &mut EngineState, schema: &mut RelVarSchema, attrs: Vec<NewAttr>, quotas: &QuotaConfig) -> Result<()> {
    let mut seen = BTreeSet::new();
    for attr in &attrs {
        if schema.has_attr(&attr.name) || !seen.insert(attr.name.as_str()) {
            return Err(RuntimeError::AttrExists(format!("{}.{}", schema.name, attr.name)));
        }
        if attr.spec.is_serial() && attr.backfill.is_some() {
            return Err(RuntimeError::NotImplemented(format!(
                "Backfilling serial attribute {}",
                attr.name
            )));
        }
        if attr.spec.is_serial() && attr.default.is_some() {
            return Err(RuntimeError::Usage("Default and serial are incompatible".to_string()));
        }
    }
    names::check_attr_count(schema.attrs.len() + attrs.len(), quotas)?;

    let data = state.data_mut(&schema.name);
    for attr in attrs {
        let default = attr.default.map(|v| attr.spec.coerce(v)).transpose()?;
        let backfill = attr.backfill.map(|v| attr.spec.coerce(v)).transpose()?;
        let fill = backfill.or_else(|| default.clone());

        for idx in 0..data.rows.len() {
            let value = if attr.spec.is_serial() {
                data.next_serial(&attr.name)?
            } else {
                fill.clone().ok_or_else(|| {
                    RuntimeError::Constraint(format!(
                        "Attribute {} needs a value for the existing tuples of {}",
                        attr.name, schema.name
                    ))
                })?
            };
            let row = data.rows[idx].with(&attr.name, value);
            check_row_size(&schema.name, &row, quotas)?;
            data.rows[idx] = row;
        }

        if let Some(default) = default {
            schema.defaults.insert(attr.name.clone(), default);
        }
        schema.attrs.insert(attr.name, attr.spec);
    }
    Ok(())
}

fn drop_attrs(state: &mut EngineState, schema: &mut RelVarSchema, attrs: Vec<String>) -> Result<()> {
    let distinct: BTreeSet<&String> = attrs.iter().collect();
    if distinct.len() != attrs.len() {
        return Err(RuntimeError::Value(format!("Duplicate attribute in {:?}", attrs)));
    }

    for attr in &attrs {
        schema.attr(attr)?;
        if schema.unique.iter().any(|set| set.contains(attr)) {
            return Err(RuntimeError::Dependency(format!(
                "{}.{} is part of a unique constraint",
                schema.name, attr
            )));
        }
        if schema.foreign.iter().any(|fk| fk.attrs.contains(attr)) {
            return Err(RuntimeError::Dependency(format!(
                "{}.{} is part of a foreign key",
                schema.name, attr
            )));
        }
        if let Some((referrer, _)) = state
            .catalog
            .referrers(&schema.name)
            .find(|(_, fk)| fk.target_attrs.contains(attr))
        {
            return Err(RuntimeError::Dependency(format!(
                "{}.{} is referenced by {}",
                schema.name, attr, referrer
            )));
        }
        for check in &schema.checks {
            let mut used = Vec::new();
            let expr = parse_expr(check)?;
            expr.attrs(&mut used);
            if used.iter().any(|used| *used == attr.as_str()) {
                return Err(RuntimeError::Dependency(format!(
                    "{}.{} is used by check \"{}\"",
                    schema.name, attr, check
                )));
            }
        }
    }

    for attr in &attrs {
        schema.attrs.remove(attr);
        schema.defaults.remove(attr);
    }
    let data = state.data_mut(&schema.name);
    for row in data.rows.iter_mut() {
        *row = row.without(&attrs);
    }
    for attr in &attrs {
        data.sequences.remove(attr);
    }
    Ok(())
}

impl QueryEngine for MemoryEngine {
    fn execute(&self, request: &QueryRequest) -> Result<Vec<Tuple>> {
        let state = self.state.read();
        let (schema, selected) = state.select(&request.query, &request.params)?;
        let ordered = state.order(schema, selected, request)?;
        let rows = state.rows(&schema.name);
        let rows: Vec<&Tuple> = ordered.into_iter().map(|idx| &rows[idx]).collect();

        let tuples: Vec<Tuple> = match &request.only {
            Some(attrs) => {
                for attr in attrs {
                    schema.attr(attr)?;
                }
                let mut seen = BTreeSet::new();
                rows.into_iter()
                    .map(|row| row.project(attrs))
                    .filter(|tuple| seen.insert(tuple.clone()))
                    .collect()
            }
            None => rows.into_iter().cloned().collect(),
        };

        let page = window(tuples, request);
        debug!(query = %request.query, rows = page.len(), "query executed");
        Ok(page)
    }

    fn rel_var_names(&self) -> Result<Vec<String>> {
        Ok(self.state.read().catalog.names())
    }

    fn describe(&self, name: &str) -> Result<RelVarSchema> {
        self.state.read().catalog.get(name).cloned()
    }

    fn create_rel_var(&self, mut schema: RelVarSchema, constraints: Constraints) -> Result<()> {
        let name = schema.name.clone();
        self.mutate("create", |state| {
            if state.catalog.contains(&schema.name) {
                return Err(RuntimeError::RelVarExists(schema.name.clone()));
            }
            if state.catalog.len() >= self.quotas.max_rel_vars {
                return Err(RuntimeError::Quota(format!(
                    "Cannot create more than {} relation variables",
                    self.quotas.max_rel_vars
                )));
            }
            names::check_attr_count(schema.attrs.len(), &self.quotas)?;
            check_defaults(&schema)?;
            constraints::attach(&state.catalog, &mut schema, &constraints)?;

            let mut data = RelVarData::default();
            for serial in schema.serials() {
                data.sequences.insert(serial, 0);
            }
            state.data.insert(schema.name.clone(), data);
            state.catalog.insert(schema)
        })?;
        info!(rel_var = %name, "relation variable created");
        Ok(())
    }

    fn drop_rel_vars(&self, names: &[String]) -> Result<()> {
        self.mutate("drop", |state| {
            for schema in state.catalog.remove(names)? {
                state.data.remove(&schema.name);
            }
            Ok(())
        })?;
        info!(rel_vars = ?names, "relation variables dropped");
        Ok(())
    }

    fn alter_rel_var(&self, name: &str, change: SchemaChange) -> Result<()> {
        self.mutate("alter", |state| {
            let mut schema = state.catalog.get(name)?.clone();
            match change {
                SchemaChange::AddAttrs { attrs, constraints } => {
                    add_attrs(state, &mut schema, attrs, &self.quotas)?;
                    constraints::attach(&state.catalog, &mut schema, &constraints)?;
                }
                SchemaChange::DropAttrs(attrs) => drop_attrs(state, &mut schema, attrs)?,
                SchemaChange::AddDefaults(defaults) => {
                    for (attr, value) in defaults {
                        let spec = *schema.attr(&attr)?;
                        if spec.is_serial() {
                            return Err(RuntimeError::Usage("Default and serial are incompatible".to_string()));
                        }
                        schema.defaults.insert(attr, spec.coerce(value)?);
                    }
                }
                SchemaChange::DropDefaults(attrs) => {
                    for attr in &attrs {
                        schema.attr(attr)?;
                    }
                    for attr in &attrs {
                        schema.defaults.remove(attr);
                    }
                }
                SchemaChange::AddConstraints(constraints) => {
                    constraints::attach(&state.catalog, &mut schema, &constraints)?;
                }
                SchemaChange::DropAllConstraints => {
                    schema.unique.clear();
                    schema.foreign.clear();
                    schema.checks.clear();
                    if let Some((referrer, fk)) = state
                        .catalog
                        .referrers(name)
                        .find(|(_, fk)| !schema.is_key(&fk.target_attrs))
                    {
                        return Err(RuntimeError::Dependency(format!(
                            "{} references {:?} of {}",
                            referrer, fk.target_attrs, name
                        )));
                    }
                }
            }
            state.catalog.replace(schema);
            Ok(())
        })?;
        info!(rel_var = %name, "relation variable altered");
        Ok(())
    }

    fn insert(&self, name: &str, mut values: BTreeMap<String, Value>) -> Result<Tuple> {
        self.mutate("insert", |state| {
            let schema = state.catalog.get(name)?.clone();
            if let Some(unknown) = values.keys().find(|attr| !schema.has_attr(attr)) {
                return Err(RuntimeError::NoSuchAttr(format!("{}.{}", name, unknown)));
            }

            let data = state.data_mut(name);
            let mut row = BTreeMap::new();
            for (attr, spec) in &schema.attrs {
                let value = match values.remove(attr) {
                    Some(value) => {
                        let value = spec.coerce(value)?;
                        if spec.is_serial() {
                            data.observe_serial(attr, &value);
                        }
                        value
                    }
                    None if spec.is_serial() => data.next_serial(attr)?,
                    None => schema.defaults.get(attr).cloned().ok_or_else(|| {
                        RuntimeError::Constraint(format!("Attribute {}.{} has no value and no default", name, attr))
                    })?,
                };
                row.insert(attr.clone(), value);
            }

            let tuple = Tuple::new(row);
            self.check_row_size(name, &tuple)?;
            data.rows.push(tuple.clone());
            Ok(tuple)
        })
    }

    fn update(&self, request: &QueryRequest, assignments: &Assignments) -> Result<usize> {
        self.mutate("update", |state| {
            let (schema, selected) = state.target(request, "update")?;
            let schema = schema.clone();

            let mut exprs = Vec::with_capacity(assignments.exprs.len());
            for (attr, text) in &assignments.exprs {
                let spec = *schema.attr(attr)?;
                let expr = parse_expr(text)?;
                check_attrs(&expr, &schema)?;
                check_params(&expr, assignments.params.len())?;
                exprs.push((attr, spec, expr));
            }

            let evaluator = Evaluator::new(&assignments.params);
            let rows = &state.rows(&schema.name).to_vec();
            let mut updated = Vec::with_capacity(selected.len());
            for idx in &selected {
                let old = &rows[*idx];
                let mut row = old.clone();
                for (attr, spec, expr) in &exprs {
                    row = row.with(attr, spec.coerce(evaluator.eval(expr, old)?)?);
                }
                self.check_row_size(&schema.name, &row)?;
                updated.push((*idx, row));
            }

            let data = state.data_mut(&schema.name);
            for (idx, row) in updated {
                for (attr, spec, _) in &exprs {
                    if spec.is_serial() {
                        if let Some(value) = row.get(attr) {
                            data.observe_serial(attr, value);
                        }
                    }
                }
                data.rows[idx] = row;
            }
            Ok(selected.len())
        })
    }

    fn delete(&self, request: &QueryRequest) -> Result<usize> {
        self.mutate("delete", |state| {
            let (schema, selected) = state.target(request, "delete")?;
            let name = schema.name.clone();
            let selected: BTreeSet<usize> = selected.into_iter().collect();

            let data = state.data_mut(&name);
            let mut idx = 0;
            data.rows.retain(|_| {
                let keep = !selected.contains(&idx);
                idx += 1;
                keep
            });
            Ok(selected.len())
        })
    }
}
