//! Query facade
//!
//! Normalizes query arguments into a [`QueryRequest`] and exposes the
//! chainable [`Queryable`] capability shared by whole relvars
//! ([`RelVarHandle`]) and derived queries ([`Query`]).

use crate::engine::lang::{check_params, parse_expr, parse_query, BinaryOperator, Expr};
use crate::engine::{Assignments, QueryEngine, QueryRequest};
use crate::error::{Result, RuntimeError};
use crate::types::{Tuple, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordering expressions; one string or a list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy(pub Vec<String>);

impl From<&str> for OrderBy {
    fn from(expr: &str) -> Self {
        OrderBy(vec![expr.to_string()])
    }
}

impl From<String> for OrderBy {
    fn from(expr: String) -> Self {
        OrderBy(vec![expr])
    }
}

impl From<Vec<String>> for OrderBy {
    fn from(exprs: Vec<String>) -> Self {
        OrderBy(exprs)
    }
}

impl From<Vec<&str>> for OrderBy {
    fn from(exprs: Vec<&str>) -> Self {
        OrderBy(exprs.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OrderBy {
    fn from(exprs: [&str; N]) -> Self {
        OrderBy(exprs.iter().map(|s| s.to_string()).collect())
    }
}

/// Optional arguments of a query.
///
/// Defaults: no parameters, no ordering, `start = 0`, unbounded length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub params: Vec<Value>,
    pub by: Vec<String>,
    pub by_params: Vec<Value>,
    pub start: usize,
    pub length: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn by(mut self, by: impl Into<OrderBy>) -> Self {
        self.by = by.into().0;
        self
    }

    pub fn by_params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.by_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn into_request(self, query: impl Into<String>) -> QueryRequest {
        QueryRequest {
            query: query.into(),
            params: self.params,
            by: self.by,
            by_params: self.by_params,
            start: self.start,
            length: self.length,
            only: None,
        }
    }
}

fn json_list(arg: Option<&serde_json::Value>, what: &str) -> Result<Vec<Value>> {
    match arg {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => Ok(items.iter().map(Value::from_json).collect()),
        Some(other) => Err(RuntimeError::Type(format!("{} must be a list, got {}", what, other))),
    }
}

fn json_index(arg: Option<&serde_json::Value>, what: &str) -> Result<Option<usize>> {
    match arg {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(json) => json
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| RuntimeError::Type(format!("{} must be a non-negative integer, got {}", what, json))),
    }
}

/// Normalize the positional form `[query, params, by, byParams, start, length]`
pub fn normalize_query_args(args: &[serde_json::Value]) -> Result<QueryRequest> {
    let Some(first) = args.first() else {
        return Err(RuntimeError::Type("query() requires at least one argument".to_string()));
    };
    if args.len() > 6 {
        return Err(RuntimeError::Type(format!("query() takes at most 6 arguments, got {}", args.len())));
    }
    let query = first
        .as_str()
        .ok_or_else(|| RuntimeError::Type(format!("Query must be a string, got {}", first)))?;

    let by = match args.get(2) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::String(expr)) => vec![expr.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| RuntimeError::Type(format!("Ordering must be a string, got {}", item)))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(RuntimeError::Type(format!(
                "by must be a string or a list of strings, got {}",
                other
            )))
        }
    };

    Ok(QueryRequest {
        query: query.to_string(),
        params: json_list(args.get(1), "Query parameters")?,
        by,
        by_params: json_list(args.get(3), "Ordering parameters")?,
        start: json_index(args.get(4), "start")?.unwrap_or(0),
        length: json_index(args.get(5), "length")?,
        only: None,
    })
}

/// Add a conjunct to the request's filter, renumbering its parameters
fn restrict(request: &QueryRequest, expr: &str, params: Vec<Value>) -> Result<QueryRequest> {
    if request.start != 0 || request.length.is_some() {
        return Err(RuntimeError::Usage("Cannot restrict a paginated query".to_string()));
    }
    let base = parse_query(&request.query)?;
    let mut added = parse_expr(expr)?;
    check_params(&added, params.len())?;
    added.shift_params(request.params.len());

    let filter = match base.filter {
        Some(existing) => Expr::BinaryOp {
            left: Box::new(existing),
            op: BinaryOperator::And,
            right: Box::new(added),
        },
        None => added,
    };

    let mut restricted = request.clone();
    restricted.query = format!("{} where {}", base.rel_var, filter);
    restricted.params.extend(params);
    Ok(restricted)
}

/// Chainable query capability.
///
/// Implementors provide the engine and the request they stand for; every
/// combinator returns a new [`Query`] and leaves `self` untouched.
pub trait Queryable {
    fn engine(&self) -> &Arc<dyn QueryEngine>;

    fn query_request(&self) -> QueryRequest;

    fn all(&self) -> Result<Vec<Tuple>> {
        self.engine().execute(&self.query_request())
    }

    /// Rows that also satisfy `expr`
    fn filter(&self, expr: &str, params: Vec<Value>) -> Result<Query> {
        let request = restrict(&self.query_request(), expr, params)?;
        Ok(Query::new(self.engine().clone(), request))
    }

    /// The single row satisfying `expr`
    fn whose(&self, expr: &str, params: Vec<Value>) -> Result<Tuple> {
        let mut rows = self.filter(expr, params)?.all()?;
        if rows.len() != 1 {
            return Err(RuntimeError::Query(format!("whose() query got {} tuples", rows.len())));
        }
        Ok(rows.remove(0))
    }

    fn only(&self, attrs: &[&str]) -> Query {
        let mut request = self.query_request();
        request.only = Some(attrs.iter().map(|a| a.to_string()).collect());
        Query::new(self.engine().clone(), request)
    }

    /// Distinct values of one attribute
    fn field(&self, attr: &str) -> Result<Vec<Value>> {
        let rows = self.only(&[attr]).all()?;
        Ok(rows.into_iter().filter_map(|row| row.get(attr).cloned()).collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.all()?.len())
    }

    fn by(&self, by: impl Into<OrderBy>, params: Vec<Value>) -> Query
    where
        Self: Sized,
    {
        let mut request = self.query_request();
        request.by.extend(by.into().0);
        request.by_params.extend(params);
        Query::new(self.engine().clone(), request)
    }

    /// Window relative to the current one
    fn range(&self, start: usize, length: Option<usize>) -> Query {
        let mut request = self.query_request();
        request.length = match (request.length, length) {
            (Some(current), Some(length)) => Some(length.min(current.saturating_sub(start))),
            (Some(current), None) => Some(current.saturating_sub(start)),
            (None, length) => length,
        };
        request.start = request.start.saturating_add(start);
        Query::new(self.engine().clone(), request)
    }

    /// Set attributes to expressions over the old row
    fn update(&self, exprs: BTreeMap<String, String>, params: Vec<Value>) -> Result<usize> {
        self.engine()
            .update(&self.query_request(), &Assignments { exprs, params })
    }

    /// Set attributes to literal values
    fn update_by_values(&self, values: BTreeMap<String, Value>) -> Result<usize> {
        let mut assignments = Assignments::default();
        for (idx, (attr, value)) in values.into_iter().enumerate() {
            assignments.exprs.insert(attr, format!("${}", idx + 1));
            assignments.params.push(value);
        }
        self.engine().update(&self.query_request(), &assignments)
    }

    fn delete(&self) -> Result<usize> {
        self.engine().delete(&self.query_request())
    }
}

/// Whole relvar
#[derive(Clone)]
pub struct RelVarHandle {
    engine: Arc<dyn QueryEngine>,
    name: String,
}

impl RelVarHandle {
    pub fn new(engine: Arc<dyn QueryEngine>, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Queryable for RelVarHandle {
    fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }

    fn query_request(&self) -> QueryRequest {
        QueryRequest::new(self.name.clone())
    }
}

/// Query derived from a relvar or another query
#[derive(Clone)]
pub struct Query {
    engine: Arc<dyn QueryEngine>,
    request: QueryRequest,
}

impl Query {
    pub fn new(engine: Arc<dyn QueryEngine>, request: QueryRequest) -> Self {
        Self { engine, request }
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }
}

impl Queryable for Query {
    fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }

    fn query_request(&self) -> QueryRequest {
        self.request.clone()
    }
}
