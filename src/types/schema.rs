//! Relation variable schemas and constraint records

use super::{AttrSpec, AttrType, Value};
use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `attrs` of one relvar reference `target_attrs` of `target`, pairwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub attrs: Vec<String>,
    pub target: String,
    pub target_attrs: Vec<String>,
}

impl ForeignKey {
    pub fn new<A, B>(attrs: A, target: impl Into<String>, target_attrs: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            attrs: attrs.into_iter().map(Into::into).collect(),
            target: target.into(),
            target_attrs: target_attrs.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `[[local...], "Target", [target...]]`
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let shape_error = || RuntimeError::Type(format!("Foreign key must be [[attrs], relvar, [attrs]], got {}", json));
        let items = json.as_array().filter(|items| items.len() == 3).ok_or_else(shape_error)?;
        let attrs = string_list(&items[0]).ok_or_else(shape_error)?;
        let target = items[1].as_str().ok_or_else(shape_error)?;
        let target_attrs = string_list(&items[2]).ok_or_else(shape_error)?;
        Ok(Self::new(attrs, target, target_attrs))
    }
}

fn string_list(json: &serde_json::Value) -> Option<Vec<String>> {
    json.as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Unique sets, foreign keys and check expressions of one relvar.
///
/// Used both as the options of `create` and as the argument of
/// `add_constrs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub unique: Vec<Vec<String>>,
    pub foreign: Vec<ForeignKey>,
    pub check: Vec<String>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique<I>(mut self, attrs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.unique.push(attrs.into_iter().map(Into::into).collect());
        self
    }

    pub fn foreign(mut self, key: ForeignKey) -> Self {
        self.foreign.push(key);
        self
    }

    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check.push(expr.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.unique.is_empty() && self.foreign.is_empty() && self.check.is_empty()
    }

    /// Collect the per-attribute sugar of a header
    pub fn from_header(header: &BTreeMap<String, AttrType>) -> Self {
        let mut constraints = Self::new();
        for (name, ty) in header {
            if ty.is_unique() {
                constraints.unique.push(vec![name.clone()]);
            }
            for (target, target_attr) in ty.foreign_refs() {
                constraints
                    .foreign
                    .push(ForeignKey::new([name.clone()], target.clone(), [target_attr.clone()]));
            }
            constraints.check.extend(ty.checks().iter().cloned());
        }
        constraints
    }

    pub fn merge(mut self, other: Constraints) -> Self {
        self.unique.extend(other.unique);
        self.foreign.extend(other.foreign);
        self.check.extend(other.check);
        self
    }

    /// Parse `{unique: [[..]], foreign: [[[..], "R", [..]]], check: [..]}`.
    /// `null` means no constraints.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        if json.is_null() {
            return Ok(Self::new());
        }
        let object = json
            .as_object()
            .ok_or_else(|| RuntimeError::Type(format!("Constraints must be an object, got {}", json)))?;

        let mut constraints = Self::new();
        for (key, value) in object {
            let items = value
                .as_array()
                .ok_or_else(|| RuntimeError::Type(format!("\"{}\" must be a list", key)))?;
            match key.as_str() {
                "unique" => {
                    for item in items {
                        let set = string_list(item)
                            .ok_or_else(|| RuntimeError::Type(format!("Unique set must list names, got {}", item)))?;
                        constraints.unique.push(set);
                    }
                }
                "foreign" => {
                    for item in items {
                        constraints.foreign.push(ForeignKey::from_json(item)?);
                    }
                }
                "check" => {
                    for item in items {
                        let expr = item
                            .as_str()
                            .ok_or_else(|| RuntimeError::Type(format!("Check must be a string, got {}", item)))?;
                        constraints.check.push(expr.to_string());
                    }
                }
                other => return Err(RuntimeError::Value(format!("Unknown constraint kind \"{}\"", other))),
            }
        }
        Ok(constraints)
    }
}

/// Stored schema of one relation variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelVarSchema {
    pub name: String,
    pub attrs: BTreeMap<String, AttrSpec>,
    pub defaults: BTreeMap<String, Value>,
    /// Explicit unique sets
    pub unique: Vec<BTreeSet<String>>,
    pub foreign: Vec<ForeignKey>,
    pub checks: Vec<String>,
}

impl RelVarSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            defaults: BTreeMap::new(),
            unique: Vec::new(),
            foreign: Vec::new(),
            checks: Vec::new(),
        }
    }

    /// Schema of a header; constraints are attached separately
    pub fn from_header(name: impl Into<String>, header: &BTreeMap<String, AttrType>) -> Self {
        let mut schema = Self::new(name);
        for (attr, ty) in header {
            schema.attrs.insert(attr.clone(), ty.spec());
            if let Some(default) = ty.default_value() {
                schema.defaults.insert(attr.clone(), default.clone());
            }
        }
        schema
    }

    pub fn header(&self) -> Vec<String> {
        self.attrs.keys().cloned().collect()
    }

    pub fn has_attr(&self, attr: &str) -> bool {
        self.attrs.contains_key(attr)
    }

    pub fn attr(&self, attr: &str) -> Result<&AttrSpec> {
        self.attrs
            .get(attr)
            .ok_or_else(|| RuntimeError::NoSuchAttr(format!("{}.{}", self.name, attr)))
    }

    /// Full attribute set, the implicit key
    pub fn implicit_key(&self) -> Option<BTreeSet<String>> {
        if self.attrs.is_empty() {
            None
        } else {
            Some(self.attrs.keys().cloned().collect())
        }
    }

    /// Explicit unique sets followed by the implicit key unless one equals it
    pub fn keys(&self) -> Vec<BTreeSet<String>> {
        let mut keys = self.unique.clone();
        if let Some(implicit) = self.implicit_key() {
            if !keys.contains(&implicit) {
                keys.push(implicit);
            }
        }
        keys
    }

    pub fn is_key<S: AsRef<str>>(&self, attrs: &[S]) -> bool {
        let set: BTreeSet<String> = attrs.iter().map(|a| a.as_ref().to_string()).collect();
        set.len() == attrs.len() && self.keys().contains(&set)
    }

    pub fn integers(&self) -> Vec<String> {
        self.attrs
            .iter()
            .filter(|(_, spec)| spec.is_integer())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn serials(&self) -> Vec<String> {
        self.attrs
            .iter()
            .filter(|(_, spec)| spec.is_serial())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Explicit constraints in option form
    pub fn constraints(&self) -> Constraints {
        Constraints {
            unique: self.unique.iter().map(|set| set.iter().cloned().collect()).collect(),
            foreign: self.foreign.clone(),
            check: self.checks.clone(),
        }
    }

    /// Whether any foreign key of this relvar points at `target`
    pub fn references(&self, target: &str) -> bool {
        self.foreign.iter().any(|fk| fk.target == target)
    }
}
