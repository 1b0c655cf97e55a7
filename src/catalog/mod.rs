//! Relvar catalog
//!
//! Holds the schemas of one tenant database and answers the dependency
//! questions schema changes depend on.

pub mod constraints;
pub mod names;

use crate::error::{Result, RuntimeError};
use crate::types::{ForeignKey, RelVarSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Relvar name -> schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    rel_vars: BTreeMap<String, RelVarSchema>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rel_vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rel_vars.is_empty()
    }

    /// Sorted relvar names
    pub fn names(&self) -> Vec<String> {
        self.rel_vars.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rel_vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&RelVarSchema> {
        self.rel_vars
            .get(name)
            .ok_or_else(|| RuntimeError::NoSuchRelVar(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut RelVarSchema> {
        self.rel_vars
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NoSuchRelVar(name.to_string()))
    }

    pub fn schemas(&self) -> impl Iterator<Item = &RelVarSchema> {
        self.rel_vars.values()
    }

    pub fn insert(&mut self, schema: RelVarSchema) -> Result<()> {
        if self.rel_vars.contains_key(&schema.name) {
            return Err(RuntimeError::RelVarExists(schema.name));
        }
        self.rel_vars.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn replace(&mut self, schema: RelVarSchema) {
        self.rel_vars.insert(schema.name.clone(), schema);
    }

    /// Foreign keys of other relvars pointing at `target`
    pub fn referrers<'a>(&'a self, target: &'a str) -> impl Iterator<Item = (&'a str, &'a ForeignKey)> + 'a {
        self.rel_vars
            .values()
            .filter(move |schema| schema.name != target)
            .flat_map(move |schema| {
                schema
                    .foreign
                    .iter()
                    .filter(move |fk| fk.target == target)
                    .map(move |fk| (schema.name.as_str(), fk))
            })
    }

    /// Remove a set of relvars at once.
    ///
    /// Names must be distinct and exist; relvars outside the set may not
    /// reference any relvar in it.
    pub fn remove(&mut self, names: &[String]) -> Result<Vec<RelVarSchema>> {
        let set: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        if set.len() != names.len() {
            return Err(RuntimeError::Value(format!("Duplicate relation variable in {:?}", names)));
        }
        if let Some(missing) = names.iter().find(|name| !self.rel_vars.contains_key(*name)) {
            return Err(RuntimeError::NoSuchRelVar(missing.clone()));
        }
        for name in names {
            if let Some((referrer, _)) = self.referrers(name).find(|(referrer, _)| !set.contains(referrer)) {
                return Err(RuntimeError::Dependency(format!(
                    "{} is referenced by {}",
                    name, referrer
                )));
            }
        }
        Ok(names.iter().filter_map(|name| self.rel_vars.remove(name)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(name: &str, references: Option<&str>) -> RelVarSchema {
        let mut schema = RelVarSchema::new(name);
        if let Some(target) = references {
            schema.foreign.push(ForeignKey::new(["id"], target, ["id"]));
        }
        schema
    }

    #[test]
    fn test_insert_and_get() {
        let mut catalog = Catalog::new();
        catalog.insert(schema("A", None)).unwrap();
        assert!(matches!(catalog.insert(schema("A", None)), Err(RuntimeError::RelVarExists(_))));
        assert!(catalog.get("A").is_ok());
        assert!(matches!(catalog.get("a"), Err(RuntimeError::NoSuchRelVar(_))));
    }

    #[test]
    fn test_remove_rules() {
        let mut catalog = Catalog::new();
        catalog.insert(schema("User", None)).unwrap();
        catalog.insert(schema("Post", Some("User"))).unwrap();
        catalog.insert(schema("Loop", Some("Loop"))).unwrap();

        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(matches!(catalog.remove(&names(&["User"])), Err(RuntimeError::Dependency(_))));
        assert!(matches!(catalog.remove(&names(&["Post", "Post"])), Err(RuntimeError::Value(_))));
        assert!(matches!(catalog.remove(&names(&["Post", "Nope", "Gone"])), Err(RuntimeError::NoSuchRelVar(ref n)) if n == "Nope"));
        assert_eq!(catalog.len(), 3);

        // Self references do not block
        catalog.remove(&names(&["Loop"])).unwrap();
        catalog.remove(&names(&["User", "Post"])).unwrap();
        assert!(catalog.is_empty());
    }
}
