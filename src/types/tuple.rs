//! Immutable rows

use super::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute-name-keyed row returned by queries
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple(BTreeMap<String, Value>);

impl Tuple {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.0.get(attr)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn attrs(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Tuple restricted to `attrs`; missing attributes are skipped
    pub fn project<S: AsRef<str>>(&self, attrs: &[S]) -> Tuple {
        let values = attrs
            .iter()
            .filter_map(|attr| {
                let attr = attr.as_ref();
                self.0.get(attr).map(|v| (attr.to_string(), v.clone()))
            })
            .collect();
        Tuple(values)
    }

    /// Copy with one attribute replaced or added
    pub fn with(&self, attr: &str, value: Value) -> Tuple {
        let mut values = self.0.clone();
        values.insert(attr.to_string(), value);
        Tuple(values)
    }

    /// Copy without the given attributes
    pub fn without<S: AsRef<str>>(&self, attrs: &[S]) -> Tuple {
        let mut values = self.0.clone();
        for attr in attrs {
            values.remove(attr.as_ref());
        }
        Tuple(values)
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Tuple {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tuple(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection_and_json() {
        let tuple: Tuple = [("id", Value::from(0)), ("name", Value::from("anton"))].into_iter().collect();
        assert_eq!(tuple.project(&["name"]).to_json(), json!({"name": "anton"}));
        assert_eq!(tuple.without(&["id"]).len(), 1);
        assert_eq!(tuple.with("id", Value::from(1)).get("id"), Some(&Value::from(1)));
        assert_eq!(tuple.to_json(), json!({"id": 0, "name": "anton"}));
    }
}
