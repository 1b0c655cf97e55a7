//! Attribute types and the type builder

use super::{BaseType, Value};
use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest value a serial attribute holds; sequences stay exact in an `f64`
pub const MAX_SERIAL: f64 = 9_007_199_254_740_991.0;

/// Refinement of a base type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrTrait {
    #[default]
    Common,
    /// Integral numbers only
    Integer,
    /// Integral numbers drawn from a per-attribute sequence
    Serial,
}

/// Stored type of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrSpec {
    pub base: BaseType,
    pub refinement: AttrTrait,
}

impl AttrSpec {
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            refinement: AttrTrait::Common,
        }
    }

    /// Integer and serial attributes both hold integers
    pub fn is_integer(&self) -> bool {
        matches!(self.refinement, AttrTrait::Integer | AttrTrait::Serial)
    }

    pub fn is_serial(&self) -> bool {
        self.refinement == AttrTrait::Serial
    }

    /// Coerce a value to this type
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let value = value.coerce(self.base)?;
        if self.is_integer() {
            let n = value.as_f64().unwrap_or(f64::NAN);
            if !n.is_finite() || n.fract() != 0.0 {
                return Err(RuntimeError::Type(format!("Value {} is not an integer", value)));
            }
            if self.is_serial() && !(0.0..=MAX_SERIAL).contains(&n) {
                return Err(RuntimeError::Type(format!(
                    "Serial value {} is outside 0..={}",
                    value, MAX_SERIAL
                )));
            }
        }
        Ok(value)
    }
}

impl fmt::Display for AttrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.refinement {
            AttrTrait::Common => write!(f, "{}", self.base),
            AttrTrait::Integer => f.write_str("integer"),
            AttrTrait::Serial => f.write_str("serial"),
        }
    }
}

/// Attribute type as declared by application code.
///
/// Besides the stored [`AttrSpec`] it carries an optional default and
/// per-attribute constraint sugar that is folded into the relvar's
/// constraints when the header is applied.
///
/// ```ignore
/// let id = AttrType::number().serial()?.unique();
/// let age = AttrType::number().integer()?.default(18)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AttrType {
    spec: AttrSpec,
    default: Option<Value>,
    unique: bool,
    foreign: Vec<(String, String)>,
    checks: Vec<String>,
}

impl AttrType {
    pub fn of(base: BaseType) -> Self {
        Self {
            spec: AttrSpec::new(base),
            default: None,
            unique: false,
            foreign: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn number() -> Self {
        Self::of(BaseType::Number)
    }

    pub fn string() -> Self {
        Self::of(BaseType::String)
    }

    pub fn boolean() -> Self {
        Self::of(BaseType::Boolean)
    }

    pub fn date() -> Self {
        Self::of(BaseType::Date)
    }

    pub fn binary() -> Self {
        Self::of(BaseType::Binary)
    }

    pub fn json() -> Self {
        Self::of(BaseType::Json)
    }

    fn refine(mut self, refinement: AttrTrait) -> Result<Self> {
        if self.spec.base != BaseType::Number {
            return Err(RuntimeError::Usage(format!(
                "{:?} applies only to number attributes",
                refinement
            )));
        }
        if self.spec.refinement != AttrTrait::Common {
            return Err(RuntimeError::Usage("Trait redefinition".to_string()));
        }
        self.spec.refinement = refinement;
        Ok(self)
    }

    pub fn integer(self) -> Result<Self> {
        let refined = self.refine(AttrTrait::Integer)?;
        if let Some(default) = &refined.default {
            refined.spec.coerce(default.clone())?;
        }
        Ok(refined)
    }

    pub fn serial(self) -> Result<Self> {
        if self.default.is_some() {
            return Err(RuntimeError::Usage("Default and serial are incompatible".to_string()));
        }
        self.refine(AttrTrait::Serial)
    }

    /// Attach a default, coerced to the attribute type
    pub fn default(mut self, value: impl Into<Value>) -> Result<Self> {
        if self.spec.is_serial() {
            return Err(RuntimeError::Usage("Default and serial are incompatible".to_string()));
        }
        if self.default.is_some() {
            return Err(RuntimeError::Usage("Default redefinition".to_string()));
        }
        self.default = Some(self.spec.coerce(value.into())?);
        Ok(self)
    }

    /// Declare a single-attribute unique constraint
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Declare a single-attribute foreign key
    pub fn foreign(mut self, rel_var: impl Into<String>, attr: impl Into<String>) -> Self {
        self.foreign.push((rel_var.into(), attr.into()));
        self
    }

    /// Declare a check expression
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.checks.push(expr.into());
        self
    }

    pub fn spec(&self) -> AttrSpec {
        self.spec
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn foreign_refs(&self) -> &[(String, String)] {
        &self.foreign
    }

    pub fn checks(&self) -> &[String] {
        &self.checks
    }

    /// Parse the dynamic form: `"tag"` or `["tag", default]`
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::String(tag) => Self::from_tag(tag),
            serde_json::Value::Array(items) if items.len() == 2 => {
                let tag = items[0]
                    .as_str()
                    .ok_or_else(|| RuntimeError::Type(format!("Type tag must be a string, got {}", items[0])))?;
                Self::from_tag(tag)?.default(Value::from_json(&items[1]))
            }
            other => Err(RuntimeError::Type(format!(
                "Attribute type must be a tag or a [tag, default] pair, got {}",
                other
            ))),
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "integer" => Self::number().integer(),
            "serial" => Self::number().serial(),
            _ => BaseType::from_name(tag)
                .map(Self::of)
                .ok_or_else(|| RuntimeError::Type(format!("Unknown type tag \"{}\"", tag))),
        }
    }
}

impl From<BaseType> for AttrType {
    fn from(base: BaseType) -> Self {
        Self::of(base)
    }
}

/// Parse a dynamic header `{"attr": type, ...}`
pub fn header_from_json(json: &serde_json::Value) -> Result<BTreeMap<String, AttrType>> {
    let object = json
        .as_object()
        .ok_or_else(|| RuntimeError::Type(format!("Header must be an object, got {}", json)))?;
    object
        .iter()
        .map(|(name, ty)| Ok((name.clone(), AttrType::from_json(ty)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_rules() {
        assert!(AttrType::number().serial().unwrap().spec().is_integer());
        assert!(matches!(AttrType::number().integer().unwrap().serial(), Err(RuntimeError::Usage(_))));
        assert!(matches!(AttrType::number().integer().unwrap().integer(), Err(RuntimeError::Usage(_))));
        assert!(matches!(AttrType::number().serial().unwrap().default(1), Err(RuntimeError::Usage(_))));
        assert!(matches!(AttrType::number().default(1).unwrap().serial(), Err(RuntimeError::Usage(_))));
        assert!(matches!(AttrType::string().integer(), Err(RuntimeError::Usage(_))));
        assert!(matches!(AttrType::number().integer().unwrap().default(1.5), Err(RuntimeError::Type(_))));
        assert!(matches!(AttrType::number().default(1.5).unwrap().integer(), Err(RuntimeError::Type(_))));
    }

    #[test]
    fn test_serial_range() {
        let serial = AttrType::number().serial().unwrap().spec();
        assert_eq!(serial.coerce(Value::from(0)).unwrap(), Value::from(0));
        assert_eq!(serial.coerce(Value::Number(MAX_SERIAL)).unwrap(), Value::Number(MAX_SERIAL));
        for n in [-1.0, MAX_SERIAL + 1.0, 1e20] {
            assert!(matches!(serial.coerce(Value::Number(n)), Err(RuntimeError::Type(_))), "{}", n);
        }

        let integer = AttrType::number().integer().unwrap().spec();
        assert!(integer.coerce(Value::Number(-1e20)).is_ok());
    }

    #[test]
    fn test_defaults_are_coerced() {
        let flag = AttrType::boolean().default("yes").unwrap();
        assert_eq!(flag.default_value(), Some(&Value::Boolean(true)));
        assert!(matches!(AttrType::date().default("not a date"), Err(RuntimeError::Type(_))));
    }

    #[test]
    fn test_from_json() {
        let header = header_from_json(&json!({
            "id": "serial",
            "name": ["string", "anon"],
            "age": "integer",
        }))
        .unwrap();
        assert!(header["id"].spec().is_serial());
        assert_eq!(header["name"].default_value(), Some(&Value::from("anon")));
        assert_eq!(header["age"].spec().to_string(), "integer");

        assert!(matches!(header_from_json(&json!(["a"])), Err(RuntimeError::Type(_))));
        assert!(matches!(header_from_json(&json!({"a": "float"})), Err(RuntimeError::Type(_))));
        assert!(matches!(header_from_json(&json!({"a": 1})), Err(RuntimeError::Type(_))));
        assert!(matches!(header_from_json(&json!({"a": ["number"]})), Err(RuntimeError::Type(_))));
        assert!(matches!(header_from_json(&json!({"a": ["serial", 1]})), Err(RuntimeError::Usage(_))));
    }
}
