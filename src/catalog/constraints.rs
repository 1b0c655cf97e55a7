//! Constraint checking
//!
//! Shape rules need only the constraint record; everything else is checked
//! against the catalog the constraints are being added to.

use super::Catalog;
use crate::engine::lang::{check_attrs, check_params, parse_expr};
use crate::error::{Result, RuntimeError};
use crate::types::{Constraints, ForeignKey, RelVarSchema};
use std::collections::BTreeSet;

fn distinct(attrs: &[String]) -> bool {
    attrs.iter().collect::<BTreeSet<_>>().len() == attrs.len()
}

/// Rules that hold regardless of any schema
pub fn check_shape(constraints: &Constraints) -> Result<()> {
    for set in &constraints.unique {
        if set.is_empty() {
            return Err(RuntimeError::Value("Empty unique attribute set".to_string()));
        }
        if !distinct(set) {
            return Err(RuntimeError::Value(format!("Duplicate attribute in unique set {:?}", set)));
        }
    }
    for fk in &constraints.foreign {
        if fk.attrs.is_empty() {
            return Err(RuntimeError::Value(format!("Empty foreign key to {}", fk.target)));
        }
        if fk.attrs.len() != fk.target_attrs.len() {
            return Err(RuntimeError::Value(format!(
                "Foreign key to {} has {} local and {} referenced attributes",
                fk.target,
                fk.attrs.len(),
                fk.target_attrs.len()
            )));
        }
        if !distinct(&fk.attrs) || !distinct(&fk.target_attrs) {
            return Err(RuntimeError::Value(format!("Duplicate attribute in foreign key to {}", fk.target)));
        }
    }
    Ok(())
}

/// Validate `constraints` against `schema` and the catalog, then attach them.
///
/// `schema` may not be in the catalog yet; foreign keys naming it resolve to
/// `schema` itself. On error `schema` may be partially modified and must be
/// discarded.
pub fn attach(catalog: &Catalog, schema: &mut RelVarSchema, constraints: &Constraints) -> Result<()> {
    check_shape(constraints)?;

    for set in &constraints.unique {
        for attr in set {
            schema.attr(attr)?;
        }
        let set: BTreeSet<String> = set.iter().cloned().collect();
        if !schema.unique.contains(&set) {
            schema.unique.push(set);
        }
    }

    for fk in &constraints.foreign {
        check_foreign_key(catalog, schema, fk)?;
        if !schema.foreign.contains(fk) {
            schema.foreign.push(fk.clone());
        }
    }

    for check in &constraints.check {
        let expr = parse_expr(check)?;
        check_attrs(&expr, schema)?;
        check_params(&expr, 0)?;
        schema.checks.push(check.clone());
    }
    Ok(())
}

fn check_foreign_key(catalog: &Catalog, schema: &RelVarSchema, fk: &ForeignKey) -> Result<()> {
    for attr in &fk.attrs {
        schema.attr(attr)?;
    }

    let target = if fk.target == schema.name {
        schema
    } else {
        catalog.get(&fk.target)?
    };
    for attr in &fk.target_attrs {
        target.attr(attr)?;
    }
    if !target.is_key(&fk.target_attrs) {
        return Err(RuntimeError::Constraint(format!(
            "Attributes {:?} of {} are not a key",
            fk.target_attrs, fk.target
        )));
    }

    for (local, remote) in fk.attrs.iter().zip(&fk.target_attrs) {
        let local_spec = schema.attr(local)?;
        let remote_spec = target.attr(remote)?;
        if local_spec.base != remote_spec.base || local_spec.is_integer() != remote_spec.is_integer() {
            return Err(RuntimeError::Type(format!(
                "Foreign key attribute {}.{} of type {} cannot reference {}.{} of type {}",
                schema.name, local, local_spec, fk.target, remote, remote_spec
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttrType, Header};

    fn catalog_with_parent(unique_x: bool) -> Catalog {
        let mut header = Header::new();
        header.insert("x".to_string(), AttrType::number().integer().unwrap());
        header.insert("y".to_string(), AttrType::string());
        let mut parent = RelVarSchema::from_header("Parent", &header);
        if unique_x {
            attach(&Catalog::new(), &mut parent, &Constraints::new().unique(["x"])).unwrap();
        }
        let mut catalog = Catalog::new();
        catalog.insert(parent).unwrap();
        catalog
    }

    fn child(ty: AttrType) -> RelVarSchema {
        let mut header = Header::new();
        header.insert("ref".to_string(), ty);
        RelVarSchema::from_header("Child", &header)
    }

    #[test]
    fn test_shape_errors() {
        let bad = [
            Constraints::new().unique(Vec::<String>::new()),
            Constraints::new().unique(["a", "a"]),
            Constraints::new().foreign(ForeignKey::new(Vec::<String>::new(), "P", Vec::<String>::new())),
            Constraints::new().foreign(ForeignKey::new(["a", "b"], "P", ["x"])),
            Constraints::new().foreign(ForeignKey::new(["a", "a"], "P", ["x", "y"])),
        ];
        for constraints in &bad {
            assert!(matches!(check_shape(constraints), Err(RuntimeError::Value(_))));
        }
    }

    #[test]
    fn test_foreign_key_requires_key() {
        let fk = Constraints::new().foreign(ForeignKey::new(["ref"], "Parent", ["x"]));

        let mut schema = child(AttrType::number().integer().unwrap());
        let result = attach(&catalog_with_parent(false), &mut schema, &fk);
        assert!(matches!(result, Err(RuntimeError::Constraint(_))));

        let mut schema = child(AttrType::number().integer().unwrap());
        attach(&catalog_with_parent(true), &mut schema, &fk).unwrap();
        assert_eq!(schema.foreign.len(), 1);
    }

    #[test]
    fn test_foreign_key_type_mismatch() {
        let fk = Constraints::new().foreign(ForeignKey::new(["ref"], "Parent", ["x"]));
        let catalog = catalog_with_parent(true);

        let mut plain_number = child(AttrType::number());
        assert!(matches!(attach(&catalog, &mut plain_number, &fk), Err(RuntimeError::Type(_))));

        let mut string = child(AttrType::string());
        assert!(matches!(attach(&catalog, &mut string, &fk), Err(RuntimeError::Type(_))));
    }

    #[test]
    fn test_foreign_key_lookup_errors() {
        let catalog = catalog_with_parent(true);
        let mut schema = child(AttrType::number().integer().unwrap());

        let missing_target = Constraints::new().foreign(ForeignKey::new(["ref"], "Nope", ["x"]));
        assert!(matches!(attach(&catalog, &mut schema, &missing_target), Err(RuntimeError::NoSuchRelVar(_))));

        let missing_local = Constraints::new().foreign(ForeignKey::new(["nope"], "Parent", ["x"]));
        assert!(matches!(attach(&catalog, &mut schema, &missing_local), Err(RuntimeError::NoSuchAttr(_))));
    }

    #[test]
    fn test_self_reference() {
        let mut header = Header::new();
        header.insert("id".to_string(), AttrType::number().serial().unwrap());
        header.insert("parent".to_string(), AttrType::number().integer().unwrap());
        let mut tree = RelVarSchema::from_header("Tree", &header);
        let constraints = Constraints::new()
            .unique(["id"])
            .foreign(ForeignKey::new(["parent"], "Tree", ["id"]));
        attach(&Catalog::new(), &mut tree, &constraints).unwrap();
        assert!(tree.references("Tree"));
    }

    #[test]
    fn test_checks() {
        let mut schema = child(AttrType::number());
        let catalog = Catalog::new();
        attach(&catalog, &mut schema, &Constraints::new().check("ref > 0")).unwrap();
        assert_eq!(schema.checks, vec!["ref > 0".to_string()]);

        let unknown = Constraints::new().check("other > 0");
        assert!(matches!(attach(&catalog, &mut schema, &unknown), Err(RuntimeError::NoSuchAttr(_))));
        let malformed = Constraints::new().check("ref >");
        assert!(matches!(attach(&catalog, &mut schema, &malformed), Err(RuntimeError::Query(_))));
    }
}
