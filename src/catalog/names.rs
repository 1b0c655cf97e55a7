//! Identifier and size rules for relvar and attribute names

use crate::config::QuotaConfig;
use crate::error::{Result, RuntimeError};
use crate::types::Header;

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn check_name(kind: &str, name: &str, quotas: &QuotaConfig) -> Result<()> {
    if !is_identifier(name) {
        return Err(RuntimeError::Value(format!("Invalid {} name \"{}\"", kind, name)));
    }
    if name.len() > quotas.max_name_len {
        return Err(RuntimeError::Quota(format!(
            "{} name \"{}\" is longer than {} characters",
            kind, name, quotas.max_name_len
        )));
    }
    Ok(())
}

pub fn check_rel_var_name(name: &str, quotas: &QuotaConfig) -> Result<()> {
    check_name("relation variable", name, quotas)
}

pub fn check_attr_name(name: &str, quotas: &QuotaConfig) -> Result<()> {
    check_name("attribute", name, quotas)
}

/// Attribute names and count of a header
pub fn check_header(header: &Header, quotas: &QuotaConfig) -> Result<()> {
    for name in header.keys() {
        check_attr_name(name, quotas)?;
    }
    check_attr_count(header.len(), quotas)
}

pub fn check_attr_count(count: usize, quotas: &QuotaConfig) -> Result<()> {
    if count > quotas.max_attrs {
        return Err(RuntimeError::Quota(format!(
            "{} attributes exceed the limit of {}",
            count, quotas.max_attrs
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttrType;

    #[test]
    fn test_identifier_grammar() {
        for name in ["User", "_x", "a1_b", "Z"] {
            assert!(is_identifier(name), "{}", name);
        }
        for name in ["", "1a", "a-b", "$x", "a b", "ümlaut"] {
            assert!(!is_identifier(name), "{}", name);
        }
    }

    #[test]
    fn test_name_errors() {
        let quotas = QuotaConfig::default();
        assert!(check_rel_var_name(&"a".repeat(60), &quotas).is_ok());
        assert!(matches!(check_rel_var_name(&"a".repeat(61), &quotas), Err(RuntimeError::Quota(_))));
        assert!(matches!(check_rel_var_name("9lives", &quotas), Err(RuntimeError::Value(_))));
        assert!(matches!(check_attr_name("-x", &quotas), Err(RuntimeError::Value(_))));
    }

    #[test]
    fn test_header_quota() {
        let quotas = QuotaConfig::small();
        let header: Header = (0..=quotas.max_attrs)
            .map(|i| (format!("a{}", i), AttrType::number()))
            .collect();
        assert!(matches!(check_header(&header, &quotas), Err(RuntimeError::Quota(_))));
    }
}
