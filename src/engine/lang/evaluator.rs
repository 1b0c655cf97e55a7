/// Expression evaluator - evaluates expressions against rows
use super::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{Result, RuntimeError};
use crate::types::{RelVarSchema, Tuple, Value};
use std::cmp::Ordering;

/// Reject references to attributes the relvar does not have
pub fn check_attrs(expr: &Expr, schema: &RelVarSchema) -> Result<()> {
    let mut attrs = Vec::new();
    expr.attrs(&mut attrs);
    for attr in attrs {
        schema.attr(attr)?;
    }
    Ok(())
}

/// Reject parameter references beyond the bound list
pub fn check_params(expr: &Expr, bound: usize) -> Result<()> {
    let max = expr.max_param();
    if max > bound {
        return Err(RuntimeError::Query(format!(
            "Parameter ${} is not bound ({} given)",
            max, bound
        )));
    }
    Ok(())
}

pub struct Evaluator<'a> {
    params: &'a [Value],
}

impl<'a> Evaluator<'a> {
    pub fn new(params: &'a [Value]) -> Self {
        Self { params }
    }

    pub fn eval(&self, expr: &Expr, row: &Tuple) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Attr(name) => row
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::NoSuchAttr(name.clone())),
            Expr::Param(index) => self
                .params
                .get(index - 1)
                .cloned()
                .ok_or_else(|| RuntimeError::Query(format!("Parameter ${} is not bound", index))),
            Expr::UnaryOp { op, expr } => {
                let value = self.eval(expr, row)?;
                match op {
                    UnaryOperator::Not => Ok(Value::Boolean(!value.truthy())),
                    UnaryOperator::Minus => Ok(Value::Number(-number(&value, "-")?)),
                    UnaryOperator::Plus => Ok(Value::Number(number(&value, "+")?)),
                }
            }
            Expr::BinaryOp { left, op, right } => match op {
                // Short-circuit
                BinaryOperator::And => {
                    let left = self.eval(left, row)?;
                    if !left.truthy() {
                        return Ok(Value::Boolean(false));
                    }
                    Ok(Value::Boolean(self.eval(right, row)?.truthy()))
                }
                BinaryOperator::Or => {
                    let left = self.eval(left, row)?;
                    if left.truthy() {
                        return Ok(Value::Boolean(true));
                    }
                    Ok(Value::Boolean(self.eval(right, row)?.truthy()))
                }
                _ => {
                    let left = self.eval(left, row)?;
                    let right = self.eval(right, row)?;
                    binary(*op, &left, &right)
                }
            },
        }
    }

    /// Evaluate a filter; only truthy results select the row
    pub fn matches(&self, expr: &Expr, row: &Tuple) -> Result<bool> {
        Ok(self.eval(expr, row)?.truthy())
    }
}

fn number(value: &Value, op: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        RuntimeError::Type(format!("Operator {} expects a number, got {}", op, value.base_type()))
    })
}

/// Equality within one type; values of different types are never equal
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => left.base_type() == right.base_type() && left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(a.partial_cmp(b)),
        (Value::String(_), Value::String(_))
        | (Value::Boolean(_), Value::Boolean(_))
        | (Value::Date(_), Value::Date(_))
        | (Value::Binary(_), Value::Binary(_)) => Ok(Some(left.total_cmp(right))),
        _ => Err(RuntimeError::Type(format!(
            "Cannot compare {} with {}",
            left.base_type(),
            right.base_type()
        ))),
    }
}

fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    let result = match op {
        BinaryOperator::Eq => Value::Boolean(equals(left, right)),
        BinaryOperator::Ne => Value::Boolean(!equals(left, right)),
        BinaryOperator::Lt => Value::Boolean(compare(left, right)? == Some(Ordering::Less)),
        BinaryOperator::Gt => Value::Boolean(compare(left, right)? == Some(Ordering::Greater)),
        BinaryOperator::Le => Value::Boolean(matches!(
            compare(left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::Ge => Value::Boolean(matches!(
            compare(left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOperator::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{}{}", left, right)),
            _ => {
                return Err(RuntimeError::Type(format!(
                    "Cannot add {} and {}",
                    left.base_type(),
                    right.base_type()
                )))
            }
        },
        BinaryOperator::Sub => Value::Number(number(left, "-")? - number(right, "-")?),
        BinaryOperator::Mul => Value::Number(number(left, "*")? * number(right, "*")?),
        BinaryOperator::Div => Value::Number(number(left, "/")? / number(right, "/")?),
        BinaryOperator::Mod => Value::Number(number(left, "%")? % number(right, "%")?),
        BinaryOperator::And => Value::Boolean(left.truthy() && right.truthy()),
        BinaryOperator::Or => Value::Boolean(left.truthy() || right.truthy()),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lang::parse_expr;

    fn eval(text: &str, params: &[Value]) -> Result<Value> {
        let row: Tuple = [("a", Value::from(2)), ("s", Value::from("x"))].into_iter().collect();
        Evaluator::new(params).eval(&parse_expr(text)?, &row)
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(eval("a * 3 + 1", &[]).unwrap(), Value::from(7));
        assert_eq!(eval("a % 2 == 0", &[]).unwrap(), Value::Boolean(true));
        assert_eq!(eval("-a < 0 && !false", &[]).unwrap(), Value::Boolean(true));
        assert_eq!(eval("s + a", &[]).unwrap(), Value::from("x2"));
        assert_eq!(eval("1 / 0", &[]).unwrap(), Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_params() {
        assert_eq!(eval("a == $", &[Value::from(2)]).unwrap(), Value::Boolean(true));
        assert_eq!(eval("$2 + $1", &[Value::from(1), Value::from(10)]).unwrap(), Value::from(11));
        assert!(matches!(eval("a == $", &[]), Err(RuntimeError::Query(_))));
    }

    #[test]
    fn test_nan_semantics() {
        let nan = [Value::Number(f64::NAN)];
        assert_eq!(eval("$ == $1", &nan).unwrap(), Value::Boolean(false));
        assert_eq!(eval("$ < 1", &nan).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(eval("s < 1", &[]), Err(RuntimeError::Type(_))));
        assert!(matches!(eval("s - 1", &[]), Err(RuntimeError::Type(_))));
        // Mixed equality is false, not an error
        assert_eq!(eval("s == 1", &[]).unwrap(), Value::Boolean(false));
        // Short-circuit skips the bad branch
        assert_eq!(eval("false && s < 1", &[]).unwrap(), Value::Boolean(false));
    }
}
