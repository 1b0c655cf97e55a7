/// Abstract syntax tree for queries, orderings and row expressions
use crate::types::Value;
use std::fmt;

/// `RelVar [where expr]`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpr {
    pub rel_var: String,
    pub filter: Option<Expr>,
}

/// `expr [asc|desc]`
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),

    /// Attribute of the current row
    Attr(String),

    /// 1-based positional parameter
    Param(usize),

    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },

    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Visit every attribute reference
    pub fn attrs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Attr(name) => out.push(name),
            Expr::UnaryOp { expr, .. } => expr.attrs(out),
            Expr::BinaryOp { left, right, .. } => {
                left.attrs(out);
                right.attrs(out);
            }
            Expr::Literal(_) | Expr::Param(_) => {}
        }
    }

    /// Highest parameter index used, 0 if none
    pub fn max_param(&self) -> usize {
        match self {
            Expr::Param(n) => *n,
            Expr::UnaryOp { expr, .. } => expr.max_param(),
            Expr::BinaryOp { left, right, .. } => left.max_param().max(right.max_param()),
            Expr::Literal(_) | Expr::Attr(_) => 0,
        }
    }

    /// Renumber parameters so they follow `offset` earlier ones
    pub fn shift_params(&mut self, offset: usize) {
        match self {
            Expr::Param(n) => *n += offset,
            Expr::UnaryOp { expr, .. } => expr.shift_params(offset),
            Expr::BinaryOp { left, right, .. } => {
                left.shift_params(offset);
                right.shift_params(offset);
            }
            Expr::Literal(_) | Expr::Attr(_) => {}
        }
    }
}

/// Renders parseable, fully parenthesized source
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Attr(name) => f.write_str(name),
            Expr::Param(n) => write!(f, "${}", n),
            Expr::UnaryOp { op, expr } => write!(f, "{}({})", op.symbol(), expr),
            Expr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical
    And,
    Or,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
        }
    }
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
        }
    }

    /// Get operator precedence (higher = tighter binding)
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq | BinaryOperator::Ne => 3,
            BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::Le | BinaryOperator::Ge => 4,
            BinaryOperator::Add | BinaryOperator::Sub => 5,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 6,
        }
    }
}
