//! Expression language of the reference engine
//!
//! Queries are `RelVar [where expr]`; orderings are `expr [asc|desc]`.
//! Expressions use `== != < > <= >= && || ! + - * / %`, parentheses,
//! string and number literals, `true`/`false`, attribute names and
//! positional parameters (`$` for the next one, `$N` for the N-th).

pub mod ast;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{BinaryOperator, Expr, Ordering, QueryExpr, UnaryOperator};
pub use evaluator::{check_attrs, check_params, Evaluator};
pub use lexer::Lexer;
pub use parser::{parse_expr, parse_ordering, parse_query, Parser};
pub use token::{Token, TokenType};
