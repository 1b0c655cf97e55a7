/// Query parser - converts tokens into AST
use super::ast::*;
use super::lexer::Lexer;
use super::token::{Token, TokenType};
use crate::error::{Result, RuntimeError};
use crate::types::Value;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    /// Index handed to the next bare `$`
    next_param: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            next_param: 1,
        }
    }

    fn from_text(text: &str) -> Result<Self> {
        Ok(Self::new(Lexer::new(text).tokenize()?))
    }

    /// Parse `RelVar [where expr]`
    pub fn parse_query(&mut self) -> Result<QueryExpr> {
        let rel_var = self.parse_identifier()?;
        let filter = if self.match_token(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        self.expect_eof()?;
        Ok(QueryExpr { rel_var, filter })
    }

    /// Parse `expr [asc|desc]`
    pub fn parse_ordering(&mut self) -> Result<Ordering> {
        let expr = self.parse_expr(0)?;
        let descending = if self.match_token(TokenType::Desc) {
            true
        } else {
            self.match_token(TokenType::Asc);
            false
        };
        self.expect_eof()?;
        Ok(Ordering { expr, descending })
    }

    /// Parse a standalone expression
    pub fn parse_standalone(&mut self) -> Result<Expr> {
        let expr = self.parse_expr(0)?;
        self.expect_eof()?;
        Ok(expr)
    }

    /// Pratt parsing over [`BinaryOperator::precedence`]
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_prefix_expr()?;

        while let Some(op) = self.try_parse_binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }

            self.advance();
            let right = self.parse_expr(precedence + 1)?;

            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        let token_type = self.current().token_type.clone();
        match token_type {
            TokenType::Not | TokenType::Minus | TokenType::Plus => {
                self.advance();
                let op = match token_type {
                    TokenType::Not => UnaryOperator::Not,
                    TokenType::Minus => UnaryOperator::Minus,
                    _ => UnaryOperator::Plus,
                };
                let expr = self.parse_expr(10)?;
                Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(expr),
                })
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expr(0)?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }
            TokenType::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Number(n)))
            }
            TokenType::String(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal(Value::Boolean(true)))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal(Value::Boolean(false)))
            }
            TokenType::Identifier(name) => {
                self.advance();
                Ok(Expr::Attr(name))
            }
            TokenType::Param(index) => {
                self.advance();
                let index = index.unwrap_or_else(|| {
                    let n = self.next_param;
                    self.next_param += 1;
                    n
                });
                Ok(Expr::Param(index))
            }
            _ => Err(self.error("Expected expression")),
        }
    }

    fn try_parse_binary_op(&self) -> Option<BinaryOperator> {
        match &self.current().token_type {
            TokenType::Eq => Some(BinaryOperator::Eq),
            TokenType::Ne => Some(BinaryOperator::Ne),
            TokenType::Lt => Some(BinaryOperator::Lt),
            TokenType::Gt => Some(BinaryOperator::Gt),
            TokenType::Le => Some(BinaryOperator::Le),
            TokenType::Ge => Some(BinaryOperator::Ge),
            TokenType::And => Some(BinaryOperator::And),
            TokenType::Or => Some(BinaryOperator::Or),
            TokenType::Plus => Some(BinaryOperator::Add),
            TokenType::Minus => Some(BinaryOperator::Sub),
            TokenType::Star => Some(BinaryOperator::Mul),
            TokenType::Slash => Some(BinaryOperator::Div),
            TokenType::Percent => Some(BinaryOperator::Mod),
            _ => None,
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        if let TokenType::Identifier(name) = &self.current().token_type {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("Expected relation variable name"))
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if std::mem::discriminant(&self.current().token_type) == std::mem::discriminant(&token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType) -> Result<()> {
        if self.match_token(token_type.clone()) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {:?}", token_type)))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if matches!(self.current().token_type, TokenType::Eof) {
            Ok(())
        } else {
            Err(self.error("Unexpected trailing input"))
        }
    }

    fn error(&self, msg: &str) -> RuntimeError {
        RuntimeError::Query(format!("{} at column {}", msg, self.current().column))
    }
}

pub fn parse_query(text: &str) -> Result<QueryExpr> {
    Parser::from_text(text)?.parse_query()
}

pub fn parse_ordering(text: &str) -> Result<Ordering> {
    Parser::from_text(text)?.parse_ordering()
}

pub fn parse_expr(text: &str) -> Result<Expr> {
    Parser::from_text(text)?.parse_standalone()
}
