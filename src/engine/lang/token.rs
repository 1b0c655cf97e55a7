/// Token types for the query lexer

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Where,
    Asc,
    Desc,
    And,
    Or,
    Not,
    True,
    False,

    // Operators
    Eq,      // ==
    Ne,      // !=
    Lt,      // <
    Gt,      // >
    Le,      // <=
    Ge,      // >=
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    // Delimiters
    LParen,
    RParen,

    // Literals
    Number(f64),
    String(String),
    Identifier(String),
    /// `$` (next positional) or `$N` (1-based)
    Param(Option<usize>),

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, column: usize) -> Self {
        Self { token_type, column }
    }
}

impl TokenType {
    /// Keywords are case-insensitive
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "where" => Some(TokenType::Where),
            "asc" => Some(TokenType::Asc),
            "desc" => Some(TokenType::Desc),
            "and" => Some(TokenType::And),
            "or" => Some(TokenType::Or),
            "not" => Some(TokenType::Not),
            "true" => Some(TokenType::True),
            "false" => Some(TokenType::False),
            _ => None,
        }
    }
}
