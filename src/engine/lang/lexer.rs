/// Query lexer - converts query text into tokens
use super::token::{Token, TokenType};
use crate::error::{Result, RuntimeError};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let column = self.position + 1;
        if self.is_eof() {
            return Ok(Token::new(TokenType::Eof, column));
        }

        let ch = self.current_char();
        let token_type = match ch {
            '\'' | '"' => self.read_string(ch)?,
            '0'..='9' => self.read_number()?,
            '.' if self.peek_char().map_or(false, |c| c.is_ascii_digit()) => self.read_number()?,
            'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),
            '$' => self.read_param()?,
            '=' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Eq
                } else {
                    return Err(error(format!("Unexpected '=' at column {}; use '=='", column)));
                }
            }
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ne
                } else {
                    TokenType::Not
                }
            }
            '&' | '|' => {
                self.advance();
                if self.current_char() != ch {
                    return Err(error(format!("Unexpected '{}' at column {}", ch, column)));
                }
                self.advance();
                if ch == '&' {
                    TokenType::And
                } else {
                    TokenType::Or
                }
            }
            '<' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Le
                } else {
                    TokenType::Lt
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ge
                } else {
                    TokenType::Gt
                }
            }
            '+' => self.single(TokenType::Plus),
            '-' => self.single(TokenType::Minus),
            '*' => self.single(TokenType::Star),
            '/' => self.single(TokenType::Slash),
            '%' => self.single(TokenType::Percent),
            '(' => self.single(TokenType::LParen),
            ')' => self.single(TokenType::RParen),
            _ => {
                return Err(error(format!("Unexpected character '{}' at column {}", ch, column)));
            }
        };

        Ok(Token::new(token_type, column))
    }

    fn single(&mut self, token_type: TokenType) -> TokenType {
        self.advance();
        token_type
    }

    fn current_char(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.position += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn read_string(&mut self, quote: char) -> Result<TokenType> {
        self.advance(); // opening quote
        let mut value = String::new();

        while !self.is_eof() && self.current_char() != quote {
            if self.current_char() == '\\' {
                self.advance();
                if self.is_eof() {
                    return Err(error("Unterminated string".to_string()));
                }
                let escaped = match self.current_char() {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    c => c,
                };
                value.push(escaped);
            } else {
                value.push(self.current_char());
            }
            self.advance();
        }

        if self.is_eof() {
            return Err(error("Unterminated string".to_string()));
        }

        self.advance(); // closing quote
        Ok(TokenType::String(value))
    }

    fn read_number(&mut self) -> Result<TokenType> {
        let mut value = String::new();

        while !self.is_eof() && (self.current_char().is_ascii_digit() || self.current_char() == '.') {
            value.push(self.current_char());
            self.advance();
        }

        if !self.is_eof() && (self.current_char() == 'e' || self.current_char() == 'E') {
            value.push(self.current_char());
            self.advance();
            if !self.is_eof() && (self.current_char() == '+' || self.current_char() == '-') {
                value.push(self.current_char());
                self.advance();
            }
            while !self.is_eof() && self.current_char().is_ascii_digit() {
                value.push(self.current_char());
                self.advance();
            }
        }

        value
            .parse::<f64>()
            .map(TokenType::Number)
            .map_err(|_| error(format!("Invalid number: {}", value)))
    }

    fn read_identifier(&mut self) -> TokenType {
        let mut value = String::new();

        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenType::from_keyword(&value).unwrap_or(TokenType::Identifier(value))
    }

    fn read_param(&mut self) -> Result<TokenType> {
        self.advance(); // '$'
        let mut digits = String::new();
        while !self.is_eof() && self.current_char().is_ascii_digit() {
            digits.push(self.current_char());
            self.advance();
        }
        if digits.is_empty() {
            return Ok(TokenType::Param(None));
        }
        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(TokenType::Param(Some(n))),
            _ => Err(error(format!("Invalid parameter ${}", digits))),
        }
    }
}

fn error(message: String) -> RuntimeError {
    RuntimeError::Query(message)
}
