//! # Lexer
//!
//! Tokenizes rendered rule source. Tracks line and column for error
//! reporting. Negative numeric literals lex as a single token since the
//! grammar has no binary minus.

use super::errors::{EngineError, EngineResult};

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Dot,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Eof,
}

/// A token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer {
    input: Vec<char>,
    cursor: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            input: source.chars().collect(),
            cursor: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> EngineResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_insignificant();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                ',' => self.single(TokenKind::Comma),
                ';' => self.single(TokenKind::Semicolon),
                '.' => self.single(TokenKind::Dot),
                '"' => self.lex_string()?,
                '&' => self.pair('&', TokenKind::AndAnd)?,
                '|' => self.pair('|', TokenKind::OrOr)?,
                '=' => self.pair('=', TokenKind::EqEq)?,
                '!' => self.with_eq(TokenKind::Bang, TokenKind::NotEq),
                '>' => self.with_eq(TokenKind::Gt, TokenKind::Gte),
                '<' => self.with_eq(TokenKind::Lt, TokenKind::Lte),
                '-' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.lex_number()?
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                other => {
                    return Err(EngineError::syntax(
                        line,
                        column,
                        format!("unexpected character '{}'", other),
                    ))
                }
            };
            tokens.push(Token { kind, line, column });
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.cursor).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.cursor + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_insignificant(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            break;
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn pair(&mut self, second: char, kind: TokenKind) -> EngineResult<TokenKind> {
        let (line, column) = (self.line, self.column);
        let first = self.bump();
        if self.peek() != Some(second) {
            return Err(EngineError::syntax(
                line,
                column,
                format!("expected '{}{}'", first.unwrap_or(second), second),
            ));
        }
        self.bump();
        Ok(kind)
    }

    fn with_eq(&mut self, alone: TokenKind, with_eq: TokenKind) -> TokenKind {
        self.bump();
        if self.peek() == Some('=') {
            self.bump();
            with_eq
        } else {
            alone
        }
    }

    fn lex_string(&mut self) -> EngineResult<TokenKind> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut parsed = String::new();
        loop {
            match self.bump() {
                None => return Err(EngineError::syntax(line, column, "unterminated string")),
                Some('"') => return Ok(TokenKind::Str(parsed)),
                Some('\\') => {
                    let translated = match self.bump() {
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        _ => {
                            return Err(EngineError::syntax(
                                self.line,
                                self.column,
                                "invalid escape sequence",
                            ))
                        }
                    };
                    parsed.push(translated);
                }
                Some(c) => parsed.push(c),
            }
        }
    }

    fn lex_number(&mut self) -> EngineResult<TokenKind> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                text.push(c);
            } else if (c == 'e' || c == 'E') && !text.contains(['e', 'E']) {
                is_float = true;
                text.push(c);
                if let Some(sign @ ('+' | '-')) = self.peek_at(1) {
                    self.bump();
                    text.push(sign);
                }
            } else {
                break;
            }
            self.bump();
        }

        let invalid = || EngineError::syntax(line, column, format!("invalid number '{}'", text));
        if is_float {
            text.parse::<f64>().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| invalid())
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Ident(ident)
    }
}
