//! Expression tokenizer.
//!
//! Turns an expression string into an ordered token sequence. Whitespace is
//! insignificant; any character outside the grammar is a [`TokenError`]
//! carrying its offset.

use crate::domain::error::TokenError;
use crate::domain::expr::{ArithmeticOp, ComparisonOp, LogicalOp};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    Arithmetic(ArithmeticOp),
    Identifier,
    Number(f64),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn error_here(&self) -> TokenError {
        TokenError {
            character: self.peek().unwrap_or('\0'),
            position: self.pos,
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            text: self.input[start..self.pos].to_string(),
            position: start,
        }
    }

    fn comparison(&mut self, start: usize) -> Result<Token, TokenError> {
        let first = self.advance().unwrap_or('\0');
        let followed_by_eq = self.peek() == Some('=');
        let op = match (first, followed_by_eq) {
            ('>', true) => ComparisonOp::GreaterEqual,
            ('>', false) => ComparisonOp::Greater,
            ('<', true) => ComparisonOp::LessEqual,
            ('<', false) => ComparisonOp::Less,
            ('=', true) => ComparisonOp::Equal,
            ('!', true) => ComparisonOp::NotEqual,
            _ => {
                return Err(TokenError {
                    character: first,
                    position: start,
                });
            }
        };
        if followed_by_eq {
            self.advance();
        }
        Ok(self.token(TokenKind::Comparison(op), start))
    }

    fn number(&mut self, start: usize) -> Result<Token, TokenError> {
        let mut has_dot = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        let value = text.parse::<f64>().map_err(|_| TokenError {
            character: text.chars().next().unwrap_or('\0'),
            position: start,
        })?;
        Ok(self.token(TokenKind::Number(value), start))
    }

    fn identifier(&mut self, start: usize) -> Result<Token, TokenError> {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else if ch == '.' {
                // A dot must introduce another name segment.
                match self.peek_second() {
                    Some(next) if next.is_ascii_alphabetic() || next == '_' => {
                        self.advance();
                    }
                    _ => break,
                }
            } else if ch == '[' {
                self.index_suffix()?;
            } else {
                break;
            }
        }

        let text = &self.input[start..self.pos];
        let kind = match text {
            "and" => TokenKind::Logical(LogicalOp::And),
            "or" => TokenKind::Logical(LogicalOp::Or),
            _ => TokenKind::Identifier,
        };
        Ok(self.token(kind, start))
    }

    fn index_suffix(&mut self) -> Result<(), TokenError> {
        let open = self.pos;
        self.advance();
        let mut digits = 0;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else {
                break;
            }
        }
        if digits == 0 {
            return Err(self.error_here());
        }
        if self.peek() != Some(']') {
            return Err(TokenError {
                character: '[',
                position: open,
            });
        }
        self.advance();
        Ok(())
    }

    fn next_token(&mut self) -> Option<Result<Token, TokenError>> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let start = self.pos;
        let ch = self.peek()?;

        let result = match ch {
            '(' => {
                self.advance();
                Ok(self.token(TokenKind::LParen, start))
            }
            ')' => {
                self.advance();
                Ok(self.token(TokenKind::RParen, start))
            }
            '>' | '<' | '=' | '!' => self.comparison(start),
            '+' | '-' | '*' | '/' => {
                self.advance();
                let op = ArithmeticOp::from_symbol(ch).unwrap_or(ArithmeticOp::Add);
                Ok(self.token(TokenKind::Arithmetic(op), start))
            }
            c if c.is_ascii_digit() => self.number(start),
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.number(start),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(start),
            _ => Err(self.error_here()),
        };
        Some(result)
    }
}

/// Tokenize an expression string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, TokenError> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token() {
        tokens.push(token?);
    }
    Ok(tokens)
}
