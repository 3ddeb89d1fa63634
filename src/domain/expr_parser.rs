//! Expression parser.
//!
//! Recursive descent over the token stream. One grammar, two entry points:
//! [`parse_condition`] demands a boolean-producing tree, [`parse_expression`]
//! a numeric one.
//!
//! Precedence, lowest first:
//!
//! ```text
//! or  →  and  →  comparison  →  + -  →  * /  →  unary -  →  primary
//! ```
//!
//! Comparisons take arithmetic operands and do not chain. Operand kinds are
//! checked while the tree is built, so `close and 1` or `(a > b) * 2` are
//! rejected here rather than at evaluation time.
//!
//! Parentheses and unary minus may nest at most [`MAX_NESTING_DEPTH`] deep,
//! and an expression may hold at most [`MAX_TOKENS`] tokens. Both bound the
//! depth of the tree that evaluation later recurses over.

use crate::domain::error::{ExpressionError, ParseError};
use crate::domain::expr::{ArithmeticOp, Expr, LogicalOp, VariablePath};
use crate::domain::token::{tokenize, Token, TokenKind};

pub const MAX_NESTING_DEPTH: usize = 64;
pub const MAX_TOKENS: usize = 4096;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    end: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], input_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end: input_len,
            depth: 0,
        }
    }

    /// Run `inner` one nesting level down.
    fn nested(
        &mut self,
        position: usize,
        inner: impl FnOnce(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                format!("expression nested more than {MAX_NESTING_DEPTH} levels deep"),
                position,
            ));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// Source offset of the next token, or the end of input.
    fn position(&self) -> usize {
        self.peek().map(|t| t.position).unwrap_or(self.end)
    }

    fn found(&self) -> String {
        self.peek()
            .map(|t| format!("'{}'", t.text))
            .unwrap_or_else(|| "end of expression".to_string())
    }

    fn require_numeric(expr: &Expr, position: usize) -> Result<(), ParseError> {
        if expr.is_boolean() {
            return Err(ParseError::new(
                "expected a numeric operand, found a boolean expression",
                position,
            ));
        }
        Ok(())
    }

    fn require_boolean(expr: &Expr, position: usize) -> Result<(), ParseError> {
        if !expr.is_boolean() {
            return Err(ParseError::new(
                "numeric expression must be part of a comparison",
                position,
            ));
        }
        Ok(())
    }

    fn parse_logical(
        &mut self,
        op: LogicalOp,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let left_pos = self.position();
        let mut left = next(self)?;

        while matches!(self.peek(), Some(Token { kind: TokenKind::Logical(o), .. }) if *o == op) {
            self.advance();
            let right_pos = self.position();
            let right = next(self)?;
            Self::require_boolean(&left, left_pos)?;
            Self::require_boolean(&right, right_pos)?;
            left = Expr::logical(op, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical(LogicalOp::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical(LogicalOp::And, Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left_pos = self.position();
        let left = self.parse_additive()?;

        let Some(Token {
            kind: TokenKind::Comparison(op),
            ..
        }) = self.peek()
        else {
            return Ok(left);
        };
        let op = *op;
        self.advance();

        let right_pos = self.position();
        let right = self.parse_additive()?;
        Self::require_numeric(&left, left_pos)?;
        Self::require_numeric(&right, right_pos)?;
        Ok(Expr::comparison(op, left, right))
    }

    fn parse_binary_arithmetic(
        &mut self,
        ops: [ArithmeticOp; 2],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let left_pos = self.position();
        let mut left = next(self)?;

        while let Some(Token {
            kind: TokenKind::Arithmetic(op),
            ..
        }) = self.peek()
        {
            if !ops.contains(op) {
                break;
            }
            let op = *op;
            self.advance();
            let right_pos = self.position();
            let right = next(self)?;
            Self::require_numeric(&left, left_pos)?;
            Self::require_numeric(&right, right_pos)?;
            left = Expr::arithmetic(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_arithmetic(
            [ArithmeticOp::Add, ArithmeticOp::Subtract],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_arithmetic(
            [ArithmeticOp::Multiply, ArithmeticOp::Divide],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if matches!(
            self.peek(),
            Some(Token {
                kind: TokenKind::Arithmetic(ArithmeticOp::Subtract),
                ..
            })
        ) {
            let minus_pos = self.position();
            self.advance();
            let operand_pos = self.position();
            let operand = self.nested(minus_pos, Self::parse_unary)?;
            Self::require_numeric(&operand, operand_pos)?;
            return Ok(match operand {
                Expr::Literal(v) => Expr::Literal(-v),
                other => Expr::arithmetic(ArithmeticOp::Subtract, Expr::Literal(0.0), other),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(ParseError::new(
                "unexpected end of expression",
                position,
            ));
        };

        match &token.kind {
            TokenKind::LParen => {
                let inner = self.nested(position, Self::parse_or)?;
                match self.peek() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => {
                        self.advance();
                        Ok(inner)
                    }
                    _ => Err(ParseError::new(
                        format!(
                            "missing closing parenthesis for '(' at position {}, found {}",
                            token.position,
                            self.found()
                        ),
                        self.position(),
                    )),
                }
            }
            TokenKind::Number(value) => Ok(Expr::Literal(*value)),
            TokenKind::Identifier => VariablePath::parse(&token.text)
                .map(Expr::Variable)
                .ok_or_else(|| {
                    ParseError::new(format!("invalid variable '{}'", token.text), position)
                }),
            _ => Err(ParseError::new(
                format!("unexpected token '{}'", token.text),
                position,
            )),
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("empty expression", 0));
        }
        let expr = self.parse_or()?;
        if self.pos < self.tokens.len() {
            return Err(ParseError::new(
                format!("unexpected token {} after expression", self.found()),
                self.position(),
            ));
        }
        Ok(expr)
    }
}

fn parse_tree(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if let Some(token) = tokens.get(MAX_TOKENS) {
        return Err(ParseError::new(
            format!("expression longer than {MAX_TOKENS} tokens"),
            token.position,
        )
        .into());
    }
    let mut parser = Parser::new(&tokens, input.len());
    Ok(parser.parse()?)
}

/// Parse a boolean condition such as `close > sma * 1.02 and volume > 0`.
pub fn parse_condition(input: &str) -> Result<Expr, ExpressionError> {
    let expr = parse_tree(input)?;
    if !expr.is_boolean() {
        return Err(ParseError::new(
            "expected a comparison or logical expression",
            leading_offset(input),
        )
        .into());
    }
    Ok(expr)
}

/// Parse a numeric expression such as `close * 0.98`.
pub fn parse_expression(input: &str) -> Result<Expr, ExpressionError> {
    let expr = parse_tree(input)?;
    if expr.is_boolean() {
        return Err(ParseError::new(
            "expected a numeric expression, found a condition",
            leading_offset(input),
        )
        .into());
    }
    Ok(expr)
}

fn leading_offset(input: &str) -> usize {
    input.len() - input.trim_start().len()
}
