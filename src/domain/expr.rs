//! Expression AST.
//!
//! - `Expr`: the tree produced by the parser, evaluated by `expr_eval`
//! - `VariablePath`: a dotted/indexed reference such as `indicators.sma` or `datas[1].close`
//! - Operator enums shared with the tokenizer
//!
//! Trees are immutable once built and are owned by the condition or action
//! that parsed them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ComparisonOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Greater => ">",
            ComparisonOp::Less => "<",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
        }
    }
}

impl LogicalOp {
    pub fn keyword(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

impl ArithmeticOp {
    pub fn symbol(self) -> char {
        match self {
            ArithmeticOp::Add => '+',
            ArithmeticOp::Subtract => '-',
            ArithmeticOp::Multiply => '*',
            ArithmeticOp::Divide => '/',
        }
    }

    pub fn from_symbol(ch: char) -> Option<Self> {
        match ch {
            '+' => Some(ArithmeticOp::Add),
            '-' => Some(ArithmeticOp::Subtract),
            '*' => Some(ArithmeticOp::Multiply),
            '/' => Some(ArithmeticOp::Divide),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Name(String),
    Index(usize),
}

/// A variable reference split into segments. `raw` keeps the source spelling
/// for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePath {
    pub raw: String,
    pub segments: Vec<PathSegment>,
}

impl VariablePath {
    /// Split an identifier token such as `datas[0].close` into segments.
    ///
    /// The tokenizer guarantees brackets only ever wrap decimal digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        let mut name = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    if !name.is_empty() {
                        segments.push(PathSegment::Name(std::mem::take(&mut name)));
                    }
                }
                '[' => {
                    if !name.is_empty() {
                        segments.push(PathSegment::Name(std::mem::take(&mut name)));
                    }
                    let mut digits = String::new();
                    for d in chars.by_ref() {
                        if d == ']' {
                            break;
                        }
                        digits.push(d);
                    }
                    segments.push(PathSegment::Index(digits.parse().ok()?));
                }
                _ => name.push(ch),
            }
        }
        if !name.is_empty() {
            segments.push(PathSegment::Name(name));
        }

        if segments.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn first_name(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Name(n)) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Variable(VariablePath),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn variable(raw: &str) -> Option<Self> {
        VariablePath::parse(raw).map(Expr::Variable)
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> Self {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn comparison(op: ComparisonOp, left: Expr, right: Expr) -> Self {
        Expr::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// True for nodes that produce a boolean (comparison and logical).
    pub fn is_boolean(&self) -> bool {
        matches!(self, Expr::Comparison { .. } | Expr::Logical { .. })
    }

    /// Every variable referenced by this tree, left to right.
    pub fn variables(&self) -> Vec<&VariablePath> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    /// Names read from the `indicators` namespace, first use first.
    pub fn indicator_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for path in self.variables() {
            if path.first_name() != Some("indicators") {
                continue;
            }
            if let Some(PathSegment::Name(name)) = path.segments.get(1)
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a VariablePath>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Variable(path) => out.push(path),
            Expr::Arithmetic { left, right, .. }
            | Expr::Comparison { left, right, .. }
            | Expr::Logical { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
        }
    }
}

/// Fully parenthesised rendering, so precedence is visible.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Variable(path) => write!(f, "{path}"),
            Expr::Arithmetic { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expr::Comparison { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expr::Logical { op, left, right } => {
                write!(f, "({left} {} {right})", op.keyword())
            }
        }
    }
}
