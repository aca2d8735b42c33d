// This module defines the syntax tree the compiler consumes. The host language's parser
// is an external collaborator: it hands over one FunctionDef per dialect function, with
// every statement and expression tagged by a Span (line relative to the definition,
// 0-based column). Statement and expression kinds form closed enums so that the code
// generator and the reference interpreter dispatch through exhaustive matches. Host
// constructs the dialect does not implement (print statements, attribute access, ...)
// are carried as Unsupported nodes rather than dropped, so the compiler can report them
// at their source position. The build submodule offers constructor helpers used by
// tests and the demo binary in place of a real parser.

//! Dialect syntax tree.
//!
//! The tree mirrors the shape of the host language's parser output, restricted
//! to what a dialect function can contain.

use std::fmt;

pub mod build;

/// Source position of a syntax node.
///
/// `line` is 1-based and relative to the first line of the function
/// definition; `col` is a 0-based character offset. A zero line means the
/// position is unknown (e.g. nodes assembled by hand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const UNKNOWN: Span = Span { line: 0, col: 0 };

    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}", self.line, self.col + 1)
        } else {
            write!(f, "<unknown>")
        }
    }
}

/// Raw source of a function definition, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// File the definition came from.
    pub file: String,
    /// Absolute line number of the definition's first line in `file`.
    pub first_line: u32,
    /// The definition's lines, starting with the `def` line.
    pub text: String,
}

/// One dialect function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
    pub source: Option<SourceText>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, params: Vec<Param>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params,
            body,
            span: Span::new(1, 0),
            source: None,
        }
    }

    /// Attach the definition's source text for richer diagnostics.
    pub fn with_source(mut self, file: impl Into<String>, first_line: u32, text: impl Into<String>) -> Self {
        self.source = Some(SourceText {
            file: file.into(),
            first_line,
            text: text.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: Span::UNKNOWN }
    }

    /// Place the statement at `line`/`col`.
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { target: Expr, value: Expr },
    AugAssign { target: Expr, op: BinOp, value: Expr },
    /// Expression evaluated for its effect (calls, `var(...)`).
    Expr(Expr),
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    For { target: String, target_span: Span, iter: Expr, body: Vec<Stmt> },
    While { test: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
    Pass,
    /// A host statement the dialect has no translation for.
    Unsupported { construct: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, span: Span::UNKNOWN }
    }

    /// Place the expression at `line`/`col`.
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }

    /// The identifier, when this expression is a bare name.
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Literal),
    Name(String),
    BinOp { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    Compare { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    BoolOp { op: BoolOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { func: Box<Expr>, args: Vec<Expr>, keywords: Vec<Keyword> },
    Subscript { value: Box<Expr>, index: Box<Index> },
    /// A host expression the dialect has no translation for.
    Unsupported { construct: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Single(Expr),
    Slice { lower: Option<Expr>, upper: Option<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    Invert,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "not",
            UnaryOp::Invert => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        assert_eq!(Span::new(3, 4).to_string(), "3:5");
        assert_eq!(Span::UNKNOWN.to_string(), "<unknown>");
        assert!(!Span::default().is_known());
    }

    #[test]
    fn test_positioning() {
        let stmt = Stmt::new(StmtKind::Pass).at(2, 4);
        assert_eq!(stmt.span, Span::new(2, 4));

        let expr = Expr::new(ExprKind::Name("x".into())).at(1, 7);
        assert_eq!(expr.as_name(), Some("x"));
        assert_eq!(expr.span.col, 7);
    }
}
