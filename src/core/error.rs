// This module defines the compiler's error taxonomy using the thiserror crate. CompileError
// has one variant per failure kind the code generator can report: redeclared and undefined
// symbols, missing or mismatched returns, impossible casts, bad subscripts, malformed
// var/Vector/Array constructs, backend-rejected signatures, bad calls, operators that are
// not defined for their operand types, and internal errors for constructs without a
// translation. Each variant carries a message and the Span of the syntax node that failed.
// The driver wraps the first failure of a function in CompileError::InFunction, whose
// ErrorContext renders the function name, file, absolute position and the surrounding
// source lines with a caret. ErrorKind lets callers ask why a compilation failed through
// any number of wrapping layers via is_due_to. Backend builder failures convert into
// internal errors and adopt the span of the node being visited. CompileResult<T> is the
// convenience alias used throughout the crate.

//! Error types for the dialect compiler.

use std::fmt;

use thiserror::Error;

use crate::ast::{FunctionDef, Span};

/// Failure categories, independent of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    VariableRedeclaration,
    UndefinedSymbol,
    MissingReturn,
    InvalidReturn,
    InvalidCast,
    InvalidSubscript,
    InvalidUseOfConstruct,
    FunctionDeclaration,
    InvalidCall,
    InvalidOperation,
    Internal,
}

/// Main error type for dialect compilation.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("variable redeclaration: {message}")]
    VariableRedeclaration { message: String, span: Span },

    #[error("undefined symbol: {message}")]
    UndefinedSymbol { message: String, span: Span },

    #[error("missing return: {message}")]
    MissingReturn { message: String, span: Span },

    #[error("invalid return: {message}")]
    InvalidReturn { message: String, span: Span },

    #[error("invalid cast: {message}")]
    InvalidCast { message: String, span: Span },

    #[error("invalid subscript: {message}")]
    InvalidSubscript { message: String, span: Span },

    #[error("invalid use of construct: {message}")]
    InvalidUseOfConstruct { message: String, span: Span },

    #[error("function declaration failed: {message}")]
    FunctionDeclaration { message: String, span: Span },

    #[error("invalid call: {message}")]
    InvalidCall { message: String, span: Span },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String, span: Span },

    #[error("internal error: {message}")]
    Internal { message: String, span: Span },

    #[error("{source}\n{context}")]
    InFunction {
        context: ErrorContext,
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::VariableRedeclaration => CompileError::VariableRedeclaration { message, span },
            ErrorKind::UndefinedSymbol => CompileError::UndefinedSymbol { message, span },
            ErrorKind::MissingReturn => CompileError::MissingReturn { message, span },
            ErrorKind::InvalidReturn => CompileError::InvalidReturn { message, span },
            ErrorKind::InvalidCast => CompileError::InvalidCast { message, span },
            ErrorKind::InvalidSubscript => CompileError::InvalidSubscript { message, span },
            ErrorKind::InvalidUseOfConstruct => CompileError::InvalidUseOfConstruct { message, span },
            ErrorKind::FunctionDeclaration => CompileError::FunctionDeclaration { message, span },
            ErrorKind::InvalidCall => CompileError::InvalidCall { message, span },
            ErrorKind::InvalidOperation => CompileError::InvalidOperation { message, span },
            ErrorKind::Internal => CompileError::Internal { message, span },
        }
    }

    pub fn redeclaration(name: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::VariableRedeclaration,
            format!("`{}` is already declared", name),
            span,
        )
    }

    pub fn undefined_symbol(name: &str, span: Span) -> Self {
        Self::new(ErrorKind::UndefinedSymbol, format!("`{}`", name), span)
    }

    pub fn invalid_cast(from: impl fmt::Display, to: impl fmt::Display, span: Span) -> Self {
        Self::new(
            ErrorKind::InvalidCast,
            format!("cannot cast {} to {}", from, to),
            span,
        )
    }

    pub fn invalid_construct(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::InvalidUseOfConstruct, message, span)
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Internal, message, span)
    }

    /// Kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::VariableRedeclaration { .. } => ErrorKind::VariableRedeclaration,
            CompileError::UndefinedSymbol { .. } => ErrorKind::UndefinedSymbol,
            CompileError::MissingReturn { .. } => ErrorKind::MissingReturn,
            CompileError::InvalidReturn { .. } => ErrorKind::InvalidReturn,
            CompileError::InvalidCast { .. } => ErrorKind::InvalidCast,
            CompileError::InvalidSubscript { .. } => ErrorKind::InvalidSubscript,
            CompileError::InvalidUseOfConstruct { .. } => ErrorKind::InvalidUseOfConstruct,
            CompileError::FunctionDeclaration { .. } => ErrorKind::FunctionDeclaration,
            CompileError::InvalidCall { .. } => ErrorKind::InvalidCall,
            CompileError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            CompileError::Internal { .. } => ErrorKind::Internal,
            CompileError::InFunction { source, .. } => source.kind(),
        }
    }

    pub fn is_due_to(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// The error with every wrapping layer removed.
    pub fn innermost(&self) -> &CompileError {
        match self {
            CompileError::InFunction { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// Position of the failing node.
    pub fn span(&self) -> Span {
        match self {
            CompileError::InFunction { source, .. } => source.span(),
            CompileError::VariableRedeclaration { span, .. }
            | CompileError::UndefinedSymbol { span, .. }
            | CompileError::MissingReturn { span, .. }
            | CompileError::InvalidReturn { span, .. }
            | CompileError::InvalidCast { span, .. }
            | CompileError::InvalidSubscript { span, .. }
            | CompileError::InvalidUseOfConstruct { span, .. }
            | CompileError::FunctionDeclaration { span, .. }
            | CompileError::InvalidCall { span, .. }
            | CompileError::InvalidOperation { span, .. }
            | CompileError::Internal { span, .. } => *span,
        }
    }

    /// Fill in `span` when the error was raised without a position.
    pub fn at_if_unknown(mut self, at: Span) -> Self {
        match &mut self {
            CompileError::InFunction { .. } => {}
            CompileError::VariableRedeclaration { span, .. }
            | CompileError::UndefinedSymbol { span, .. }
            | CompileError::MissingReturn { span, .. }
            | CompileError::InvalidReturn { span, .. }
            | CompileError::InvalidCast { span, .. }
            | CompileError::InvalidSubscript { span, .. }
            | CompileError::InvalidUseOfConstruct { span, .. }
            | CompileError::FunctionDeclaration { span, .. }
            | CompileError::InvalidCall { span, .. }
            | CompileError::InvalidOperation { span, .. }
            | CompileError::Internal { span, .. } => {
                if !span.is_known() {
                    *span = at;
                }
            }
        }
        self
    }

    /// Wrap with the enclosing function's source context.
    pub fn in_function(self, def: &FunctionDef) -> Self {
        if matches!(self, CompileError::InFunction { .. }) {
            return self;
        }
        let context = ErrorContext::capture(def, self.span());
        CompileError::InFunction {
            context,
            source: Box::new(self),
        }
    }
}

impl From<inkwell::builder::BuilderError> for CompileError {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        CompileError::internal(format!("backend builder: {}", err), Span::UNKNOWN)
    }
}

/// Where a compile error happened, with the surrounding source lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub function: String,
    pub file: Option<String>,
    /// Absolute line in `file`, when known.
    pub line: Option<u32>,
    /// 0-based column.
    pub col: u32,
    /// (absolute line number, text) for the previous, current and next line.
    pub excerpt: Vec<(u32, String)>,
    /// Index into `excerpt` of the failing line.
    pub current: Option<usize>,
}

impl ErrorContext {
    pub fn capture(def: &FunctionDef, span: Span) -> Self {
        let mut ctx = ErrorContext {
            function: def.name.clone(),
            file: None,
            line: None,
            col: span.col,
            excerpt: Vec::new(),
            current: None,
        };
        let Some(source) = &def.source else {
            return ctx;
        };
        ctx.file = Some(source.file.clone());
        if !span.is_known() {
            return ctx;
        }

        let abs = |rel: u32| source.first_line + rel - 1;
        ctx.line = Some(abs(span.line));

        let lines: Vec<&str> = source.text.lines().collect();
        let idx = (span.line - 1) as usize;
        let first = idx.saturating_sub(1);
        let last = (idx + 1).min(lines.len().saturating_sub(1));
        for i in first..=last {
            if let Some(text) = lines.get(i) {
                if i == idx {
                    ctx.current = Some(ctx.excerpt.len());
                }
                ctx.excerpt.push((abs(i as u32 + 1), text.to_string()));
            }
        }
        ctx
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  in function `{}`", self.function)?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " (in {}:{}:{})", file, line, self.col + 1)?,
            (Some(file), None) => write!(f, " (in {})", file)?,
            (None, _) => {}
        }
        let width = self
            .excerpt
            .iter()
            .map(|(n, _)| n.to_string().len())
            .max()
            .unwrap_or(0);
        for (i, (n, text)) in self.excerpt.iter().enumerate() {
            write!(f, "\n  {:>width$} | {}", n, text, width = width)?;
            if self.current == Some(i) {
                write!(
                    f,
                    "\n  {:>width$} | {}^",
                    "",
                    "-".repeat(self.col as usize),
                    width = width
                )?;
            }
        }
        Ok(())
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
