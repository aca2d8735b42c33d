//! Errors of the registry and invocation layer.

use thiserror::Error;

use crate::core::error::{CompileError, ErrorKind};
use crate::interp::InterpError;

/// Failures reported by [`super::JitModule`].
#[derive(Debug, Error)]
pub enum JitError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("LLVM error: {0}")]
    Llvm(String),

    #[error("`{0}` has no compiled body")]
    NotCompiled(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("`{function}` takes {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of `{function}` must be {expected}, got {got}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: String,
        got: String,
    },

    #[error("`{function}` cannot be invoked natively: {reason}")]
    NotInvocable { function: String, reason: String },

    #[error("`{function}` calls `{callee}`, which has no compiled body")]
    UnresolvedCallee { function: String, callee: String },

    #[error("`{0}` is already bound to native code")]
    AlreadyFinalized(String),

    #[error("{0} is not supported on this target")]
    UnsupportedTarget(String),

    #[error("object file: {0}")]
    Object(#[from] object::Error),

    #[error(transparent)]
    Interp(#[from] InterpError),
}

impl JitError {
    /// True when a compile error of `kind` is the cause.
    pub fn is_due_to(&self, kind: ErrorKind) -> bool {
        match self {
            JitError::Compile(err) => err.is_due_to(kind),
            JitError::Interp(InterpError::Compile(err)) => err.is_due_to(kind),
            _ => false,
        }
    }
}

impl From<inkwell::support::LLVMString> for JitError {
    fn from(message: inkwell::support::LLVMString) -> Self {
        JitError::Llvm(message.to_string())
    }
}

impl From<inkwell::builder::BuilderError> for JitError {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        JitError::Llvm(err.to_string())
    }
}
