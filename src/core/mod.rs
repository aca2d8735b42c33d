// This module gathers the infrastructure shared by the code generator, the registry and
// the reference interpreter: the error taxonomy with its source-context wrapper, the
// arena-backed compilation session with its statistics, and the per-function symbol
// table. None of it depends on LLVM, apart from the conversion of backend builder
// failures into internal compile errors.

//! Core compiler infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based name interning using `bumpalo`
//! - Compilation statistics
//!
//! ## Errors (`error`)
//! - One variant per failure kind, each carrying the failing node's span
//! - Source-context wrapping and `is_due_to` queries
//!
//! ## Scopes (`scope`)
//! - Declare-once local names over a global snapshot

pub mod error;
pub mod scope;
pub mod session;

pub use error::{CompileError, CompileResult, ErrorContext, ErrorKind};
pub use scope::{Binding, Resolved, Scope};
pub use session::{CompilationSession, SessionStats};
