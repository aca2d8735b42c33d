// This module is the LLVM side of the compiler. types maps dialect types onto LLVM types,
// emitter wraps the inkwell Builder with the handful of memory and vector operations the
// generator needs, value defines the typed handles passed between visitors, cast and ops
// hold the conversion rules and per-kind operator tables, and codegen walks one function
// definition and produces one verified LLVM function. Nothing here owns an LLVM module or
// execution engine; the jit module decides where functions are compiled and how they are
// bound to native code.

//! LLVM IR generation for dialect functions.
//!
//! # Example
//! ```ignore
//! use dialect_jit::llvm::compile_function;
//! use dialect_jit::core::CompilationSession;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let module = context.create_module("demo");
//! let compiled = compile_function(&context, &module, &session, &globals, &def, &sig, "demo.add")?;
//! ```

pub mod cast;
pub mod codegen;
pub mod emitter;
pub mod ops;
pub mod types;
pub mod value;

pub use codegen::{compile_function, validate_signature, CompileState, CompiledFunction};
pub use emitter::IrEmitter;
pub use ops::{ops_for, ScalarOps};
pub use value::{Slot, TypedValue};
