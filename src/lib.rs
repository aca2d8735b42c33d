//! dialect-jit - just-in-time compilation of a restricted, statically typed dialect.
//!
//! Function bodies arrive as syntax trees ([`ast`]), are type checked against the
//! dialect's type lattice ([`types`]), translated to LLVM IR ([`llvm`]) and bound to
//! native entry points through an execution engine ([`jit`]). A tree-walking
//! reference interpreter ([`interp`]) runs the same trees without LLVM.
//!
//! # Primary Usage
//!
//! ```ignore
//! use dialect_jit::ast::build::*;
//! use dialect_jit::{CompilationSession, JitModule, Scalar, Type};
//! use bumpalo::Bump;
//! use inkwell::context::Context;
//!
//! let context = Context::create();
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut jit = JitModule::new(&context, &session)?;
//!
//! let fact = jit.define(
//!     func("fact", &["n"], vec![
//!         if_(le(name("n"), int(1)), vec![ret(int(1))], vec![]),
//!         ret(mul(name("n"), call("fact", vec![sub(name("n"), int(1))]))),
//!     ]),
//!     Type::INT,
//!     vec![Type::INT],
//! )?;
//! assert_eq!(jit.invoke(fact, &mut [6i32.into()])?, Some(Scalar::I32(720)));
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - Syntax tree the host front end produces
//! - [`types`] - Type lattice, typed constants and the global prelude
//! - [`core`] - Shared infrastructure (session, errors, scopes)
//! - [`llvm`] - IR generation
//! - [`jit`] - Function registry, optimization and native invocation
//! - [`interp`] - Reference interpreter

pub mod ast;
pub mod core;
pub mod interp;
pub mod jit;
pub mod llvm;
pub mod types;

pub use crate::core::{CompilationSession, CompileError, ErrorKind, SessionStats};
pub use crate::jit::{Arg, ArrayArg, FunctionHandle, FunctionState, JitConfig, JitError, JitModule};
pub use crate::types::prelude::Signature;
pub use crate::types::{Globals, Scalar, ScalarType, Type};
