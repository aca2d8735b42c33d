// This module is the function registry and native binding layer. A JitModule is created
// explicitly by the host and owns an MCJIT execution engine over an empty root module.
// Each registered function gets an entry holding its definition, its resolved signature,
// its backend symbol and, once compiled, its own LLVM module. Keeping one module per
// function lets the code generator discard a failed compilation without touching any
// other function, and lets new functions be added after earlier ones were bound to native
// code. A function moves from Declared (no body yet, possibly forward-declared) to
// Compiled (verified IR, still optimizable) to Sealed (its module belongs to the execution
// engine). A function is sealed the first time it, or a function calling it, is invoked:
// invocation gathers every function reachable through calls, requires each one to have a
// body, hands the pending modules to the engine and binds a trampoline for the entry
// point. Registered functions are visible to every function compiled afterwards through
// the global snapshot, alongside the dialect prelude, host constants and builtins.

//! Function registry, optimization and native invocation.
//!
//! # Example
//! ```ignore
//! use dialect_jit::ast::build::*;
//! use dialect_jit::core::CompilationSession;
//! use dialect_jit::jit::JitModule;
//! use dialect_jit::types::Type;
//! use bumpalo::Bump;
//! use inkwell::context::Context;
//!
//! let context = Context::create();
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut jit = JitModule::new(&context, &session)?;
//! let add = jit.define(
//!     func("add", &["a", "b"], vec![ret(add(name("a"), name("b")))]),
//!     Type::INT,
//!     vec![Type::INT, Type::INT],
//! )?;
//! assert_eq!(jit.invoke(add, &mut [3i32.into(), 4i32.into()])?, Some(Scalar::I32(7)));
//! ```

pub mod disasm;
pub mod error;
pub mod native;

use hashbrown::HashMap;
use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use inkwell::passes::PassManager;
use inkwell::targets::TargetMachine;
use inkwell::values::{AnyValue, FunctionValue};
use inkwell::OptimizationLevel;

use crate::ast::{FunctionDef, Span};
use crate::core::error::{CompileError, ErrorKind};
use crate::core::session::CompilationSession;
use crate::interp::{FunctionSource, Interpreter};
use crate::llvm::{compile_function, validate_signature};
use crate::types::prelude::{FunctionRef, Signature};
use crate::types::{GlobalSymbol, Globals, Scalar, Type};

pub use error::JitError;

/// One-argument C math routines declared by [`JitModule::declare_math_builtins`].
const MATH_ROUTINES: [&str; 16] = [
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "sqrt", "exp", "log",
    "log10", "fabs", "ceil", "floor",
];
pub use native::{Arg, ArrayArg, NativeElement};

/// Registry configuration.
#[derive(Debug, Clone, Copy)]
pub struct JitConfig {
    /// Code generation level of the execution engine.
    pub opt_level: OptimizationLevel,
    /// Run [`JitModule::optimize`] as part of [`JitModule::define`].
    pub optimize_on_define: bool,
    /// Verify the LLVM module before handing it to the engine.
    pub verify: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptimizationLevel::Default,
            optimize_on_define: false,
            verify: true,
        }
    }
}

/// Handle to a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(usize);

impl FunctionHandle {
    pub fn id(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionState {
    Declared,
    Compiled,
    Sealed,
}

struct Entry<'ctx, 'arena> {
    name: String,
    symbol: &'arena str,
    sig: Signature,
    def: Option<FunctionDef>,
    module: Option<Module<'ctx>>,
    state: FunctionState,
    callees: Vec<usize>,
    optimized: bool,
    trampoline: Option<usize>,
}

pub struct JitModule<'ctx, 'arena> {
    context: &'ctx Context,
    session: &'arena CompilationSession<'arena>,
    config: JitConfig,
    engine: ExecutionEngine<'ctx>,
    /// Kept alive for the engine; functions live in per-entry modules.
    _root: Module<'ctx>,
    entries: Vec<Entry<'ctx, 'arena>>,
    by_name: HashMap<String, usize>,
    globals: Globals,
}

impl<'ctx, 'arena> JitModule<'ctx, 'arena> {
    pub fn new(
        context: &'ctx Context,
        session: &'arena CompilationSession<'arena>,
    ) -> Result<Self, JitError> {
        Self::with_config(context, session, JitConfig::default())
    }

    pub fn with_config(
        context: &'ctx Context,
        session: &'arena CompilationSession<'arena>,
        config: JitConfig,
    ) -> Result<Self, JitError> {
        let root = context.create_module("dialect");
        let engine = root.create_jit_execution_engine(config.opt_level)?;
        log::info!("🚀 JIT module ready ({:?})", config.opt_level);
        Ok(Self {
            context,
            session,
            config,
            engine,
            _root: root,
            entries: Vec::new(),
            by_name: HashMap::new(),
            globals: Globals::prelude(),
        })
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn session(&self) -> &'arena CompilationSession<'arena> {
        self.session
    }

    /// The global snapshot functions are compiled against.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Bind a module-level constant.
    pub fn define_constant(&mut self, name: &str, value: Scalar) -> Result<(), JitError> {
        self.ensure_free(name)?;
        log::debug!("Constant {} = {}", name, value);
        self.globals.define_constant(name, value);
        Ok(())
    }

    /// Bind a named type alias usable in `var` declarations and casts.
    pub fn define_type(&mut self, name: &str, ty: Type) -> Result<(), JitError> {
        self.ensure_free(name)?;
        self.globals.define_type(name, ty);
        Ok(())
    }

    fn ensure_free(&self, name: &str) -> Result<(), JitError> {
        if self.globals.contains(name) {
            return Err(CompileError::new(
                ErrorKind::VariableRedeclaration,
                format!("global `{}` is already defined", name),
                Span::UNKNOWN,
            )
            .into());
        }
        Ok(())
    }

    /// Declare an external native function, e.g. a C math routine.
    pub fn declare_builtin(
        &mut self,
        name: &str,
        symbol: &str,
        ret: Type,
        args: Vec<Type>,
    ) -> Result<(), JitError> {
        self.ensure_free(name)?;
        let sig = Signature::new(ret, args);
        validate_signature(name, &sig, Span::UNKNOWN)?;
        log::debug!("Builtin {} -> {} {}", name, symbol, sig);
        self.globals.insert(
            name,
            GlobalSymbol::Function(FunctionRef {
                id: usize::MAX,
                symbol: symbol.to_string(),
                sig,
                builtin: true,
            }),
        );
        Ok(())
    }

    /// Declare the C math library routines: `sin`, `sqrt`, ... over Double and
    /// `sinf`, `sqrtf`, ... over Float.
    pub fn declare_math_builtins(&mut self) -> Result<(), JitError> {
        for name in MATH_ROUTINES {
            self.declare_builtin(name, name, Type::DOUBLE, vec![Type::DOUBLE])?;
            let single = format!("{}f", name);
            self.declare_builtin(&single, &single, Type::FLOAT, vec![Type::FLOAT])?;
        }
        self.declare_builtin("pow", "pow", Type::DOUBLE, vec![Type::DOUBLE, Type::DOUBLE])?;
        self.declare_builtin("powf", "powf", Type::FLOAT, vec![Type::FLOAT, Type::FLOAT])
    }

    /// Declare `putchar` from the C standard I/O library.
    pub fn declare_stdio_builtins(&mut self) -> Result<(), JitError> {
        self.declare_builtin("putchar", "putchar", Type::INT, vec![Type::INT])
    }

    /// Declare `name` without a body so that functions defined before it can
    /// call it.
    pub fn forward_declare(
        &mut self,
        name: &str,
        ret: Type,
        args: Vec<Type>,
    ) -> Result<FunctionHandle, JitError> {
        if let Some(&id) = self.by_name.get(name) {
            let entry = &self.entries[id];
            if entry.sig.ret == ret && entry.sig.params == args {
                return Ok(FunctionHandle(id));
            }
            return Err(CompileError::new(
                ErrorKind::FunctionDeclaration,
                format!("`{}` is already declared as {}", name, entry.sig),
                Span::UNKNOWN,
            )
            .into());
        }
        self.add_entry(name, Signature::new(ret, args), None)
    }

    /// Register a definition; compilation happens in [`JitModule::compile`].
    pub fn register(
        &mut self,
        def: FunctionDef,
        ret: Type,
        args: Vec<Type>,
    ) -> Result<FunctionHandle, JitError> {
        let sig = Signature::new(ret, args);
        if def.params.len() != sig.params.len() {
            return Err(CompileError::new(
                ErrorKind::FunctionDeclaration,
                format!(
                    "`{}` has {} parameters but {} argument types were given",
                    def.name,
                    def.params.len(),
                    sig.params.len()
                ),
                def.span,
            )
            .into());
        }

        if let Some(&id) = self.by_name.get(&def.name) {
            let entry = &mut self.entries[id];
            let problem = if entry.def.is_some() {
                Some("already has a body".to_string())
            } else if entry.sig != sig {
                Some(format!("was forward-declared as {}", entry.sig))
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(CompileError::new(
                    ErrorKind::FunctionDeclaration,
                    format!("`{}` {}", def.name, problem),
                    def.span,
                )
                .into());
            }
            log::debug!("Attaching body to forward declaration {}", def.name);
            entry.def = Some(def);
            return Ok(FunctionHandle(id));
        }

        let name = def.name.clone();
        self.add_entry(&name, sig, Some(def))
    }

    fn add_entry(
        &mut self,
        name: &str,
        sig: Signature,
        def: Option<FunctionDef>,
    ) -> Result<FunctionHandle, JitError> {
        let span = def.as_ref().map(|d| d.span).unwrap_or(Span::UNKNOWN);
        if self.globals.contains(name) {
            return Err(CompileError::new(
                ErrorKind::FunctionDeclaration,
                format!("`{}` collides with an existing global", name),
                span,
            )
            .into());
        }
        validate_signature(name, &sig, span)?;

        let id = self.entries.len();
        let symbol = self.session.intern_str(&format!("dialect.{}", name));
        self.globals.insert(
            name,
            GlobalSymbol::Function(FunctionRef {
                id,
                symbol: symbol.to_string(),
                sig: sig.clone(),
                builtin: false,
            }),
        );
        self.by_name.insert(name.to_string(), id);
        self.entries.push(Entry {
            name: name.to_string(),
            symbol,
            sig,
            def,
            module: None,
            state: FunctionState::Declared,
            callees: Vec::new(),
            optimized: false,
            trampoline: None,
        });
        log::debug!("Registered {} as #{}", name, id);
        Ok(FunctionHandle(id))
    }

    /// Register, compile and (when configured) optimize `def`.
    pub fn define(
        &mut self,
        def: FunctionDef,
        ret: Type,
        args: Vec<Type>,
    ) -> Result<FunctionHandle, JitError> {
        let handle = self.register(def, ret, args)?;
        self.compile(handle)?;
        if self.config.optimize_on_define {
            self.optimize(handle)?;
        }
        Ok(handle)
    }

    /// Compile the body of `handle`. A failure leaves the function
    /// uncompiled and every other function untouched.
    pub fn compile(&mut self, handle: FunctionHandle) -> Result<(), JitError> {
        let context = self.context;
        let session = self.session;
        let entry = self
            .entries
            .get_mut(handle.0)
            .ok_or_else(|| JitError::UnknownFunction(format!("#{}", handle.0)))?;
        if entry.state != FunctionState::Declared {
            return Ok(());
        }
        let def = entry
            .def
            .as_ref()
            .ok_or_else(|| JitError::NotCompiled(entry.name.clone()))?;

        let module = context.create_module(entry.symbol);
        module.set_triple(&TargetMachine::get_default_triple());
        module.set_data_layout(&self.engine.get_target_data().get_data_layout());

        let compiled = compile_function(
            context,
            &module,
            session,
            &self.globals,
            def,
            &entry.sig,
            entry.symbol,
        )?;

        if self.config.verify {
            module.verify()?;
        }
        entry.callees = compiled.callees;
        entry.module = Some(module);
        entry.state = FunctionState::Compiled;
        Ok(())
    }

    /// Run the function-level optimization pipeline and re-verify.
    pub fn optimize(&mut self, handle: FunctionHandle) -> Result<(), JitError> {
        let session = self.session;
        let entry = self.entry_mut_checked(handle)?;
        match entry.state {
            FunctionState::Declared => return Err(JitError::NotCompiled(entry.name.clone())),
            FunctionState::Sealed => {
                log::warn!("optimize({}) after native binding ignored", entry.name);
                return Err(JitError::AlreadyFinalized(entry.name.clone()));
            }
            FunctionState::Compiled => {}
        }
        if entry.optimized {
            return Ok(());
        }
        let module = entry
            .module
            .as_ref()
            .ok_or_else(|| JitError::NotCompiled(entry.name.clone()))?;
        let function = module
            .get_function(entry.symbol)
            .ok_or_else(|| JitError::UnknownFunction(entry.symbol.to_string()))?;

        let fpm: PassManager<FunctionValue<'ctx>> = PassManager::create(module);
        fpm.add_promote_memory_to_register_pass();
        fpm.add_instruction_combining_pass();
        fpm.add_reassociate_pass();
        fpm.add_gvn_pass();
        fpm.add_cfg_simplification_pass();
        fpm.initialize();
        let changed = fpm.run_on(&function);
        fpm.finalize();

        if !function.verify(false) {
            return Err(JitError::Llvm(format!(
                "`{}` failed verification after optimization",
                entry.name
            )));
        }
        entry.optimized = true;
        session.record_optimization();
        log::debug!(
            "⚡ Optimized {} ({} blocks, changed: {})",
            entry.name,
            function.count_basic_blocks(),
            changed
        );
        Ok(())
    }

    pub fn handle(&self, name: &str) -> Option<FunctionHandle> {
        self.by_name.get(name).copied().map(FunctionHandle)
    }

    pub fn state(&self, handle: FunctionHandle) -> Option<FunctionState> {
        self.entries.get(handle.0).map(|e| e.state)
    }

    pub fn signature(&self, handle: FunctionHandle) -> Option<&Signature> {
        self.entries.get(handle.0).map(|e| &e.sig)
    }

    pub fn name(&self, handle: FunctionHandle) -> Option<&str> {
        self.entries.get(handle.0).map(|e| e.name.as_str())
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_checked(&self, handle: FunctionHandle) -> Result<&Entry<'ctx, 'arena>, JitError> {
        self.entries
            .get(handle.0)
            .ok_or_else(|| JitError::UnknownFunction(format!("#{}", handle.0)))
    }

    fn entry_mut_checked(&mut self, handle: FunctionHandle) -> Result<&mut Entry<'ctx, 'arena>, JitError> {
        self.entries
            .get_mut(handle.0)
            .ok_or_else(|| JitError::UnknownFunction(format!("#{}", handle.0)))
    }

    fn compiled_function(&self, handle: FunctionHandle) -> Result<(&Module<'ctx>, FunctionValue<'ctx>), JitError> {
        let entry = self.entry_checked(handle)?;
        let module = entry
            .module
            .as_ref()
            .ok_or_else(|| JitError::NotCompiled(entry.name.clone()))?;
        let function = module
            .get_function(entry.symbol)
            .ok_or_else(|| JitError::UnknownFunction(entry.symbol.to_string()))?;
        Ok((module, function))
    }

    /// LLVM IR of the compiled function.
    pub fn ir(&self, handle: FunctionHandle) -> Result<String, JitError> {
        let (_, function) = self.compiled_function(handle)?;
        Ok(function.print_to_string().to_string())
    }

    /// Target assembly of the function's module.
    pub fn assembly(&self, handle: FunctionHandle) -> Result<String, JitError> {
        let (module, _) = self.compiled_function(handle)?;
        disasm::assembly(module, self.config.opt_level)
    }

    /// Decoded machine code of the function (x86-64 hosts only).
    pub fn disassemble(&self, handle: FunctionHandle) -> Result<Vec<String>, JitError> {
        let (module, _) = self.compiled_function(handle)?;
        let entry = self.entry_checked(handle)?;
        disasm::disassemble(module, entry.symbol, self.config.opt_level)
    }

    /// Call the compiled function natively.
    pub fn invoke(&mut self, handle: FunctionHandle, args: &mut [Arg<'_>]) -> Result<Option<Scalar>, JitError> {
        let entry = self.entry_checked(handle)?;
        if entry.state == FunctionState::Declared {
            return Err(JitError::NotCompiled(entry.name.clone()));
        }
        native::check_invocable(&entry.name, &entry.sig)?;
        native::check_args(&entry.name, &entry.sig, args)?;
        let ret = entry.sig.ret;

        let address = self.bind(handle)?;
        log::trace!("invoke #{} at {:#x}", handle.0, address);
        let mut marshalled = native::Marshalled::new(args);
        // SAFETY: `address` is the trampoline bound for this signature and the
        // arguments were checked against it above.
        let result = unsafe { marshalled.call(address, &ret) };
        Ok(result)
    }

    /// The trampoline address of `handle`, sealing and binding on first use.
    fn bind(&mut self, handle: FunctionHandle) -> Result<usize, JitError> {
        if let Some(address) = self.entry_checked(handle)?.trampoline {
            return Ok(address);
        }

        for id in self.reachable(handle.0)? {
            let entry = &mut self.entries[id];
            if entry.state == FunctionState::Sealed {
                continue;
            }
            if let Some(module) = entry.module.as_ref() {
                self.engine
                    .add_module(module)
                    .map_err(|()| JitError::Llvm(format!("engine rejected module of `{}`", entry.name)))?;
                entry.state = FunctionState::Sealed;
                log::debug!("🔒 Sealed {}", entry.name);
            }
        }

        let entry = self.entry_checked(handle)?;
        let tramp = native::trampoline_symbol(entry.symbol);
        let tramp_module = self.context.create_module(&tramp);
        tramp_module.set_triple(&TargetMachine::get_default_triple());
        tramp_module.set_data_layout(&self.engine.get_target_data().get_data_layout());
        native::build_trampoline(self.context, &tramp_module, entry.symbol, &entry.sig)?;
        self.engine
            .add_module(&tramp_module)
            .map_err(|()| JitError::Llvm("engine rejected trampoline module".into()))?;

        let address = self
            .engine
            .get_function_address(&tramp)
            .map_err(|e| JitError::Llvm(format!("{}: {}", tramp, e)))?;
        log::info!("🔗 Bound native entry point for {} at {:#x}", entry.name, address);
        self.session.record_native_binding();

        let entry = self.entry_mut_checked(handle)?;
        entry.trampoline = Some(address);
        Ok(address)
    }

    /// Ids reachable from `root` through calls, `root` first. Every one
    /// must have a compiled body.
    fn reachable(&self, root: usize) -> Result<Vec<usize>, JitError> {
        let mut order = vec![root];
        let mut seen = hashbrown::HashSet::new();
        seen.insert(root);
        let mut next = 0;
        while next < order.len() {
            let caller = &self.entries[order[next]];
            next += 1;
            for &callee in &caller.callees {
                let target = self.entries.get(callee).ok_or_else(|| {
                    JitError::UnknownFunction(format!("#{}", callee))
                })?;
                if target.state == FunctionState::Declared {
                    return Err(JitError::UnresolvedCallee {
                        function: caller.name.clone(),
                        callee: target.name.clone(),
                    });
                }
                if seen.insert(callee) {
                    order.push(callee);
                }
            }
        }
        Ok(order)
    }

    /// Run the function through the reference interpreter.
    pub fn run_reference(&self, handle: FunctionHandle, args: &mut [Arg<'_>]) -> Result<Option<Scalar>, JitError> {
        let entry = self.entry_checked(handle)?;
        native::check_args(&entry.name, &entry.sig, args)?;
        let interpreter = Interpreter::new(self, self.session);
        Ok(interpreter.run(handle.0, args)?)
    }
}

impl FunctionSource for JitModule<'_, '_> {
    fn globals(&self) -> &Globals {
        &self.globals
    }

    fn definition(&self, id: usize) -> Option<(&FunctionDef, &Signature)> {
        let entry = self.entries.get(id)?;
        Some((entry.def.as_ref()?, &entry.sig))
    }

    fn function_name(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(|e| e.name.as_str())
    }
}
