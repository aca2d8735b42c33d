// This module drives the translation of one dialect function into one LLVM function. The
// FunctionCompiler walks the syntax tree once, in source order. It consults the Scope for
// names, the type system for coercions and casts, and the operator tables in llvm::ops,
// emitting IR through an inkwell Builder as it goes. Compilation moves through four
// states. Entry creates (or adopts a body-less declaration of) the backend function and
// its entry block. ArgumentsBound gives every parameter a stack slot holding the incoming
// value. BodyEmitting visits the statements, with control-flow constructs appending
// uniquely numbered blocks. Closed adds the implicit `ret void` of Void functions, or
// reports a missing return. The finished function is verified, and its instructions are
// counted into the session statistics. Any failure is wrapped with the function's source
// context and reported as a single error; the caller discards the module it compiled
// into, so no partial function survives. All allocas are placed in the entry block so
// that mem2reg can promote them and loops do not grow the stack.

//! AST-to-IR code generation.

mod expr;
mod stmt;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{AnyValue, FunctionValue, InstructionOpcode, PointerValue};

use crate::ast::{FunctionDef, Span, Stmt};
use crate::core::error::{CompileError, CompileResult, ErrorKind};
use crate::core::scope::Scope;
use crate::core::session::CompilationSession;
use crate::types::prelude::Signature;
use crate::types::{Globals, Type};

use super::emitter::IrEmitter;
use super::types;

/// Progress of one function's compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Entry,
    ArgumentsBound,
    BodyEmitting,
    Closed,
}

/// Outcome of compiling one function.
#[derive(Debug)]
pub struct CompiledFunction<'ctx> {
    pub function: FunctionValue<'ctx>,
    /// Registry ids of the functions called from the body.
    pub callees: Vec<usize>,
    pub instruction_count: usize,
    pub block_count: usize,
}

/// Compile `def` with signature `sig` into `module` under `symbol`.
///
/// On error the module may hold a partially built function and must be
/// discarded by the caller.
pub fn compile_function<'a, 'ctx, 'arena>(
    context: &'ctx Context,
    module: &'a Module<'ctx>,
    session: &'a CompilationSession<'arena>,
    globals: &'a Globals,
    def: &'a FunctionDef,
    sig: &'a Signature,
    symbol: &'a str,
) -> CompileResult<CompiledFunction<'ctx>>
where
    'arena: 'a,
{
    log::info!("🔧 Compiling dialect function: {} {}", def.name, sig);
    let compiler = FunctionCompiler::new(context, module, session, globals, def, sig, symbol);
    let result = compiler.run();

    match result {
        Ok(compiled) => {
            session.record_function_compiled(&def.name, compiled.instruction_count);
            log::debug!(
                "✅ {} compiled: {} blocks, {} instructions",
                def.name,
                compiled.block_count,
                compiled.instruction_count
            );
            Ok(compiled)
        }
        Err(err) => {
            session.record_function_failed(&def.name);
            let err = err.in_function(def);
            log::debug!("❌ {}", err);
            Err(err)
        }
    }
}

pub(crate) struct FunctionCompiler<'a, 'ctx, 'arena> {
    context: &'ctx Context,
    module: &'a Module<'ctx>,
    builder: Builder<'ctx>,
    alloca_builder: Builder<'ctx>,
    session: &'a CompilationSession<'arena>,
    scope: Scope<'a, PointerValue<'ctx>>,
    def: &'a FunctionDef,
    sig: &'a Signature,
    symbol: &'a str,
    function: Option<FunctionValue<'ctx>>,
    state: CompileState,
    block_counter: u32,
    callees: Vec<usize>,
}

impl<'a, 'ctx, 'arena: 'a> FunctionCompiler<'a, 'ctx, 'arena> {
    fn new(
        context: &'ctx Context,
        module: &'a Module<'ctx>,
        session: &'a CompilationSession<'arena>,
        globals: &'a Globals,
        def: &'a FunctionDef,
        sig: &'a Signature,
        symbol: &'a str,
    ) -> Self {
        Self {
            context,
            module,
            builder: context.create_builder(),
            alloca_builder: context.create_builder(),
            session,
            scope: Scope::new(globals),
            def,
            sig,
            symbol,
            function: None,
            state: CompileState::Entry,
            block_counter: 0,
            callees: Vec::new(),
        }
    }

    fn emitter(&self) -> IrEmitter<'_, 'ctx> {
        IrEmitter::new(self.context, &self.builder)
    }

    fn advance(&mut self, next: CompileState) {
        log::trace!("{}: {:?} -> {:?}", self.def.name, self.state, next);
        self.state = next;
    }

    fn run(mut self) -> CompileResult<CompiledFunction<'ctx>> {
        let function = self.create_function()?;
        self.bind_arguments(function)?;

        self.advance(CompileState::BodyEmitting);
        let def = self.def;
        self.visit_block(&def.body)?;

        self.close(&def.body)?;
        log::trace!("{}: {} local(s) declared", def.name, self.scope.len());

        if !function.verify(false) {
            log::debug!("Rejected IR:\n{}", function.print_to_string().to_string());
            return Err(CompileError::internal(
                format!("backend verification of `{}` failed", self.def.name),
                self.def.span,
            ));
        }
        log::debug!("Emitted IR:\n{}", function.print_to_string().to_string());

        let mut instruction_count = 0;
        for block in function.get_basic_blocks() {
            for inst in block.get_instructions() {
                self.session.record_instruction_compiled(&mnemonic(inst.get_opcode()));
                instruction_count += 1;
            }
        }

        let mut callees = self.callees;
        callees.sort_unstable();
        callees.dedup();
        Ok(CompiledFunction {
            function,
            callees,
            instruction_count,
            block_count: function.count_basic_blocks() as usize,
        })
    }

    /// Entry: create the backend function and its entry block.
    fn create_function(&mut self) -> CompileResult<FunctionValue<'ctx>> {
        let span = self.def.span;
        if self.def.params.len() != self.sig.params.len() {
            return Err(CompileError::new(
                ErrorKind::FunctionDeclaration,
                format!(
                    "`{}` has {} parameters but {} argument types were declared",
                    self.def.name,
                    self.def.params.len(),
                    self.sig.params.len()
                ),
                span,
            ));
        }
        validate_signature(&self.def.name, self.sig, span)?;

        let fn_type = types::function_type(self.context, self.sig);
        let function = match self.module.get_function(self.symbol) {
            Some(existing) if existing.count_basic_blocks() > 0 => {
                return Err(CompileError::new(
                    ErrorKind::FunctionDeclaration,
                    format!("`{}` already has a body", self.symbol),
                    span,
                ))
            }
            Some(existing) if existing.get_type() != fn_type => {
                return Err(CompileError::new(
                    ErrorKind::FunctionDeclaration,
                    format!("`{}` is already declared with a different signature", self.symbol),
                    span,
                ))
            }
            Some(existing) => existing,
            None => self.module.add_function(self.symbol, fn_type, None),
        };

        let entry = self.context.append_basic_block(function, "entry");
        self.session.record_block_created();
        self.builder.position_at_end(entry);
        self.function = Some(function);
        Ok(function)
    }

    /// ArgumentsBound: spill every parameter into its own stack slot.
    fn bind_arguments(&mut self, function: FunctionValue<'ctx>) -> CompileResult<()> {
        let (def, sig) = (self.def, self.sig);
        for (i, (param, ty)) in def.params.iter().zip(&sig.params).enumerate() {
            self.scope.ensure_undeclared(&param.name, param.span)?;
            let incoming = function.get_nth_param(i as u32).ok_or_else(|| {
                CompileError::internal(format!("missing parameter {}", i), param.span)
            })?;
            incoming.set_name(&param.name);

            let slot = self.alloca(ty, &param.name, param.span)?;
            self.emitter().store(slot, incoming)?;
            self.scope
                .declare(self.session, &param.name, *ty, slot, param.span)?;
        }
        self.advance(CompileState::ArgumentsBound);
        Ok(())
    }

    /// Closed: terminate the final block.
    fn close(&mut self, body: &[Stmt]) -> CompileResult<()> {
        if !self.emitter().is_terminated() {
            if self.sig.ret.is_void() {
                self.builder.build_return(None)?;
            } else {
                let span = body.last().map(|s| s.span).unwrap_or(self.def.span);
                return Err(CompileError::new(
                    ErrorKind::MissingReturn,
                    format!(
                        "`{}` returns {} but control can reach the end of the function",
                        self.def.name, self.sig.ret
                    ),
                    span,
                ));
            }
        }
        self.advance(CompileState::Closed);
        Ok(())
    }

    fn current_function(&self) -> CompileResult<FunctionValue<'ctx>> {
        self.function
            .ok_or_else(|| CompileError::internal("no function under construction", Span::UNKNOWN))
    }

    /// Append a block labelled `<label>_<n>`.
    fn append_block(&mut self, label: &str) -> CompileResult<BasicBlock<'ctx>> {
        let function = self.current_function()?;
        let name = format!("{}_{}", label, self.block_counter);
        self.block_counter += 1;
        self.session.record_block_created();
        log::debug!("📦 New block {}", name);
        Ok(self.context.append_basic_block(function, &name))
    }

    /// Zero-initialised stack storage for a value of `ty`, placed in the entry block.
    fn alloca(&mut self, ty: &Type, name: &str, span: Span) -> CompileResult<PointerValue<'ctx>> {
        let storage: BasicTypeEnum<'ctx> = types::storage_type(self.context, ty).ok_or_else(|| {
            CompileError::invalid_construct(format!("cannot declare `{}` as Void", name), span)
        })?;
        let entry = self
            .current_function()?
            .get_first_basic_block()
            .ok_or_else(|| CompileError::internal("function has no entry block", span))?;
        match entry.get_first_instruction() {
            Some(first) => self.alloca_builder.position_before(&first),
            None => self.alloca_builder.position_at_end(entry),
        }
        let ptr = self.alloca_builder.build_alloca(storage, name)?;
        self.alloca_builder.build_store(ptr, storage.const_zero())?;
        Ok(ptr)
    }
}

/// The textual IR mnemonic of `opcode`.
fn mnemonic(opcode: InstructionOpcode) -> String {
    match opcode {
        InstructionOpcode::Return => "ret".to_string(),
        InstructionOpcode::AtomicCmpXchg => "cmpxchg".to_string(),
        InstructionOpcode::VAArg => "va_arg".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Reject signatures the backend contract cannot express.
pub fn validate_signature(name: &str, sig: &Signature, span: Span) -> CompileResult<()> {
    for (i, p) in sig.params.iter().enumerate() {
        let problem = match p {
            Type::Void => Some("Void"),
            Type::Array { .. } => Some("a bounded array (use Array(T))"),
            _ => None,
        };
        if let Some(problem) = problem {
            return Err(CompileError::new(
                ErrorKind::FunctionDeclaration,
                format!("parameter {} of `{}` cannot be {}", i, name, problem),
                span,
            ));
        }
    }
    if matches!(sig.ret, Type::Array { .. }) {
        return Err(CompileError::new(
            ErrorKind::FunctionDeclaration,
            format!("`{}` cannot return a bounded array", name),
            span,
        ));
    }
    Ok(())
}
