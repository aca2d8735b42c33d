// The reference interpreter executes a FunctionDef directly, without LLVM. It is the
// "original callable" path the registry offers next to native invocation, and the oracle
// the integration tests compare native results against. It deliberately shares the type
// system (coercion, casts, literal typing) and the Scope rules with the code generator, and
// it reports the same compile errors for ill-typed programs, so the two paths differ only
// in how they execute. Values are typed scalars, vectors (lists of lanes) and pointers into
// memory regions. Bounded arrays own a region, unbounded arrays and slices point into one,
// and host buffers are copied into a region for the duration of a call and copied back
// afterwards. Integer arithmetic is evaluated in 64 bits and truncated to the operand
// width, which is what two's-complement hardware computes. Float arithmetic is done in
// f32 so results round like native code. Conditions the native code leaves undefined
// (division by zero, out-of-bounds indexing, unbounded recursion) are runtime errors here.

//! Tree-walking reference interpreter.

use std::io::Write;

use thiserror::Error;

use crate::ast::{
    BinOp, BoolOp, CmpOp, Expr, ExprKind, FunctionDef, Index, Keyword, Literal, Span, Stmt,
    StmtKind, UnaryOp,
};
use crate::core::error::{CompileError, ErrorKind};
use crate::core::scope::{Resolved, Scope};
use crate::core::session::CompilationSession;
use crate::jit::native::Arg;
use crate::types::prelude::{Construct, FunctionRef, Signature};
use crate::types::{castable, coerce, literal_type, GlobalSymbol, Globals, Scalar, ScalarType, Type};

/// Default nesting limit for dialect calls.
pub const MAX_CALL_DEPTH: usize = 128;

/// Where the interpreter finds function bodies and globals.
pub trait FunctionSource {
    fn globals(&self) -> &Globals;
    fn definition(&self, id: usize) -> Option<(&FunctionDef, &Signature)>;
    fn function_name(&self, id: usize) -> Option<&str>;
}

#[derive(Debug, Error)]
pub enum InterpError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("division by zero at {0}")]
    DivisionByZero(Span),

    #[error("index {index} out of bounds for length {len} at {span}")]
    OutOfBounds { index: i64, len: usize, span: Span },

    #[error("call depth exceeded {0}")]
    CallDepth(usize),

    #[error("`{0}` has no body")]
    MissingBody(String),

    #[error("no reference implementation for builtin `{0}`")]
    UnknownBuiltin(String),

    #[error("{0}")]
    Arguments(String),
}

impl InterpError {
    fn at_if_unknown(self, span: Span) -> Self {
        match self {
            InterpError::Compile(err) => InterpError::Compile(err.at_if_unknown(span)),
            other => other,
        }
    }
}

type InterpResult<T> = Result<T, InterpError>;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Vector { elem: ScalarType, lanes: Vec<Scalar> },
    /// Arrays and slices: element `offset` of memory region `region`.
    Pointer { ty: Type, region: usize, offset: usize },
    Void,
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Scalar(s) => Type::Scalar(s.ty()),
            Value::Vector { elem, lanes } => Type::Vector {
                elem: *elem,
                count: lanes.len() as u32,
            },
            Value::Pointer { ty, .. } => *ty,
            Value::Void => Type::Void,
        }
    }
}

pub struct Interpreter<'a, 'arena> {
    source: &'a dyn FunctionSource,
    session: &'a CompilationSession<'arena>,
    max_depth: usize,
}

impl<'a, 'arena: 'a> Interpreter<'a, 'arena> {
    pub fn new(source: &'a dyn FunctionSource, session: &'a CompilationSession<'arena>) -> Self {
        Self {
            source,
            session,
            max_depth: MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Call function `id` with host arguments. Array arguments are updated
    /// in place with the values the function stored.
    pub fn run(&self, id: usize, args: &mut [Arg<'_>]) -> InterpResult<Option<Scalar>> {
        let name = self.source.function_name(id).unwrap_or("<unknown>").to_string();
        let (_, sig) = self
            .source
            .definition(id)
            .ok_or_else(|| InterpError::MissingBody(name.clone()))?;
        if args.len() != sig.params.len() {
            return Err(InterpError::Arguments(format!(
                "`{}` takes {} argument(s), got {}",
                name,
                sig.params.len(),
                args.len()
            )));
        }

        let mut machine = Machine {
            source: self.source,
            session: self.session,
            regions: Vec::new(),
            depth: 0,
            max_depth: self.max_depth,
        };
        let mut values = Vec::with_capacity(args.len());
        let mut buffers = Vec::new();
        for (i, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
            match arg {
                Arg::Scalar(s) => values.push(Value::Scalar(*s)),
                Arg::Array(a) => {
                    let data = (0..a.len()).filter_map(|j| a.get(j)).collect();
                    let region = machine.alloc(data);
                    buffers.push((i, region));
                    values.push(Value::Pointer {
                        ty: *param,
                        region,
                        offset: 0,
                    });
                }
            }
        }

        log::debug!("🐢 Interpreting {}", name);
        let result = machine.call(id, values, Span::UNKNOWN)?;

        for (i, region) in buffers {
            if let Arg::Array(a) = &mut args[i] {
                for (j, v) in machine.regions[region].iter().enumerate() {
                    a.set(j, *v);
                }
            }
        }

        match result {
            Value::Scalar(s) => Ok(Some(s)),
            Value::Void => Ok(None),
            other => Err(InterpError::Arguments(format!(
                "a {} result cannot be returned to the host",
                other.ty()
            ))),
        }
    }
}

struct Machine<'a, 'arena> {
    source: &'a dyn FunctionSource,
    session: &'a CompilationSession<'arena>,
    regions: Vec<Vec<Scalar>>,
    depth: usize,
    max_depth: usize,
}

struct Frame<'a> {
    scope: Scope<'a, usize>,
    slots: Vec<Value>,
    ret: Type,
}

enum Flow {
    Next,
    Return(Value),
}

#[derive(Clone, Copy)]
enum Place {
    Slot { index: usize, ty: Type },
    Lane { slot: usize, lane: usize, elem: ScalarType },
    Element { region: usize, index: usize, elem: ScalarType },
}

impl<'a, 'arena: 'a> Machine<'a, 'arena> {
    fn alloc(&mut self, data: Vec<Scalar>) -> usize {
        self.regions.push(data);
        self.regions.len() - 1
    }

    fn call(&mut self, id: usize, args: Vec<Value>, span: Span) -> InterpResult<Value> {
        let source = self.source;
        let name = source.function_name(id).unwrap_or("<unknown>");
        if self.depth >= self.max_depth {
            log::warn!("call depth limit reached in {} at {}", name, span);
            return Err(InterpError::CallDepth(self.max_depth));
        }
        let (def, sig) = source
            .definition(id)
            .ok_or_else(|| InterpError::MissingBody(name.to_string()))?;

        self.depth += 1;
        let result = self.execute(def, sig, args);
        self.depth -= 1;
        result.map_err(|e| match e {
            InterpError::Compile(err) => InterpError::Compile(err.in_function(def)),
            other => other,
        })
    }

    fn execute(&mut self, def: &FunctionDef, sig: &Signature, args: Vec<Value>) -> InterpResult<Value> {
        let source = self.source;
        let mut frame = Frame {
            scope: Scope::new(source.globals()),
            slots: Vec::new(),
            ret: sig.ret,
        };
        for ((param, ty), value) in def.params.iter().zip(&sig.params).zip(args) {
            let value = self.cast(value, ty, param.span)?;
            self.declare(&mut frame, &param.name, *ty, value, param.span)?;
        }

        match self.exec_block(&mut frame, &def.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Next if sig.ret.is_void() => Ok(Value::Void),
            Flow::Next => Err(CompileError::new(
                ErrorKind::MissingReturn,
                format!("`{}` reached its end without returning {}", def.name, sig.ret),
                def.body.last().map(|s| s.span).unwrap_or(def.span),
            )
            .into()),
        }
    }

    fn declare(&mut self, frame: &mut Frame<'a>, name: &str, ty: Type, value: Value, span: Span) -> InterpResult<()> {
        let index = frame.slots.len();
        frame.scope.declare(self.session, name, ty, index, span)?;
        frame.slots.push(value);
        Ok(())
    }

    fn zero(&mut self, ty: &Type) -> Value {
        match *ty {
            Type::Scalar(s) => Value::Scalar(Scalar::zero(s)),
            Type::Vector { elem, count } => Value::Vector {
                elem,
                lanes: vec![Scalar::zero(elem); count as usize],
            },
            Type::Array { elem, count } => {
                let region = self.alloc(vec![Scalar::zero(elem); count as usize]);
                Value::Pointer {
                    ty: *ty,
                    region,
                    offset: 0,
                }
            }
            Type::UnboundedArray(_) | Type::Slice(_) => {
                let region = self.alloc(Vec::new());
                Value::Pointer {
                    ty: *ty,
                    region,
                    offset: 0,
                }
            }
            Type::Void => Value::Void,
        }
    }

    fn exec_block(&mut self, frame: &mut Frame<'a>, body: &[Stmt]) -> InterpResult<Flow> {
        for stmt in body {
            if let Flow::Return(value) = self
                .exec_stmt(frame, stmt)
                .map_err(|e| e.at_if_unknown(stmt.span))?
            {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec_stmt(&mut self, frame: &mut Frame<'a>, stmt: &Stmt) -> InterpResult<Flow> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                self.assign(frame, target, value)?;
            }
            StmtKind::AugAssign { target, op, value } => {
                let place = self.place(frame, target)?;
                let current = self.load(frame, &place);
                let rhs = self.eval(frame, value)?;
                let result = self.binary(*op, current, rhs, value.span)?;
                let stored = self.cast(result, &place_type(&place), value.span)?;
                self.store(frame, &place, stored);
            }
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Constant(Literal::Str(_)) => {}
                ExprKind::Call { func, args, keywords } if is_construct(frame, func, Construct::Var) => {
                    self.declare_vars(frame, expr, args, keywords)?;
                }
                _ => {
                    self.eval(frame, expr)?;
                }
            },
            StmtKind::If { test, body, orelse } => {
                let cond = self.eval(frame, test)?;
                let branch = if self.truthy(cond, test.span)? { body } else { orelse };
                return self.exec_block(frame, branch);
            }
            StmtKind::For {
                target,
                target_span,
                iter,
                body,
            } => return self.exec_for(frame, target, *target_span, iter, body),
            StmtKind::While { test, body } => loop {
                let cond = self.eval(frame, test)?;
                if !self.truthy(cond, test.span)? {
                    break;
                }
                if let Flow::Return(value) = self.exec_block(frame, body)? {
                    return Ok(Flow::Return(value));
                }
            },
            StmtKind::Return(value) => return self.exec_return(frame, value.as_ref(), stmt.span),
            StmtKind::Pass => {}
            StmtKind::Unsupported { construct } => {
                return Err(CompileError::internal(
                    format!("{} statements are not supported", construct),
                    stmt.span,
                )
                .into())
            }
        }
        Ok(Flow::Next)
    }

    fn assign(&mut self, frame: &mut Frame<'a>, target: &Expr, value: &Expr) -> InterpResult<()> {
        if let Some(name) = target.as_name() {
            if frame.scope.local(name).is_none() && !frame.scope.globals().contains(name) {
                let rhs = self.eval(frame, value)?;
                let ty = match rhs.ty() {
                    Type::Void => {
                        return Err(CompileError::new(
                            ErrorKind::InvalidOperation,
                            format!("cannot assign a Void result to `{}`", name),
                            value.span,
                        )
                        .into())
                    }
                    Type::Array { elem, .. } => Type::UnboundedArray(elem),
                    ty => ty,
                };
                let rhs = self.cast(rhs, &ty, value.span)?;
                return self.declare(frame, name, ty, rhs, target.span);
            }
        }

        let rhs = self.eval(frame, value)?;
        let place = self.place(frame, target)?;
        let ty = place_type(&place);
        if let Type::Array { .. } = ty {
            return Err(CompileError::new(
                ErrorKind::InvalidOperation,
                "cannot assign to a bounded array as a whole",
                target.span,
            )
            .into());
        }
        let stored = self.cast(rhs, &ty, value.span)?;
        self.store(frame, &place, stored);
        Ok(())
    }

    fn declare_vars(&mut self, frame: &mut Frame<'a>, call: &Expr, args: &[Expr], keywords: &[Keyword]) -> InterpResult<()> {
        if let Some(extra) = args.first() {
            return Err(CompileError::invalid_construct(
                "var() takes only keyword declarations, as in var(x=Int)",
                extra.span,
            )
            .into());
        }
        if keywords.is_empty() {
            return Err(CompileError::invalid_construct("var() declares nothing", call.span).into());
        }
        for kw in keywords {
            let ty = frame
                .scope
                .globals()
                .resolve_type(&kw.value)
                .map_err(|e| e.at_if_unknown(kw.value.span))?;
            if ty.is_void() {
                return Err(CompileError::invalid_construct(
                    format!("cannot declare `{}` as Void", kw.name),
                    kw.span,
                )
                .into());
            }
            frame.scope.ensure_undeclared(&kw.name, kw.span)?;
            let value = self.zero(&ty);
            self.declare(frame, &kw.name, ty, value, kw.span)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        frame: &mut Frame<'a>,
        target: &str,
        target_span: Span,
        iter: &Expr,
        body: &[Stmt],
    ) -> InterpResult<Flow> {
        let (start, stop) = match &iter.kind {
            ExprKind::Call { func, args, keywords } if is_construct(frame, func, Construct::Range) => {
                if let Some(kw) = keywords.first() {
                    return Err(CompileError::invalid_construct(
                        format!("range() takes no keyword `{}`", kw.name),
                        kw.span,
                    )
                    .into());
                }
                match args.as_slice() {
                    [stop] => (None, stop),
                    [start, stop] => (Some(start), stop),
                    [_, _, step] => {
                        return Err(CompileError::invalid_construct(
                            "range() with a step is not supported",
                            step.span,
                        )
                        .into())
                    }
                    _ => {
                        return Err(CompileError::invalid_construct(
                            format!("range() takes 1 or 2 arguments, got {}", args.len()),
                            iter.span,
                        )
                        .into())
                    }
                }
            }
            _ => {
                return Err(CompileError::invalid_construct(
                    "only `for <name> in range(...)` loops are supported",
                    iter.span,
                )
                .into())
            }
        };

        frame.scope.ensure_undeclared(target, target_span)?;
        let start = match start {
            Some(e) => self.eval(frame, e)?,
            None => Value::Scalar(Scalar::I32(0)),
        };
        let stop_value = self.eval(frame, stop)?;
        let counter_ty = match coerce(&start.ty(), &stop_value.ty()) {
            Some(ty @ Type::Scalar(s)) if s.is_integer() => ty,
            _ => {
                return Err(CompileError::invalid_construct(
                    format!(
                        "range() bounds must be integers, got {} and {}",
                        start.ty(),
                        stop_value.ty()
                    ),
                    iter.span,
                )
                .into())
            }
        };
        let Type::Scalar(counter_kind) = counter_ty else {
            return Err(CompileError::internal("range counter is not a scalar", iter.span).into());
        };

        let initial = self.cast(start, &counter_ty, iter.span)?;
        self.declare(frame, target, counter_ty, initial, target_span)?;
        let slot = frame.slots.len() - 1;
        let stop = scalar_of(self.cast(stop_value, &counter_ty, stop.span)?, stop.span)?.as_i64();

        loop {
            let current = scalar_of(frame.slots[slot].clone(), iter.span)?.as_i64();
            if current >= stop {
                break;
            }
            if let Flow::Return(value) = self.exec_block(frame, body)? {
                return Ok(Flow::Return(value));
            }
            let current = scalar_of(frame.slots[slot].clone(), iter.span)?.as_i64();
            frame.slots[slot] = Value::Scalar(Scalar::I64(current.wrapping_add(1)).cast(counter_kind));
        }
        Ok(Flow::Next)
    }

    fn exec_return(&mut self, frame: &mut Frame<'a>, value: Option<&Expr>, span: Span) -> InterpResult<Flow> {
        let ret = frame.ret;
        match (value, ret) {
            (None, Type::Void) => Ok(Flow::Return(Value::Void)),
            (None, ty) => Err(CompileError::new(
                ErrorKind::InvalidReturn,
                format!("bare return in a function returning {}", ty),
                span,
            )
            .into()),
            (Some(e), Type::Void) => Err(CompileError::new(
                ErrorKind::InvalidReturn,
                "returning a value from a Void function",
                e.span,
            )
            .into()),
            (Some(e), ty) => {
                let result = self.eval(frame, e)?;
                if !castable(&result.ty(), &ty) {
                    return Err(CompileError::new(
                        ErrorKind::InvalidReturn,
                        format!("cannot return {} from a function returning {}", result.ty(), ty),
                        e.span,
                    )
                    .into());
                }
                Ok(Flow::Return(self.cast(result, &ty, e.span)?))
            }
        }
    }

    fn eval(&mut self, frame: &mut Frame<'a>, expr: &Expr) -> InterpResult<Value> {
        let span = expr.span;
        let result = match &expr.kind {
            ExprKind::Constant(lit) => constant(lit, span),
            ExprKind::Name(name) => match frame.scope.resolve(name, span)? {
                Resolved::Local(binding) => Ok(frame.slots[binding.storage].clone()),
                Resolved::Global(GlobalSymbol::Constant(c)) => Ok(Value::Scalar(*c)),
                Resolved::Global(GlobalSymbol::Function(_)) => Err(CompileError::new(
                    ErrorKind::InvalidOperation,
                    format!("function `{}` can only be called", name),
                    span,
                )
                .into()),
                Resolved::Global(_) => {
                    Err(CompileError::invalid_construct(format!("`{}` is not a value", name), span).into())
                }
            },
            ExprKind::BinOp { op, lhs, rhs } => {
                let l = self.eval(frame, lhs)?;
                let r = self.eval(frame, rhs)?;
                self.binary(*op, l, r, span)
            }
            ExprKind::Compare { op, lhs, rhs } => {
                let l = self.eval(frame, lhs)?;
                let r = self.eval(frame, rhs)?;
                self.compare(*op, l, r, span)
            }
            ExprKind::UnaryOp { op, operand } => {
                let value = self.eval(frame, operand)?;
                self.unary(*op, value, operand.span, span)
            }
            ExprKind::BoolOp { op, lhs, rhs } => {
                let l = self.eval(frame, lhs)?;
                let left = self.truthy(l, lhs.span)?;
                let result = match (op, left) {
                    (BoolOp::And, false) => false,
                    (BoolOp::Or, true) => true,
                    _ => {
                        let r = self.eval(frame, rhs)?;
                        self.truthy(r, rhs.span)?
                    }
                };
                Ok(Value::Scalar(Scalar::Bool(result)))
            }
            ExprKind::Call { func, args, keywords } => self.eval_call(frame, expr, func, args, keywords),
            ExprKind::Subscript { value, index } => self.eval_subscript(frame, value, index, span),
            ExprKind::Unsupported { construct } => Err(CompileError::internal(
                format!("{} expressions are not supported", construct),
                span,
            )
            .into()),
        };
        result.map_err(|e| e.at_if_unknown(span))
    }

    fn eval_call(
        &mut self,
        frame: &mut Frame<'a>,
        call: &Expr,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> InterpResult<Value> {
        let Some(name) = func.as_name() else {
            return Err(CompileError::new(ErrorKind::InvalidCall, "only named functions can be called", func.span).into());
        };
        let symbol = match frame.scope.resolve(name, func.span)? {
            Resolved::Local(_) => {
                return Err(CompileError::new(
                    ErrorKind::InvalidCall,
                    format!("local `{}` is not callable", name),
                    func.span,
                )
                .into())
            }
            Resolved::Global(symbol) => symbol.clone(),
        };

        match symbol {
            GlobalSymbol::Function(fref) => self.call_function(frame, &fref, call, args, keywords),
            GlobalSymbol::Type(Type::Void) => {
                Err(CompileError::new(ErrorKind::InvalidCall, "Void cannot be called", func.span).into())
            }
            GlobalSymbol::Type(ty) => {
                let [arg] = args else {
                    return Err(CompileError::new(
                        ErrorKind::InvalidCall,
                        format!("cast to {} takes exactly one argument", ty),
                        call.span,
                    )
                    .into());
                };
                if let Some(kw) = keywords.first() {
                    return Err(CompileError::new(
                        ErrorKind::InvalidCall,
                        format!("cast to {} takes no keyword `{}`", ty, kw.name),
                        kw.span,
                    )
                    .into());
                }
                let value = self.eval(frame, arg)?;
                self.cast(value, &ty, call.span)
            }
            GlobalSymbol::TypeConstructor(_) => Err(CompileError::invalid_construct(
                format!("`{}(...)` is only valid as a type in var()", name),
                call.span,
            )
            .into()),
            GlobalSymbol::Construct(_) => Err(CompileError::invalid_construct(
                format!("`{}(...)` cannot be used as an expression", name),
                call.span,
            )
            .into()),
            GlobalSymbol::Constant(_) => Err(CompileError::new(
                ErrorKind::InvalidCall,
                format!("constant `{}` is not callable", name),
                func.span,
            )
            .into()),
        }
    }

    fn call_function(
        &mut self,
        frame: &mut Frame<'a>,
        fref: &FunctionRef,
        call: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> InterpResult<Value> {
        if let Some(kw) = keywords.first() {
            return Err(CompileError::new(
                ErrorKind::InvalidCall,
                format!("keyword argument `{}` is not supported", kw.name),
                kw.span,
            )
            .into());
        }
        if args.len() != fref.sig.params.len() {
            return Err(CompileError::new(
                ErrorKind::InvalidCall,
                format!(
                    "`{}` takes {} argument(s), got {}",
                    fref.symbol,
                    fref.sig.params.len(),
                    args.len()
                ),
                call.span,
            )
            .into());
        }
        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&fref.sig.params) {
            let value = self.eval(frame, arg)?;
            values.push(self.cast(value, param, arg.span)?);
        }

        if fref.builtin {
            return builtin(fref, &values, call.span);
        }
        self.call(fref.id, values, call.span)
    }

    fn eval_subscript(&mut self, frame: &mut Frame<'a>, value: &Expr, index: &Index, span: Span) -> InterpResult<Value> {
        let container = self.eval(frame, value)?;
        let ty = container.ty();
        match index {
            Index::Single(i) => {
                let idx = self.eval(frame, i)?;
                let position = index_of(&idx, i.span)?;
                match container {
                    Value::Vector { lanes, .. } => lane_index(position, lanes.len(), i.span)
                        .map(|lane| Value::Scalar(lanes[lane])),
                    Value::Pointer { region, offset, .. } => {
                        let at = self.element_index(region, offset, position, i.span)?;
                        Ok(Value::Scalar(self.regions[region][at]))
                    }
                    _ => Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        format!("{} cannot be subscripted", ty),
                        value.span,
                    )
                    .into()),
                }
            }
            Index::Slice { lower, upper } => {
                if let Some(upper) = upper {
                    return Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        "slices with an upper bound are not supported",
                        upper.span,
                    )
                    .into());
                }
                let Value::Pointer { region, offset, .. } = container else {
                    return Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        format!("{} cannot be sliced", ty),
                        value.span,
                    )
                    .into());
                };
                let elem = ty
                    .element()
                    .ok_or_else(|| CompileError::internal(format!("{} has no element type", ty), span))?;
                let lower = match lower {
                    Some(lower) => {
                        let idx = self.eval(frame, lower)?;
                        index_of(&idx, lower.span)?
                    }
                    None => 0,
                };
                let start = offset as i64 + lower;
                if start < 0 {
                    return Err(InterpError::OutOfBounds {
                        index: lower,
                        len: self.regions[region].len(),
                        span,
                    });
                }
                Ok(Value::Pointer {
                    ty: Type::Slice(elem),
                    region,
                    offset: start as usize,
                })
            }
        }
    }

    fn element_index(&self, region: usize, offset: usize, position: i64, span: Span) -> InterpResult<usize> {
        let len = self.regions[region].len();
        let at = offset as i64 + position;
        if at < 0 || at as usize >= len {
            return Err(InterpError::OutOfBounds {
                index: position,
                len: len.saturating_sub(offset),
                span,
            });
        }
        Ok(at as usize)
    }

    fn place(&mut self, frame: &mut Frame<'a>, target: &Expr) -> InterpResult<Place> {
        match &target.kind {
            ExprKind::Name(name) => match frame.scope.resolve(name, target.span)? {
                Resolved::Local(binding) => Ok(Place::Slot {
                    index: binding.storage,
                    ty: binding.ty,
                }),
                Resolved::Global(_) => Err(CompileError::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot assign to global `{}`", name),
                    target.span,
                )
                .into()),
            },
            ExprKind::Subscript { index, .. } if matches!(**index, Index::Slice { .. }) => {
                Err(CompileError::new(ErrorKind::InvalidSubscript, "cannot assign to a slice", target.span).into())
            }
            ExprKind::Subscript { value, index } => {
                let Index::Single(i) = &**index else {
                    return Err(CompileError::internal("slice target", target.span).into());
                };
                let container = self.eval(frame, value)?;
                let idx = self.eval(frame, i)?;
                let position = index_of(&idx, i.span)?;

                let local_vector = value
                    .as_name()
                    .and_then(|n| frame.scope.local(n))
                    .filter(|b| b.ty.is_vector())
                    .map(|b| b.storage);
                match (container, local_vector) {
                    (Value::Vector { elem, lanes }, Some(slot)) => Ok(Place::Lane {
                        slot,
                        lane: lane_index(position, lanes.len(), i.span)?,
                        elem,
                    }),
                    (Value::Vector { .. }, None) => Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        "cannot assign to a lane of a temporary vector",
                        target.span,
                    )
                    .into()),
                    (Value::Pointer { ty, region, offset }, _) => {
                        let elem = ty.element().ok_or_else(|| {
                            CompileError::internal(format!("{} has no element type", ty), target.span)
                        })?;
                        let index = self.element_index(region, offset, position, i.span)?;
                        Ok(Place::Element { region, index, elem })
                    }
                    (other, _) => Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        format!("{} cannot be subscripted", other.ty()),
                        value.span,
                    )
                    .into()),
                }
            }
            _ => Err(CompileError::new(
                ErrorKind::InvalidOperation,
                "cannot assign to this expression",
                target.span,
            )
            .into()),
        }
    }

    fn load(&self, frame: &Frame<'a>, place: &Place) -> Value {
        match *place {
            Place::Slot { index, .. } => frame.slots[index].clone(),
            Place::Lane { slot, lane, elem } => match &frame.slots[slot] {
                Value::Vector { lanes, .. } => Value::Scalar(lanes[lane]),
                _ => Value::Scalar(Scalar::zero(elem)),
            },
            Place::Element { region, index, .. } => Value::Scalar(self.regions[region][index]),
        }
    }

    fn store(&mut self, frame: &mut Frame<'a>, place: &Place, value: Value) {
        match (*place, value) {
            (Place::Slot { index, .. }, value) => frame.slots[index] = value,
            (Place::Lane { slot, lane, .. }, Value::Scalar(s)) => {
                if let Value::Vector { lanes, .. } = &mut frame.slots[slot] {
                    lanes[lane] = s;
                }
            }
            (Place::Element { region, index, .. }, Value::Scalar(s)) => self.regions[region][index] = s,
            _ => {}
        }
    }

    fn truthy(&self, value: Value, span: Span) -> InterpResult<bool> {
        match self.cast(value, &Type::BOOL, span)? {
            Value::Scalar(Scalar::Bool(b)) => Ok(b),
            other => Err(CompileError::invalid_cast(other.ty(), Type::BOOL, span).into()),
        }
    }

    fn cast(&self, value: Value, to: &Type, span: Span) -> InterpResult<Value> {
        let from = value.ty();
        if !castable(&from, to) {
            return Err(CompileError::invalid_cast(from, to, span).into());
        }
        match (value, *to) {
            (value, _) if from == *to => Ok(value),
            (Value::Scalar(s), Type::Scalar(t)) => Ok(Value::Scalar(s.cast(t))),
            (Value::Scalar(s), Type::Vector { elem, count }) => Ok(Value::Vector {
                elem,
                lanes: vec![s.cast(elem); count as usize],
            }),
            (Value::Pointer { region, offset, .. }, ty) => Ok(Value::Pointer { ty, region, offset }),
            (value, _) => Err(CompileError::internal(
                format!("no conversion of {} to {}", value.ty(), to),
                span,
            )
            .into()),
        }
    }

    fn binary(&self, op: BinOp, lhs: Value, rhs: Value, span: Span) -> InterpResult<Value> {
        let (lt, rt) = (lhs.ty(), rhs.ty());
        let ty = coerce(&lt, &rt).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidCast,
                format!("no common type for {} {} {}", lt, op.symbol(), rt),
                span,
            )
        })?;
        if ty.operand_kind().is_none() {
            return Err(undefined_for_type(op.symbol(), &ty, span).into());
        }
        match (self.cast(lhs, &ty, span)?, self.cast(rhs, &ty, span)?) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(binary_scalar(op, a, b, span)?)),
            (Value::Vector { elem, lanes: a }, Value::Vector { lanes: b, .. }) => {
                let lanes = a
                    .into_iter()
                    .zip(b)
                    .map(|(x, y)| binary_scalar(op, x, y, span))
                    .collect::<InterpResult<Vec<_>>>()?;
                Ok(Value::Vector { elem, lanes })
            }
            _ => Err(CompileError::internal("operand shapes differ after coercion", span).into()),
        }
    }

    fn compare(&self, op: CmpOp, lhs: Value, rhs: Value, span: Span) -> InterpResult<Value> {
        let (lt, rt) = (lhs.ty(), rhs.ty());
        let ty = coerce(&lt, &rt).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidCast,
                format!("no common type for {} {} {}", lt, op.symbol(), rt),
                span,
            )
        })?;
        if !matches!(ty, Type::Scalar(_)) {
            return Err(CompileError::new(
                ErrorKind::InvalidOperation,
                format!("comparisons are defined on scalars only, not {}", ty),
                span,
            )
            .into());
        }
        match (self.cast(lhs, &ty, span)?, self.cast(rhs, &ty, span)?) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(Scalar::Bool(compare_scalar(op, a, b, span)?))),
            _ => Err(CompileError::internal("comparison operands are not scalars", span).into()),
        }
    }

    fn unary(&self, op: UnaryOp, value: Value, operand_span: Span, span: Span) -> InterpResult<Value> {
        if op == UnaryOp::Not {
            let flag = self.truthy(value, operand_span)?;
            return Ok(Value::Scalar(Scalar::Bool(!flag)));
        }
        match value {
            Value::Scalar(s) => Ok(Value::Scalar(unary_scalar(op, s, span)?)),
            Value::Vector { elem, lanes } => {
                let lanes = lanes
                    .into_iter()
                    .map(|s| unary_scalar(op, s, span))
                    .collect::<InterpResult<Vec<_>>>()?;
                Ok(Value::Vector { elem, lanes })
            }
            other => Err(undefined_for_type(op.symbol(), &other.ty(), span).into()),
        }
    }
}

fn is_construct(frame: &Frame<'_>, func: &Expr, which: Construct) -> bool {
    let Some(name) = func.as_name() else {
        return false;
    };
    matches!(
        frame.scope.resolve(name, func.span),
        Ok(Resolved::Global(GlobalSymbol::Construct(c))) if *c == which
    )
}

fn place_type(place: &Place) -> Type {
    match *place {
        Place::Slot { ty, .. } => ty,
        Place::Lane { elem, .. } | Place::Element { elem, .. } => Type::Scalar(elem),
    }
}

fn constant(lit: &Literal, span: Span) -> InterpResult<Value> {
    let value = match (lit, literal_type(lit)) {
        (Literal::Int(i), Some(ScalarType::Int32)) => Scalar::I32(*i as i32),
        (Literal::Int(i), _) => Scalar::I64(*i),
        (Literal::Real(r), _) => Scalar::F64(*r),
        (Literal::Bool(b), _) => Scalar::Bool(*b),
        (Literal::Str(_), _) => {
            return Err(CompileError::internal("string literals are not supported", span).into())
        }
    };
    Ok(Value::Scalar(value))
}

fn scalar_of(value: Value, span: Span) -> InterpResult<Scalar> {
    match value {
        Value::Scalar(s) => Ok(s),
        other => Err(CompileError::internal(format!("expected a scalar, got {}", other.ty()), span).into()),
    }
}

fn index_of(idx: &Value, span: Span) -> InterpResult<i64> {
    match idx {
        Value::Scalar(s) if s.ty().is_integer() => Ok(s.as_i64()),
        other => Err(CompileError::new(
            ErrorKind::InvalidSubscript,
            format!("index must be an integer, got {}", other.ty()),
            span,
        )
        .into()),
    }
}

fn lane_index(position: i64, lanes: usize, span: Span) -> InterpResult<usize> {
    if position < 0 || position as usize >= lanes {
        return Err(InterpError::OutOfBounds {
            index: position,
            len: lanes,
            span,
        });
    }
    Ok(position as usize)
}

fn undefined_for(symbol: &str, kind: &str, span: Span) -> CompileError {
    CompileError::new(
        ErrorKind::InvalidOperation,
        format!("operator `{}` is not defined for {} operands", symbol, kind),
        span,
    )
}

fn undefined_for_type(symbol: &str, ty: &Type, span: Span) -> CompileError {
    CompileError::new(
        ErrorKind::InvalidOperation,
        format!("operator `{}` is not defined for {}", symbol, ty),
        span,
    )
}

fn binary_scalar(op: BinOp, a: Scalar, b: Scalar, span: Span) -> InterpResult<Scalar> {
    let ty = a.ty();
    if ty.is_bool() {
        let (x, y) = (a.is_truthy(), b.is_truthy());
        return match op {
            BinOp::BitAnd => Ok(Scalar::Bool(x & y)),
            BinOp::BitOr => Ok(Scalar::Bool(x | y)),
            BinOp::BitXor => Ok(Scalar::Bool(x ^ y)),
            _ => Err(undefined_for(op.symbol(), "Bool", span).into()),
        };
    }
    if let (Scalar::F32(x), Scalar::F32(y)) = (a, b) {
        return real_binary(op, x, y, span).map(Scalar::F32);
    }
    if ty.is_real() {
        return real_binary(op, a.as_f64(), b.as_f64(), span).map(Scalar::F64);
    }

    let (x, y) = (a.as_i64(), b.as_i64());
    let v = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div | BinOp::Mod if y == 0 => return Err(InterpError::DivisionByZero(span)),
        BinOp::Div => x.wrapping_div(y),
        BinOp::Mod => x.wrapping_rem(y),
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::Shl => x.wrapping_shl(y as u32),
        BinOp::Shr => x.wrapping_shr(y as u32),
    };
    Ok(Scalar::I64(v).cast(ty))
}

fn real_binary<F>(op: BinOp, x: F, y: F, span: Span) -> InterpResult<F>
where
    F: std::ops::Add<Output = F>
        + std::ops::Sub<Output = F>
        + std::ops::Mul<Output = F>
        + std::ops::Div<Output = F>
        + std::ops::Rem<Output = F>,
{
    match op {
        BinOp::Add => Ok(x + y),
        BinOp::Sub => Ok(x - y),
        BinOp::Mul => Ok(x * y),
        BinOp::Div => Ok(x / y),
        BinOp::Mod => Ok(x % y),
        _ => Err(undefined_for(op.symbol(), "real", span).into()),
    }
}

fn compare_scalar(op: CmpOp, a: Scalar, b: Scalar, span: Span) -> InterpResult<bool> {
    let ty = a.ty();
    if ty.is_bool() {
        let (x, y) = (a.is_truthy(), b.is_truthy());
        return match op {
            CmpOp::Eq => Ok(x == y),
            CmpOp::NotEq => Ok(x != y),
            _ => Err(undefined_for(op.symbol(), "Bool", span).into()),
        };
    }
    if ty.is_real() {
        let (x, y) = (a.as_f64(), b.as_f64());
        return Ok(match op {
            CmpOp::Eq => x == y,
            CmpOp::NotEq => x != y,
            CmpOp::Lt => x < y,
            CmpOp::LtE => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::GtE => x >= y,
        });
    }
    let (x, y) = (a.as_i64(), b.as_i64());
    Ok(match op {
        CmpOp::Eq => x == y,
        CmpOp::NotEq => x != y,
        CmpOp::Lt => x < y,
        CmpOp::LtE => x <= y,
        CmpOp::Gt => x > y,
        CmpOp::GtE => x >= y,
    })
}

fn unary_scalar(op: UnaryOp, s: Scalar, span: Span) -> InterpResult<Scalar> {
    let ty = s.ty();
    let kind = if ty.is_bool() {
        "Bool"
    } else if ty.is_real() {
        "real"
    } else {
        "integer"
    };
    match (op, s) {
        (_, Scalar::Bool(_)) => Err(undefined_for(op.symbol(), kind, span).into()),
        (UnaryOp::Plus, s) => Ok(s),
        (UnaryOp::Neg, Scalar::F32(v)) => Ok(Scalar::F32(-v)),
        (UnaryOp::Neg, Scalar::F64(v)) => Ok(Scalar::F64(-v)),
        (UnaryOp::Neg, s) => Ok(Scalar::I64(s.as_i64().wrapping_neg()).cast(ty)),
        (UnaryOp::Invert, s) if ty.is_integer() => Ok(Scalar::I64(!s.as_i64()).cast(ty)),
        _ => Err(undefined_for(op.symbol(), kind, span).into()),
    }
}

/// Rust implementations of the C math routines declared as builtins.
fn builtin(fref: &FunctionRef, args: &[Value], span: Span) -> InterpResult<Value> {
    let xs = args
        .iter()
        .map(|v| scalar_of(v.clone(), span))
        .collect::<InterpResult<Vec<_>>>()?;
    let unknown = || InterpError::UnknownBuiltin(fref.symbol.clone());

    if fref.symbol == "putchar" {
        let [c] = xs.as_slice() else {
            return Err(unknown());
        };
        // The byte written, or EOF.
        let code = c.as_i64() as u8;
        let mut out = std::io::stdout();
        let written = out.write_all(&[code]).and_then(|()| out.flush()).is_ok();
        let result = if written { i32::from(code) } else { -1 };
        return Ok(Value::Scalar(Scalar::I32(result)));
    }

    let result = match fref.sig.ret {
        Type::FLOAT => {
            let name = fref.symbol.strip_suffix('f').ok_or_else(unknown)?;
            let xs: Vec<f32> = xs.iter().map(|x| x.as_f64() as f32).collect();
            Scalar::F32(math_f32(name, &xs).ok_or_else(unknown)?)
        }
        Type::DOUBLE => {
            let xs: Vec<f64> = xs.iter().map(|x| x.as_f64()).collect();
            Scalar::F64(math_f64(&fref.symbol, &xs).ok_or_else(unknown)?)
        }
        _ => return Err(unknown()),
    };
    Ok(Value::Scalar(result))
}

// Rust counterparts of the C math routines, one set per real width.
macro_rules! libm {
    ($name:ident, $t:ty) => {
        fn $name(symbol: &str, xs: &[$t]) -> Option<$t> {
            Some(match (symbol, xs) {
                ("sin", [x]) => x.sin(),
                ("cos", [x]) => x.cos(),
                ("tan", [x]) => x.tan(),
                ("asin", [x]) => x.asin(),
                ("acos", [x]) => x.acos(),
                ("atan", [x]) => x.atan(),
                ("sinh", [x]) => x.sinh(),
                ("cosh", [x]) => x.cosh(),
                ("tanh", [x]) => x.tanh(),
                ("sqrt", [x]) => x.sqrt(),
                ("exp", [x]) => x.exp(),
                ("log", [x]) => x.ln(),
                ("log10", [x]) => x.log10(),
                ("fabs", [x]) => x.abs(),
                ("ceil", [x]) => x.ceil(),
                ("floor", [x]) => x.floor(),
                ("pow", [x, y]) => x.powf(*y),
                _ => return None,
            })
        }
    };
}

libm!(math_f64, f64);
libm!(math_f32, f32);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::BinOp;
    use bumpalo::Bump;

    struct Table {
        globals: Globals,
        defs: Vec<(FunctionDef, Signature)>,
    }

    impl Table {
        fn new() -> Self {
            Self {
                globals: Globals::prelude(),
                defs: Vec::new(),
            }
        }

        fn add(&mut self, def: FunctionDef, ret: Type, params: Vec<Type>) -> usize {
            let id = self.defs.len();
            let sig = Signature::new(ret, params);
            self.globals.insert(
                def.name.clone(),
                GlobalSymbol::Function(FunctionRef {
                    id,
                    symbol: def.name.clone(),
                    sig: sig.clone(),
                    builtin: false,
                }),
            );
            self.defs.push((def, sig));
            id
        }
    }

    impl FunctionSource for Table {
        fn globals(&self) -> &Globals {
            &self.globals
        }

        fn definition(&self, id: usize) -> Option<(&FunctionDef, &Signature)> {
            self.defs.get(id).map(|(d, s)| (d, s))
        }

        fn function_name(&self, id: usize) -> Option<&str> {
            self.defs.get(id).map(|(d, _)| d.name.as_str())
        }
    }

    fn run(table: &Table, id: usize, args: &mut [Arg<'_>]) -> InterpResult<Option<Scalar>> {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        Interpreter::new(table, &session).with_max_depth(16).run(id, args)
    }

    #[test]
    fn test_recursive_factorial() {
        let mut table = Table::new();
        let fact = table.add(
            func(
                "fact",
                &["n"],
                vec![
                    if_(le(name("n"), int(1)), vec![ret(int(1))], vec![]),
                    ret(mul(name("n"), call("fact", vec![sub(name("n"), int(1))]))),
                ],
            ),
            Type::INT,
            vec![Type::INT],
        );
        assert_eq!(run(&table, fact, &mut [6i32.into()]).unwrap(), Some(Scalar::I32(720)));
    }

    #[test]
    fn test_range_loop_accumulates() {
        let mut table = Table::new();
        let sum = table.add(
            func(
                "sum_range",
                &["n"],
                vec![
                    assign(name("res"), int(0)),
                    for_range("i", vec![name("n")], vec![aug(name("res"), BinOp::Add, name("i"))]),
                    ret(name("res")),
                ],
            ),
            Type::INT,
            vec![Type::INT],
        );
        assert_eq!(run(&table, sum, &mut [5i32.into()]).unwrap(), Some(Scalar::I32(10)));
        assert_eq!(run(&table, sum, &mut [0i32.into()]).unwrap(), Some(Scalar::I32(0)));
    }

    #[test]
    fn test_integer_arithmetic_wraps_at_operand_width() {
        let mut table = Table::new();
        let inc = table.add(
            func("inc", &["x"], vec![ret(add(name("x"), int(1)))]),
            Type::INT,
            vec![Type::INT],
        );
        assert_eq!(
            run(&table, inc, &mut [i32::MAX.into()]).unwrap(),
            Some(Scalar::I32(i32::MIN))
        );
    }

    #[test]
    fn test_division_by_zero_is_reported() {
        let mut table = Table::new();
        let quot = table.add(
            func("quot", &["a", "b"], vec![ret(div(name("a"), name("b")))]),
            Type::INT,
            vec![Type::INT, Type::INT],
        );
        assert_eq!(run(&table, quot, &mut [7i32.into(), (-2i32).into()]).unwrap(), Some(Scalar::I32(-3)));
        assert!(matches!(
            run(&table, quot, &mut [1i32.into(), 0i32.into()]),
            Err(InterpError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_array_writes_reach_the_host_buffer() {
        let mut table = Table::new();
        let fill = table.add(
            func(
                "fill",
                &["a", "n"],
                vec![for_range(
                    "i",
                    vec![name("n")],
                    vec![assign(index(name("a"), name("i")), mul(name("i"), int(2)))],
                )],
            ),
            Type::Void,
            vec![Type::UnboundedArray(ScalarType::Int32), Type::INT],
        );
        let mut buffer = [0i32; 4];
        let result = run(&table, fill, &mut [Arg::from(&mut buffer[..]), 4i32.into()]).unwrap();
        assert_eq!(result, None);
        assert_eq!(buffer, [0, 2, 4, 6]);
    }

    #[test]
    fn test_out_of_bounds_index() {
        let mut table = Table::new();
        let get = table.add(
            func("get", &["a", "i"], vec![ret(index(name("a"), name("i")))]),
            Type::INT,
            vec![Type::UnboundedArray(ScalarType::Int32), Type::INT],
        );
        let mut buffer = [1i32, 2, 3];
        assert!(matches!(
            run(&table, get, &mut [Arg::from(&mut buffer[..]), 3i32.into()]),
            Err(InterpError::OutOfBounds { index: 3, len: 3, .. })
        ));
    }

    #[test]
    fn test_vector_lanes() {
        let mut table = Table::new();
        let lanes = table.add(
            func(
                "lanes",
                &[],
                vec![
                    var(vec![("v", call("Vector", vec![name("Int"), int(4)]))]),
                    assign(index(name("v"), int(1)), int(5)),
                    aug(name("v"), BinOp::Add, int(1)),
                    ret(add(index(name("v"), int(1)), index(name("v"), int(0)))),
                ],
            ),
            Type::INT,
            vec![],
        );
        assert_eq!(run(&table, lanes, &mut []).unwrap(), Some(Scalar::I32(7)));
    }

    #[test]
    fn test_missing_return_is_a_compile_error() {
        let mut table = Table::new();
        let f = table.add(func("f", &["x"], vec![pass()]), Type::INT, vec![Type::INT]);
        match run(&table, f, &mut [1i32.into()]) {
            Err(InterpError::Compile(err)) => assert!(err.is_due_to(ErrorKind::MissingReturn)),
            other => panic!("expected MissingReturn, got {:?}", other),
        }
    }

    #[test]
    fn test_unbounded_recursion_hits_depth_limit() {
        let mut table = Table::new();
        let f = table.add(
            func("f", &["n"], vec![ret(call("f", vec![add(name("n"), int(1))]))]),
            Type::INT,
            vec![Type::INT],
        );
        assert!(matches!(
            run(&table, f, &mut [0i32.into()]),
            Err(InterpError::CallDepth(16))
        ));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let mut table = Table::new();
        let guard = table.add(
            func(
                "guard",
                &["d"],
                vec![if_(
                    or(eq(name("d"), int(0)), gt(div(int(1), name("d")), int(0))),
                    vec![ret(int(1))],
                    vec![ret(int(0))],
                )],
            ),
            Type::INT,
            vec![Type::INT],
        );
        assert_eq!(run(&table, guard, &mut [0i32.into()]).unwrap(), Some(Scalar::I32(1)));
        assert_eq!(run(&table, guard, &mut [2i32.into()]).unwrap(), Some(Scalar::I32(0)));
    }
}
