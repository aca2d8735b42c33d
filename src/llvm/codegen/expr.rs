//! Expression lowering.

use inkwell::module::Linkage;
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, IntValue};

use crate::ast::{BinOp, BoolOp, CmpOp, Expr, ExprKind, Index, Keyword, Literal, Span, UnaryOp};
use crate::core::error::{CompileError, CompileResult, ErrorKind};
use crate::core::scope::Resolved;
use crate::types::prelude::FunctionRef;
use crate::types::{coerce, literal_type, GlobalSymbol, Scalar, ScalarType, Type};

use super::super::ops::ops_for;
use super::super::types;
use super::super::value::{Slot, TypedValue};
use super::FunctionCompiler;

impl<'a, 'ctx, 'arena: 'a> FunctionCompiler<'a, 'ctx, 'arena> {
    pub(super) fn visit_expr(&mut self, expr: &Expr) -> CompileResult<TypedValue<'ctx>> {
        let span = expr.span;
        let result = match &expr.kind {
            ExprKind::Constant(lit) => constant(lit, span),
            ExprKind::Name(name) => self.visit_name(name, span),
            ExprKind::BinOp { op, lhs, rhs } => {
                let l = self.visit_expr(lhs)?;
                let r = self.visit_expr(rhs)?;
                self.binary(*op, l, r, span)
            }
            ExprKind::Compare { op, lhs, rhs } => self.visit_compare(*op, lhs, rhs, span),
            ExprKind::UnaryOp { op, operand } => self.visit_unary(*op, operand, span),
            ExprKind::BoolOp { op, lhs, rhs } => self.visit_bool_op(*op, lhs, rhs),
            ExprKind::Call { func, args, keywords } => self.visit_call(expr, func, args, keywords),
            ExprKind::Subscript { value, index } => self.visit_subscript(value, index, span),
            ExprKind::Unsupported { construct } => Err(CompileError::internal(
                format!("{} expressions are not supported", construct),
                span,
            )),
        };
        result.map_err(|e| e.at_if_unknown(span))
    }

    fn visit_name(&self, name: &str, span: Span) -> CompileResult<TypedValue<'ctx>> {
        match self.scope.resolve(name, span)? {
            Resolved::Local(binding) => Ok(TypedValue::Variable {
                ty: binding.ty,
                ptr: binding.storage,
            }),
            Resolved::Global(GlobalSymbol::Constant(c)) => Ok(TypedValue::Constant(*c)),
            Resolved::Global(GlobalSymbol::Function(_)) => Err(CompileError::new(
                ErrorKind::InvalidOperation,
                format!("function `{}` can only be called", name),
                span,
            )),
            Resolved::Global(_) => Err(CompileError::invalid_construct(
                format!("`{}` is not a value", name),
                span,
            )),
        }
    }

    /// Arithmetic and bitwise operators on coerced operands.
    pub(super) fn binary(
        &mut self,
        op: BinOp,
        lhs: TypedValue<'ctx>,
        rhs: TypedValue<'ctx>,
        span: Span,
    ) -> CompileResult<TypedValue<'ctx>> {
        let ty = self.common_type(&lhs, &rhs, op.symbol(), span)?;
        let kind = operand_kind(&ty, op.symbol(), span)?;
        let l = self.cast(&lhs, &ty, span)?;
        let r = self.cast(&rhs, &ty, span)?;
        let value = ops_for(kind).binary(self.emitter(), op, l, r, span)?;
        Ok(TypedValue::temp(ty, value))
    }

    fn visit_compare(&mut self, op: CmpOp, lhs: &Expr, rhs: &Expr, span: Span) -> CompileResult<TypedValue<'ctx>> {
        let l = self.visit_expr(lhs)?;
        let r = self.visit_expr(rhs)?;
        let ty = self.common_type(&l, &r, op.symbol(), span)?;
        let Type::Scalar(kind) = ty else {
            return Err(CompileError::new(
                ErrorKind::InvalidOperation,
                format!("comparisons are defined on scalars only, not {}", ty),
                span,
            ));
        };
        let lv = self.cast(&l, &ty, span)?;
        let rv = self.cast(&r, &ty, span)?;
        let flag = ops_for(kind).compare(self.emitter(), op, lv, rv, span)?;
        Ok(TypedValue::scalar_temp(ScalarType::Bool, flag.into()))
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> CompileResult<TypedValue<'ctx>> {
        let value = self.visit_expr(operand)?;
        if op == UnaryOp::Not {
            let flag = self.to_bool(&value, operand.span)?;
            let negated = self.builder.build_not(flag, "not")?;
            return Ok(TypedValue::scalar_temp(ScalarType::Bool, negated.into()));
        }
        let ty = value.ty();
        let kind = operand_kind(&ty, op.symbol(), span)?;
        let raw = value.materialize(self.emitter())?;
        let result = ops_for(kind).unary(self.emitter(), op, raw, span)?;
        Ok(TypedValue::temp(ty, result))
    }

    /// Short-circuit `and`/`or`, merging the two outcomes with a phi.
    fn visit_bool_op(&mut self, op: BoolOp, lhs: &Expr, rhs: &Expr) -> CompileResult<TypedValue<'ctx>> {
        let l = self.visit_expr(lhs)?;
        let left_flag = self.to_bool(&l, lhs.span)?;
        let left_end = self.emitter().current_block()?;

        let right_bb = self.append_block("bool_right")?;
        let merge_bb = self.append_block("bool_result")?;
        match op {
            BoolOp::And => self.builder.build_conditional_branch(left_flag, right_bb, merge_bb)?,
            BoolOp::Or => self.builder.build_conditional_branch(left_flag, merge_bb, right_bb)?,
        };

        self.builder.position_at_end(right_bb);
        let r = self.visit_expr(rhs)?;
        let right_flag = self.to_bool(&r, rhs.span)?;
        let right_end = self.emitter().current_block()?;
        self.builder.build_unconditional_branch(merge_bb)?;

        self.builder.position_at_end(merge_bb);
        let bool_type = self.context.bool_type();
        let short_circuit = bool_type.const_int(u64::from(op == BoolOp::Or), false);
        let phi = self.builder.build_phi(bool_type, "bool")?;
        phi.add_incoming(&[(&short_circuit, left_end), (&right_flag, right_end)]);
        Ok(TypedValue::scalar_temp(ScalarType::Bool, phi.as_basic_value()))
    }

    fn visit_call(
        &mut self,
        call: &Expr,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> CompileResult<TypedValue<'ctx>> {
        let Some(name) = func.as_name() else {
            return Err(CompileError::new(
                ErrorKind::InvalidCall,
                "only named functions can be called",
                func.span,
            ));
        };
        let symbol = match self.scope.resolve(name, func.span)? {
            Resolved::Local(_) => {
                return Err(CompileError::new(
                    ErrorKind::InvalidCall,
                    format!("local `{}` is not callable", name),
                    func.span,
                ))
            }
            Resolved::Global(symbol) => symbol.clone(),
        };

        match symbol {
            GlobalSymbol::Function(fref) => self.emit_call(&fref, call, args, keywords),
            GlobalSymbol::Type(Type::Void) => Err(CompileError::new(
                ErrorKind::InvalidCall,
                "Void cannot be called",
                func.span,
            )),
            GlobalSymbol::Type(ty) => {
                let [arg] = args else {
                    return Err(CompileError::new(
                        ErrorKind::InvalidCall,
                        format!("cast to {} takes exactly one argument", ty),
                        call.span,
                    ));
                };
                if let Some(kw) = keywords.first() {
                    return Err(CompileError::new(
                        ErrorKind::InvalidCall,
                        format!("cast to {} takes no keyword `{}`", ty, kw.name),
                        kw.span,
                    ));
                }
                let value = self.visit_expr(arg)?;
                let raw = self.cast(&value, &ty, call.span)?;
                Ok(TypedValue::temp(ty, raw))
            }
            GlobalSymbol::TypeConstructor(_) => Err(CompileError::invalid_construct(
                format!("`{}(...)` is only valid as a type in var()", name),
                call.span,
            )),
            GlobalSymbol::Construct(_) => Err(CompileError::invalid_construct(
                format!("`{}(...)` cannot be used as an expression", name),
                call.span,
            )),
            GlobalSymbol::Constant(_) => Err(CompileError::new(
                ErrorKind::InvalidCall,
                format!("constant `{}` is not callable", name),
                func.span,
            )),
        }
    }

    fn emit_call(
        &mut self,
        fref: &FunctionRef,
        call: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> CompileResult<TypedValue<'ctx>> {
        if let Some(kw) = keywords.first() {
            return Err(CompileError::new(
                ErrorKind::InvalidCall,
                format!("keyword argument `{}` is not supported", kw.name),
                kw.span,
            ));
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
            ));
        }

        let mut values: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&fref.sig.params) {
            let value = self.visit_expr(arg)?;
            values.push(self.cast(&value, param, arg.span)?.into());
        }

        let callee = self.declare_callee(fref, call.span)?;
        let site = self.builder.build_call(callee, &values, "call")?;
        self.session.record_call_site(&fref.symbol);
        if !fref.builtin {
            self.callees.push(fref.id);
        }

        match site.try_as_basic_value().left() {
            Some(result) => Ok(TypedValue::temp(fref.sig.ret, result)),
            None => Ok(TypedValue::Void),
        }
    }

    /// The module-local declaration of a callee.
    fn declare_callee(&self, fref: &FunctionRef, span: Span) -> CompileResult<FunctionValue<'ctx>> {
        let fn_type = types::function_type(self.context, &fref.sig);
        match self.module.get_function(&fref.symbol) {
            Some(existing) if existing.get_type() != fn_type => Err(CompileError::new(
                ErrorKind::FunctionDeclaration,
                format!("`{}` is declared with a conflicting signature", fref.symbol),
                span,
            )),
            Some(existing) => Ok(existing),
            None => {
                log::trace!("declare callee {} {}", fref.symbol, fref.sig);
                Ok(self
                    .module
                    .add_function(&fref.symbol, fn_type, Some(Linkage::External)))
            }
        }
    }

    fn visit_subscript(&mut self, value: &Expr, index: &Index, span: Span) -> CompileResult<TypedValue<'ctx>> {
        let container = self.visit_expr(value)?;
        let ty = container.ty();
        match index {
            Index::Single(i) => {
                let idx = self.visit_expr(i)?;
                let position = self.index_value(&idx, i.span)?;
                match (ty, container) {
                    (Type::Vector { .. }, TypedValue::Variable { ptr, .. }) => {
                        Ok(TypedValue::Slot(Slot::VectorLane {
                            storage: ptr,
                            vector: ty,
                            lane: position,
                        }))
                    }
                    (Type::Vector { elem, .. }, _) => {
                        let vector = container.materialize(self.emitter())?.into_vector_value();
                        let lane = self.emitter().extract_lane(vector, position)?;
                        Ok(TypedValue::scalar_temp(elem, lane))
                    }
                    _ if ty.is_array_like() => {
                        let elem = scalar_element(&ty, span)?;
                        let base = container.materialize(self.emitter())?.into_pointer_value();
                        let ptr = self.emitter().element_address(base, position)?;
                        Ok(TypedValue::Slot(Slot::Memory {
                            ty: Type::Scalar(elem),
                            ptr,
                        }))
                    }
                    _ => Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        format!("{} cannot be subscripted", ty),
                        value.span,
                    )),
                }
            }
            Index::Slice { lower, upper } => {
                if let Some(upper) = upper {
                    return Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        "slices with an upper bound are not supported",
                        upper.span,
                    ));
                }
                if !ty.is_array_like() {
                    return Err(CompileError::new(
                        ErrorKind::InvalidSubscript,
                        format!("{} cannot be sliced", ty),
                        value.span,
                    ));
                }
                let elem = scalar_element(&ty, span)?;
                let offset = match lower {
                    Some(lower) => {
                        let idx = self.visit_expr(lower)?;
                        self.index_value(&idx, lower.span)?
                    }
                    None => self.emitter().const_index(0),
                };
                let base = container.materialize(self.emitter())?.into_pointer_value();
                let ptr = self.emitter().element_address(base, offset)?;
                Ok(TypedValue::temp(Type::Slice(elem), ptr.into()))
            }
        }
    }

    /// An integer index widened to the backend's index width.
    fn index_value(&self, idx: &TypedValue<'ctx>, span: Span) -> CompileResult<IntValue<'ctx>> {
        match idx.ty() {
            Type::Scalar(s) if s.is_integer() => {
                Ok(self.cast(idx, &Type::INT64, span)?.into_int_value())
            }
            other => Err(CompileError::new(
                ErrorKind::InvalidSubscript,
                format!("index must be an integer, got {}", other),
                span,
            )),
        }
    }

    /// Resolve an assignment target to a storable slot.
    pub(super) fn visit_target(&mut self, target: &Expr) -> CompileResult<Slot<'ctx>> {
        match &target.kind {
            ExprKind::Name(name) => match self.scope.resolve(name, target.span)? {
                Resolved::Local(binding) => Ok(Slot::Memory {
                    ty: binding.ty,
                    ptr: binding.storage,
                }),
                Resolved::Global(_) => Err(CompileError::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot assign to global `{}`", name),
                    target.span,
                )),
            },
            ExprKind::Subscript { index, .. } if matches!(**index, Index::Slice { .. }) => {
                Err(CompileError::new(
                    ErrorKind::InvalidSubscript,
                    "cannot assign to a slice",
                    target.span,
                ))
            }
            ExprKind::Subscript { value, index } => {
                let element = self.visit_subscript(value, index, target.span)?;
                element.as_slot().ok_or_else(|| {
                    CompileError::new(
                        ErrorKind::InvalidSubscript,
                        "cannot assign to a lane of a temporary vector",
                        target.span,
                    )
                })
            }
            _ => Err(CompileError::new(
                ErrorKind::InvalidOperation,
                "cannot assign to this expression",
                target.span,
            )),
        }
    }

    pub(super) fn to_bool(&self, value: &TypedValue<'ctx>, span: Span) -> CompileResult<IntValue<'ctx>> {
        Ok(self.cast(value, &Type::BOOL, span)?.into_int_value())
    }

    fn common_type(
        &self,
        lhs: &TypedValue<'ctx>,
        rhs: &TypedValue<'ctx>,
        symbol: &str,
        span: Span,
    ) -> CompileResult<Type> {
        let (l, r) = (lhs.ty(), rhs.ty());
        coerce(&l, &r).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidCast,
                format!("no common type for {} {} {}", l, symbol, r),
                span,
            )
        })
    }
}

fn constant<'ctx>(lit: &Literal, span: Span) -> CompileResult<TypedValue<'ctx>> {
    let value = match (lit, literal_type(lit)) {
        (Literal::Int(i), Some(ScalarType::Int32)) => Scalar::I32(*i as i32),
        (Literal::Int(i), _) => Scalar::I64(*i),
        (Literal::Real(r), _) => Scalar::F64(*r),
        (Literal::Bool(b), _) => Scalar::Bool(*b),
        (Literal::Str(_), _) => {
            return Err(CompileError::internal("string literals are not supported", span))
        }
    };
    Ok(TypedValue::Constant(value))
}

fn operand_kind(ty: &Type, symbol: &str, span: Span) -> CompileResult<ScalarType> {
    ty.operand_kind().ok_or_else(|| {
        CompileError::new(
            ErrorKind::InvalidOperation,
            format!("operator `{}` is not defined for {}", symbol, ty),
            span,
        )
    })
}

fn scalar_element(ty: &Type, span: Span) -> CompileResult<ScalarType> {
    ty.element()
        .ok_or_else(|| CompileError::internal(format!("{} has no element type", ty), span))
}
