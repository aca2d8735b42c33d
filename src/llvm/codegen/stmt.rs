//! Statement lowering.

use inkwell::values::BasicValueEnum;
use inkwell::IntPredicate;

use crate::ast::{BinOp, Expr, ExprKind, Keyword, Literal, Span, Stmt, StmtKind};
use crate::core::error::{CompileError, CompileResult, ErrorKind};
use crate::core::scope::Resolved;
use crate::types::prelude::Construct;
use crate::types::{castable, coerce, GlobalSymbol, Scalar, Type};

use super::super::cast::cast_value;
use super::super::value::TypedValue;
use super::FunctionCompiler;

impl<'a, 'ctx, 'arena: 'a> FunctionCompiler<'a, 'ctx, 'arena> {
    /// Emit a statement list into the current block. Statements following a
    /// terminator are unreachable and skipped.
    pub(super) fn visit_block(&mut self, body: &[Stmt]) -> CompileResult<()> {
        for (i, stmt) in body.iter().enumerate() {
            if self.emitter().is_terminated() {
                log::debug!(
                    "Skipping {} unreachable statement(s) after line {}",
                    body.len() - i,
                    stmt.span
                );
                break;
            }
            self.visit_stmt(stmt).map_err(|e| e.at_if_unknown(stmt.span))?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => self.visit_assign(target, value),
            StmtKind::AugAssign { target, op, value } => self.visit_aug_assign(target, *op, value),
            StmtKind::Expr(expr) => self.visit_expr_stmt(expr),
            StmtKind::If { test, body, orelse } => self.visit_if(test, body, orelse),
            StmtKind::For {
                target,
                target_span,
                iter,
                body,
            } => self.visit_for(target, *target_span, iter, body),
            StmtKind::While { test, body } => self.visit_while(test, body),
            StmtKind::Return(value) => self.visit_return(value.as_ref(), stmt),
            StmtKind::Pass => Ok(()),
            StmtKind::Unsupported { construct } => Err(CompileError::internal(
                format!("{} statements are not supported", construct),
                stmt.span,
            )),
        }
    }

    fn visit_assign(&mut self, target: &Expr, value: &Expr) -> CompileResult<()> {
        if let Some(name) = target.as_name() {
            if self.scope.local(name).is_none() && !self.scope.globals().contains(name) {
                return self.declare_by_assignment(name, target, value);
            }
        }

        let rhs = self.visit_expr(value)?;
        let slot = self.visit_target(target)?;
        let ty = slot.ty();
        if let Type::Array { .. } = ty {
            return Err(CompileError::new(
                ErrorKind::InvalidOperation,
                "cannot assign to a bounded array as a whole",
                target.span,
            ));
        }
        let stored = self.cast(&rhs, &ty, value.span)?;
        slot.store(self.emitter(), stored)
    }

    /// `x = value` with `x` unseen: `x` takes the value's type.
    fn declare_by_assignment(&mut self, name: &str, target: &Expr, value: &Expr) -> CompileResult<()> {
        let rhs = self.visit_expr(value)?;
        let ty = match rhs.ty() {
            Type::Void => {
                return Err(CompileError::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot assign a Void result to `{}`", name),
                    value.span,
                ))
            }
            Type::Array { elem, .. } => Type::UnboundedArray(elem),
            ty => ty,
        };
        log::debug!("Implicit declaration {}: {}", name, ty);
        let ptr = self.alloca(&ty, name, target.span)?;
        let stored = self.cast(&rhs, &ty, value.span)?;
        self.emitter().store(ptr, stored)?;
        self.scope.declare(self.session, name, ty, ptr, target.span)?;
        Ok(())
    }

    fn visit_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> CompileResult<()> {
        let slot = self.visit_target(target)?;
        let rhs = self.visit_expr(value)?;
        let result = self.binary(op, TypedValue::Slot(slot), rhs, value.span)?;
        let stored = self.cast(&result, &slot.ty(), value.span)?;
        slot.store(self.emitter(), stored)
    }

    fn visit_expr_stmt(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Constant(Literal::Str(_)) => {
                log::trace!("ignoring docstring at {}", expr.span);
                Ok(())
            }
            ExprKind::Call { func, args, keywords } if self.is_construct(func, Construct::Var) => {
                self.visit_var(expr, args, keywords)
            }
            _ => self.visit_expr(expr).map(|_| ()),
        }
    }

    /// True when `func` names the global construct `which`.
    pub(super) fn is_construct(&self, func: &Expr, which: Construct) -> bool {
        let Some(name) = func.as_name() else {
            return false;
        };
        matches!(
            self.scope.resolve(name, func.span),
            Ok(Resolved::Global(GlobalSymbol::Construct(c))) if *c == which
        )
    }

    /// `var(name=Type, ...)`
    fn visit_var(&mut self, call: &Expr, args: &[Expr], keywords: &[Keyword]) -> CompileResult<()> {
        if let Some(extra) = args.first() {
            return Err(CompileError::invalid_construct(
                "var() takes only keyword declarations, as in var(x=Int)",
                extra.span,
            ));
        }
        if keywords.is_empty() {
            return Err(CompileError::invalid_construct(
                "var() declares nothing",
                call.span,
            ));
        }
        for kw in keywords {
            let ty = self
                .scope
                .globals()
                .resolve_type(&kw.value)
                .map_err(|e| e.at_if_unknown(kw.value.span))?;
            if ty.is_void() {
                return Err(CompileError::invalid_construct(
                    format!("cannot declare `{}` as Void", kw.name),
                    kw.span,
                ));
            }
            self.scope.ensure_undeclared(&kw.name, kw.span)?;
            let ptr = self.alloca(&ty, &kw.name, kw.span)?;
            log::debug!("Declared {}: {}", kw.name, ty);
            self.scope.declare(self.session, &kw.name, ty, ptr, kw.span)?;
        }
        Ok(())
    }

    fn visit_if(&mut self, test: &Expr, body: &[Stmt], orelse: &[Stmt]) -> CompileResult<()> {
        let cond = self.visit_expr(test)?;
        let flag = self.to_bool(&cond, test.span)?;

        let then_bb = self.append_block("if")?;
        let else_bb = if orelse.is_empty() {
            None
        } else {
            Some(self.append_block("else")?)
        };
        let end_bb = self.append_block("endif")?;

        self.builder
            .build_conditional_branch(flag, then_bb, else_bb.unwrap_or(end_bb))?;

        self.builder.position_at_end(then_bb);
        self.visit_block(body)?;
        let then_falls_through = !self.emitter().is_terminated();
        if then_falls_through {
            self.builder.build_unconditional_branch(end_bb)?;
        }

        let mut else_falls_through = true;
        if let Some(else_bb) = else_bb {
            self.builder.position_at_end(else_bb);
            self.visit_block(orelse)?;
            else_falls_through = !self.emitter().is_terminated();
            if else_falls_through {
                self.builder.build_unconditional_branch(end_bb)?;
            }
        }

        self.builder.position_at_end(end_bb);
        if !then_falls_through && !else_falls_through {
            log::debug!("Both branches return; {} is unreachable", end_bb.get_name().to_string_lossy());
            self.builder.build_unreachable()?;
        }
        Ok(())
    }

    /// `for i in range(stop)` and `for i in range(start, stop)`.
    fn visit_for(
        &mut self,
        target: &str,
        target_span: Span,
        iter: &Expr,
        body: &[Stmt],
    ) -> CompileResult<()> {
        let (start, stop) = match &iter.kind {
            ExprKind::Call { func, args, keywords } if self.is_construct(func, Construct::Range) => {
                if let Some(kw) = keywords.first() {
                    return Err(CompileError::invalid_construct(
                        format!("range() takes no keyword `{}`", kw.name),
                        kw.span,
                    ));
                }
                match args.as_slice() {
                    [stop] => (None, stop),
                    [start, stop] => (Some(start), stop),
                    [_, _, step] => {
                        return Err(CompileError::invalid_construct(
                            "range() with a step is not supported",
                            step.span,
                        ))
                    }
                    _ => {
                        return Err(CompileError::invalid_construct(
                            format!("range() takes 1 or 2 arguments, got {}", args.len()),
                            iter.span,
                        ))
                    }
                }
            }
            _ => {
                return Err(CompileError::invalid_construct(
                    "only `for <name> in range(...)` loops are supported",
                    iter.span,
                ))
            }
        };

        self.scope.ensure_undeclared(target, target_span)?;

        let start = match start {
            Some(e) => self.visit_expr(e)?,
            None => TypedValue::Constant(Scalar::I32(0)),
        };
        let stop_value = self.visit_expr(stop)?;
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
                ))
            }
        };

        let counter = self.alloca(&counter_ty, target, target_span)?;
        self.scope
            .declare(self.session, target, counter_ty, counter, target_span)?;
        let initial = self.cast(&start, &counter_ty, iter.span)?;
        self.emitter().store(counter, initial)?;
        let stop = self.cast(&stop_value, &counter_ty, stop.span)?.into_int_value();

        let cond_bb = self.append_block("loopcond")?;
        let body_bb = self.append_block("loopbody")?;
        let incr_bb = self.append_block("loopincr")?;
        let exit_bb = self.append_block("loopexit")?;
        self.builder.build_unconditional_branch(cond_bb)?;

        self.builder.position_at_end(cond_bb);
        let current = self.emitter().load(counter, target)?.into_int_value();
        let more = self
            .builder
            .build_int_compare(IntPredicate::SLT, current, stop, "more")?;
        self.builder.build_conditional_branch(more, body_bb, exit_bb)?;

        self.builder.position_at_end(body_bb);
        self.visit_block(body)?;
        if !self.emitter().is_terminated() {
            self.builder.build_unconditional_branch(incr_bb)?;
        }

        self.builder.position_at_end(incr_bb);
        let current = self.emitter().load(counter, target)?.into_int_value();
        let next = self
            .builder
            .build_int_add(current, current.get_type().const_int(1, false), "next")?;
        self.emitter().store(counter, next.into())?;
        self.builder.build_unconditional_branch(cond_bb)?;

        self.builder.position_at_end(exit_bb);
        Ok(())
    }

    fn visit_while(&mut self, test: &Expr, body: &[Stmt]) -> CompileResult<()> {
        let cond_bb = self.append_block("whilecond")?;
        let body_bb = self.append_block("whilebody")?;
        let exit_bb = self.append_block("whileexit")?;
        self.builder.build_unconditional_branch(cond_bb)?;

        self.builder.position_at_end(cond_bb);
        let cond = self.visit_expr(test)?;
        let flag = self.to_bool(&cond, test.span)?;
        self.builder.build_conditional_branch(flag, body_bb, exit_bb)?;

        self.builder.position_at_end(body_bb);
        self.visit_block(body)?;
        if !self.emitter().is_terminated() {
            self.builder.build_unconditional_branch(cond_bb)?;
        }

        self.builder.position_at_end(exit_bb);
        Ok(())
    }

    fn visit_return(&mut self, value: Option<&Expr>, stmt: &Stmt) -> CompileResult<()> {
        let ret = self.sig.ret;
        match (value, ret) {
            (None, Type::Void) => {
                self.builder.build_return(None)?;
                Ok(())
            }
            (None, ty) => Err(CompileError::new(
                ErrorKind::InvalidReturn,
                format!("bare return in a function returning {}", ty),
                stmt.span,
            )),
            (Some(e), Type::Void) => Err(CompileError::new(
                ErrorKind::InvalidReturn,
                "returning a value from a Void function",
                e.span,
            )),
            (Some(e), ty) => {
                let result = self.visit_expr(e)?;
                if !castable(&result.ty(), &ty) {
                    return Err(CompileError::new(
                        ErrorKind::InvalidReturn,
                        format!("cannot return {} from a function returning {}", result.ty(), ty),
                        e.span,
                    ));
                }
                let value = self.cast(&result, &ty, e.span)?;
                self.builder.build_return(Some(&value))?;
                Ok(())
            }
        }
    }

    pub(super) fn cast(
        &self,
        value: &TypedValue<'ctx>,
        ty: &Type,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        cast_value(self.emitter(), value, ty, span)
    }
}
