// Operator implementations per scalar kind. ScalarOps is implemented once for integers,
// once for reals and once for Bool, and ops_for selects the implementation from the
// operand's element kind, so vectors reuse their element's implementation (LLVM's
// integer and float instructions accept vector operands). Integers use signed division,
// remainder, comparison and arithmetic right shift. Reals use ordered comparisons, except
// `!=`, which is unordered so that NaN compares unequal to everything. Bool supports only
// the logical bit operators and equality. Anything else is an InvalidOperation error at
// the operator's position. Comparisons are defined on scalars only.

//! Operator dispatch by scalar kind.

use inkwell::values::{BasicValueEnum, FloatMathValue, IntMathValue, IntValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::{BinOp, CmpOp, Span, UnaryOp};
use crate::core::error::{CompileError, CompileResult, ErrorKind};
use crate::types::ScalarType;

use super::emitter::IrEmitter;

/// Operators of one scalar kind, applied to scalars or vectors of that kind.
pub trait ScalarOps {
    fn kind_name(&self) -> &'static str;

    fn binary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: BinOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>>;

    fn compare<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: CmpOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<IntValue<'ctx>>;

    fn unary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: UnaryOp,
        operand: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>>;
}

pub struct IntOps;
pub struct RealOps;
pub struct BoolOps;

static INT_OPS: IntOps = IntOps;
static REAL_OPS: RealOps = RealOps;
static BOOL_OPS: BoolOps = BoolOps;

pub fn ops_for(kind: ScalarType) -> &'static dyn ScalarOps {
    if kind.is_bool() {
        &BOOL_OPS
    } else if kind.is_real() {
        &REAL_OPS
    } else {
        &INT_OPS
    }
}

fn undefined(ops: &dyn ScalarOps, symbol: &str, span: Span) -> CompileError {
    CompileError::new(
        ErrorKind::InvalidOperation,
        format!("operator `{}` is not defined for {} operands", symbol, ops.kind_name()),
        span,
    )
}

fn mismatch(span: Span) -> CompileError {
    CompileError::internal("operand representations differ after coercion", span)
}

fn int_binary<'ctx, T: IntMathValue<'ctx>>(
    em: IrEmitter<'_, 'ctx>,
    op: BinOp,
    l: T,
    r: T,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let b = em.builder;
    let v = match op {
        BinOp::Add => b.build_int_add(l, r, "add")?,
        BinOp::Sub => b.build_int_sub(l, r, "sub")?,
        BinOp::Mul => b.build_int_mul(l, r, "mul")?,
        BinOp::Div => b.build_int_signed_div(l, r, "div")?,
        BinOp::Mod => b.build_int_signed_rem(l, r, "rem")?,
        BinOp::BitAnd => b.build_and(l, r, "and")?,
        BinOp::BitOr => b.build_or(l, r, "or")?,
        BinOp::BitXor => b.build_xor(l, r, "xor")?,
        BinOp::Shl => b.build_left_shift(l, r, "shl")?,
        BinOp::Shr => b.build_right_shift(l, r, true, "shr")?,
    };
    Ok(v.as_basic_value_enum())
}

fn real_binary<'ctx, T: FloatMathValue<'ctx>>(
    em: IrEmitter<'_, 'ctx>,
    op: BinOp,
    l: T,
    r: T,
    span: Span,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let b = em.builder;
    let v = match op {
        BinOp::Add => b.build_float_add(l, r, "fadd")?,
        BinOp::Sub => b.build_float_sub(l, r, "fsub")?,
        BinOp::Mul => b.build_float_mul(l, r, "fmul")?,
        BinOp::Div => b.build_float_div(l, r, "fdiv")?,
        BinOp::Mod => b.build_float_rem(l, r, "frem")?,
        _ => return Err(undefined(&REAL_OPS, op.symbol(), span)),
    };
    Ok(v.as_basic_value_enum())
}

impl ScalarOps for IntOps {
    fn kind_name(&self) -> &'static str {
        "integer"
    }

    fn binary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: BinOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        log::trace!("emit integer {}", op.symbol());
        let result = match (lhs, rhs) {
            (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => int_binary(em, op, l, r),
            (BasicValueEnum::VectorValue(l), BasicValueEnum::VectorValue(r)) => int_binary(em, op, l, r),
            _ => Err(mismatch(span)),
        };
        result.map_err(|e| e.at_if_unknown(span))
    }

    fn compare<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: CmpOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<IntValue<'ctx>> {
        let pred = match op {
            CmpOp::Eq => IntPredicate::EQ,
            CmpOp::NotEq => IntPredicate::NE,
            CmpOp::Lt => IntPredicate::SLT,
            CmpOp::LtE => IntPredicate::SLE,
            CmpOp::Gt => IntPredicate::SGT,
            CmpOp::GtE => IntPredicate::SGE,
        };
        match (lhs, rhs) {
            (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => {
                Ok(em.builder.build_int_compare(pred, l, r, "icmp")?)
            }
            _ => Err(mismatch(span)),
        }
    }

    fn unary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: UnaryOp,
        operand: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let b = em.builder;
        match (op, operand) {
            (UnaryOp::Plus, v) => Ok(v),
            (UnaryOp::Neg, BasicValueEnum::IntValue(v)) => Ok(b.build_int_neg(v, "neg")?.into()),
            (UnaryOp::Neg, BasicValueEnum::VectorValue(v)) => Ok(b.build_int_neg(v, "neg")?.into()),
            (UnaryOp::Invert, BasicValueEnum::IntValue(v)) => Ok(b.build_not(v, "inv")?.into()),
            (UnaryOp::Invert, BasicValueEnum::VectorValue(v)) => Ok(b.build_not(v, "inv")?.into()),
            (UnaryOp::Not, _) => Err(undefined(self, op.symbol(), span)),
            _ => Err(mismatch(span)),
        }
    }
}

impl ScalarOps for RealOps {
    fn kind_name(&self) -> &'static str {
        "real"
    }

    fn binary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: BinOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        log::trace!("emit real {}", op.symbol());
        let result = match (lhs, rhs) {
            (BasicValueEnum::FloatValue(l), BasicValueEnum::FloatValue(r)) => real_binary(em, op, l, r, span),
            (BasicValueEnum::VectorValue(l), BasicValueEnum::VectorValue(r)) => real_binary(em, op, l, r, span),
            _ => Err(mismatch(span)),
        };
        result.map_err(|e| e.at_if_unknown(span))
    }

    fn compare<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: CmpOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<IntValue<'ctx>> {
        let pred = match op {
            CmpOp::Eq => FloatPredicate::OEQ,
            CmpOp::NotEq => FloatPredicate::UNE,
            CmpOp::Lt => FloatPredicate::OLT,
            CmpOp::LtE => FloatPredicate::OLE,
            CmpOp::Gt => FloatPredicate::OGT,
            CmpOp::GtE => FloatPredicate::OGE,
        };
        match (lhs, rhs) {
            (BasicValueEnum::FloatValue(l), BasicValueEnum::FloatValue(r)) => {
                Ok(em.builder.build_float_compare(pred, l, r, "fcmp")?)
            }
            _ => Err(mismatch(span)),
        }
    }

    fn unary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: UnaryOp,
        operand: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let b = em.builder;
        match (op, operand) {
            (UnaryOp::Plus, v) => Ok(v),
            (UnaryOp::Neg, BasicValueEnum::FloatValue(v)) => Ok(b.build_float_neg(v, "fneg")?.into()),
            (UnaryOp::Neg, BasicValueEnum::VectorValue(v)) => Ok(b.build_float_neg(v, "fneg")?.into()),
            (UnaryOp::Invert | UnaryOp::Not, _) => Err(undefined(self, op.symbol(), span)),
            _ => Err(mismatch(span)),
        }
    }
}

impl ScalarOps for BoolOps {
    fn kind_name(&self) -> &'static str {
        "Bool"
    }

    fn binary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: BinOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        if !matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
            return Err(undefined(self, op.symbol(), span));
        }
        let result = match (lhs, rhs) {
            (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => int_binary(em, op, l, r),
            (BasicValueEnum::VectorValue(l), BasicValueEnum::VectorValue(r)) => int_binary(em, op, l, r),
            _ => Err(mismatch(span)),
        };
        result.map_err(|e| e.at_if_unknown(span))
    }

    fn compare<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: CmpOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<IntValue<'ctx>> {
        let pred = match op {
            CmpOp::Eq => IntPredicate::EQ,
            CmpOp::NotEq => IntPredicate::NE,
            _ => return Err(undefined(self, op.symbol(), span)),
        };
        match (lhs, rhs) {
            (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => {
                Ok(em.builder.build_int_compare(pred, l, r, "bcmp")?)
            }
            _ => Err(mismatch(span)),
        }
    }

    fn unary<'ctx>(
        &self,
        em: IrEmitter<'_, 'ctx>,
        op: UnaryOp,
        operand: BasicValueEnum<'ctx>,
        span: Span,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        match (op, operand) {
            (UnaryOp::Not, BasicValueEnum::IntValue(v)) => Ok(em.builder.build_not(v, "not")?.into()),
            (UnaryOp::Not, _) => Err(mismatch(span)),
            _ => Err(undefined(self, op.symbol(), span)),
        }
    }
}
