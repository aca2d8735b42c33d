//! Conversion instructions between dialect types.
//!
//! Each cast emits the minimal LLVM conversion: nothing for identical types,
//! `sext`/`trunc` between integers, `sitofp`/`fptosi` between integers and
//! reals, `fpext`/`fptrunc` between reals, a compare against zero into Bool
//! and `zext`/`uitofp` out of Bool. Scalars broadcast into vectors lane by
//! lane. Constants are folded with the same rules instead of emitting code.

use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::Span;
use crate::core::error::{CompileError, CompileResult};
use crate::types::{castable, ScalarType, Type};

use super::emitter::IrEmitter;
use super::value::TypedValue;

/// Convert `value` to `to`, producing an LLVM value of `to`'s type.
pub fn cast_value<'ctx>(
    em: IrEmitter<'_, 'ctx>,
    value: &TypedValue<'ctx>,
    to: &Type,
    span: Span,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let from = value.ty();
    if !castable(&from, to) {
        return Err(CompileError::invalid_cast(from, to, span));
    }

    if let (Some(c), Type::Scalar(target)) = (value.constant(), to) {
        return Ok(em.const_scalar(c.cast(*target)));
    }

    let raw = value.materialize(em).map_err(|e| e.at_if_unknown(span))?;
    match (from, *to) {
        _ if from == *to => Ok(raw),
        (Type::Scalar(src), Type::Scalar(dst)) => cast_scalar(em, raw, src, dst),
        (Type::Scalar(src), Type::Vector { elem, count }) => {
            let lane_value = cast_scalar(em, raw, src, elem)?;
            broadcast(em, lane_value, elem, count)
        }
        // array decay and slice/array interconversion share the pointer representation
        _ => Ok(raw),
    }
}

/// Convert a raw scalar between scalar types.
pub fn cast_scalar<'ctx>(
    em: IrEmitter<'_, 'ctx>,
    raw: BasicValueEnum<'ctx>,
    from: ScalarType,
    to: ScalarType,
) -> CompileResult<BasicValueEnum<'ctx>> {
    if from == to {
        return Ok(raw);
    }
    log::trace!("emit cast {} -> {}", from, to);
    let b = em.builder;
    let target = em.scalar_type(to);

    if to == ScalarType::Bool {
        let flag = if from.is_real() {
            let v = raw.into_float_value();
            b.build_float_compare(FloatPredicate::UNE, v, v.get_type().const_zero(), "tobool")?
        } else {
            let v = raw.into_int_value();
            b.build_int_compare(IntPredicate::NE, v, v.get_type().const_zero(), "tobool")?
        };
        return Ok(flag.into());
    }

    let out: BasicValueEnum<'ctx> = match (from.is_real(), to.is_real()) {
        (false, false) => {
            let v = raw.into_int_value();
            let t = target.into_int_type();
            if from == ScalarType::Bool {
                b.build_int_z_extend(v, t, "zext")?.into()
            } else {
                b.build_int_cast_sign_flag(v, t, true, "icast")?.into()
            }
        }
        (false, true) => {
            let v = raw.into_int_value();
            let t = target.into_float_type();
            if from == ScalarType::Bool {
                b.build_unsigned_int_to_float(v, t, "uitofp")?.into()
            } else {
                b.build_signed_int_to_float(v, t, "sitofp")?.into()
            }
        }
        (true, false) => b
            .build_float_to_signed_int(raw.into_float_value(), target.into_int_type(), "fptosi")?
            .into(),
        (true, true) => b
            .build_float_cast(raw.into_float_value(), target.into_float_type(), "fcast")?
            .into(),
    };
    Ok(out)
}

/// Replicate a scalar across every lane of a vector.
pub fn broadcast<'ctx>(
    em: IrEmitter<'_, 'ctx>,
    lane_value: BasicValueEnum<'ctx>,
    elem: ScalarType,
    count: u32,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let vector_type = em.basic_type(&Type::Vector { elem, count })?.into_vector_type();
    let mut vector = vector_type.get_undef();
    for lane in 0..count {
        vector = em.insert_lane(vector, lane_value, em.const_index(lane as u64))?;
    }
    Ok(vector.into())
}
