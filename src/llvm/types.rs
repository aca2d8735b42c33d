//! Mapping from dialect types to LLVM machine types.
//!
//! Bool is `i1` inside compiled code; integers are plain `iN` (signedness is
//! carried by the dialect type and chosen per instruction); vectors map to
//! LLVM vectors; every array flavour is passed around as a pointer to its
//! first element, and a bounded array's storage is an `[N x T]` alloca.

use inkwell::context::Context;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::AddressSpace;

use crate::types::prelude::Signature;
use crate::types::{ScalarType, Type};

pub fn scalar_type<'ctx>(context: &'ctx Context, s: ScalarType) -> BasicTypeEnum<'ctx> {
    match s {
        ScalarType::Bool => context.bool_type().into(),
        ScalarType::Int8 => context.i8_type().into(),
        ScalarType::Int16 => context.i16_type().into(),
        ScalarType::Int32 => context.i32_type().into(),
        ScalarType::Int64 => context.i64_type().into(),
        ScalarType::Float => context.f32_type().into(),
        ScalarType::Double => context.f64_type().into(),
    }
}

/// Value type of `ty`; None for Void.
pub fn basic_type<'ctx>(context: &'ctx Context, ty: &Type) -> Option<BasicTypeEnum<'ctx>> {
    match *ty {
        Type::Void => None,
        Type::Scalar(s) => Some(scalar_type(context, s)),
        Type::Vector { elem, count } => Some(match scalar_type(context, elem) {
            BasicTypeEnum::IntType(t) => t.vec_type(count).into(),
            BasicTypeEnum::FloatType(t) => t.vec_type(count).into(),
            other => other,
        }),
        Type::Array { elem, .. } | Type::UnboundedArray(elem) | Type::Slice(elem) => {
            Some(element_pointer(context, elem).into())
        }
    }
}

/// Stack storage type for a variable of type `ty`.
pub fn storage_type<'ctx>(context: &'ctx Context, ty: &Type) -> Option<BasicTypeEnum<'ctx>> {
    match *ty {
        Type::Array { elem, count } => Some(scalar_type(context, elem).array_type(count).into()),
        _ => basic_type(context, ty),
    }
}

pub fn element_pointer<'ctx>(context: &'ctx Context, elem: ScalarType) -> inkwell::types::PointerType<'ctx> {
    scalar_type(context, elem).ptr_type(AddressSpace::default())
}

/// LLVM signature for a dialect signature.
pub fn function_type<'ctx>(context: &'ctx Context, sig: &Signature) -> FunctionType<'ctx> {
    let params: Vec<BasicMetadataTypeEnum<'ctx>> = sig
        .params
        .iter()
        .filter_map(|p| basic_type(context, p))
        .map(Into::into)
        .collect();
    match basic_type(context, &sig.ret) {
        Some(ret) => ret.fn_type(&params, false),
        None => context.void_type().fn_type(&params, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_mapping() {
        let context = Context::create();
        assert_eq!(scalar_type(&context, ScalarType::Bool), context.bool_type().into());
        assert_eq!(scalar_type(&context, ScalarType::Int16), context.i16_type().into());
        assert_eq!(scalar_type(&context, ScalarType::Double), context.f64_type().into());
        assert!(basic_type(&context, &Type::Void).is_none());
    }

    #[test]
    fn test_composite_mapping() {
        let context = Context::create();
        let v4 = basic_type(&context, &Type::Vector { elem: ScalarType::Float, count: 4 }).unwrap();
        assert_eq!(v4, context.f32_type().vec_type(4).into());

        let ptr = basic_type(&context, &Type::UnboundedArray(ScalarType::Int32)).unwrap();
        assert_eq!(ptr, context.i32_type().ptr_type(AddressSpace::default()).into());

        let bounded = Type::Array { elem: ScalarType::Int8, count: 16 };
        assert_eq!(basic_type(&context, &bounded), Some(ptr_to(&context, ScalarType::Int8)));
        assert_eq!(
            storage_type(&context, &bounded),
            Some(context.i8_type().array_type(16).into())
        );
    }

    fn ptr_to<'ctx>(context: &'ctx Context, elem: ScalarType) -> BasicTypeEnum<'ctx> {
        element_pointer(context, elem).into()
    }

    #[test]
    fn test_function_type() {
        let context = Context::create();
        let sig = Signature::new(Type::Void, vec![Type::INT64, Type::UnboundedArray(ScalarType::Double)]);
        let fn_type = function_type(&context, &sig);
        assert!(fn_type.get_return_type().is_none());
        assert_eq!(fn_type.count_param_types(), 2);
    }
}
