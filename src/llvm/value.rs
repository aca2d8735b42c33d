// TypedValue is the uniform handle the code generator passes between visitors: a
// compile-time constant, a stack variable, a computed temporary, or an addressable slot.
// Every value knows its dialect type and can be materialized into an LLVM value: constants
// become LLVM constants, variables and slots are loaded on demand, temporaries pass
// through. Slot is what assignments store into. Memory slots (a variable's storage or an
// array element) are real addresses. Vector lanes are not: vectors are values, so a
// VectorLane slot remembers the variable holding the vector and the lane index, and a
// store loads the whole vector, inserts the new element and stores the updated vector back
// into that same variable. Reading a lane extracts it from the current vector value.

//! Typed values and assignment slots.

use inkwell::values::{BasicValueEnum, IntValue, PointerValue};

use crate::ast::Span;
use crate::core::error::{CompileError, CompileResult, ErrorKind};
use crate::types::{Scalar, ScalarType, Type};

use super::emitter::IrEmitter;

/// A typed thing that can produce an LLVM value.
#[derive(Debug, Clone, Copy)]
pub enum TypedValue<'ctx> {
    Constant(Scalar),
    /// A named stack variable; `ptr` is its storage.
    Variable { ty: Type, ptr: PointerValue<'ctx> },
    Temp { ty: Type, value: BasicValueEnum<'ctx> },
    Slot(Slot<'ctx>),
    /// Result of calling a Void function.
    Void,
}

/// A storable location.
#[derive(Debug, Clone, Copy)]
pub enum Slot<'ctx> {
    /// Real memory holding a value of `ty`.
    Memory { ty: Type, ptr: PointerValue<'ctx> },
    /// Lane `lane` of the vector stored at `storage`.
    VectorLane {
        storage: PointerValue<'ctx>,
        vector: Type,
        lane: IntValue<'ctx>,
    },
}

impl<'ctx> TypedValue<'ctx> {
    pub fn ty(&self) -> Type {
        match self {
            TypedValue::Constant(c) => Type::Scalar(c.ty()),
            TypedValue::Variable { ty, .. } | TypedValue::Temp { ty, .. } => *ty,
            TypedValue::Slot(slot) => slot.ty(),
            TypedValue::Void => Type::Void,
        }
    }

    pub fn temp(ty: Type, value: BasicValueEnum<'ctx>) -> Self {
        TypedValue::Temp { ty, value }
    }

    pub fn scalar_temp(ty: ScalarType, value: BasicValueEnum<'ctx>) -> Self {
        TypedValue::Temp {
            ty: Type::Scalar(ty),
            value,
        }
    }

    /// Produce the LLVM value, loading variables and slots.
    pub fn materialize(&self, em: IrEmitter<'_, 'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        match *self {
            TypedValue::Constant(c) => Ok(em.const_scalar(c)),
            TypedValue::Variable { ty: Type::Array { .. }, ptr } => Ok(em.array_decay(ptr)?.into()),
            TypedValue::Variable { ptr, .. } => em.load(ptr, "var"),
            TypedValue::Temp { value, .. } => Ok(value),
            TypedValue::Slot(slot) => slot.load(em),
            TypedValue::Void => Err(CompileError::new(
                ErrorKind::InvalidOperation,
                "a Void result has no value",
                Span::UNKNOWN,
            )),
        }
    }

    /// The value as an assignment target, if it is one.
    pub fn as_slot(&self) -> Option<Slot<'ctx>> {
        match *self {
            TypedValue::Variable { ty, ptr } => Some(Slot::Memory { ty, ptr }),
            TypedValue::Slot(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<Scalar> {
        match self {
            TypedValue::Constant(c) => Some(*c),
            _ => None,
        }
    }
}

impl<'ctx> Slot<'ctx> {
    /// Type of the value held by the slot.
    pub fn ty(&self) -> Type {
        match self {
            Slot::Memory { ty, .. } => *ty,
            Slot::VectorLane { vector, .. } => match vector.element() {
                Some(elem) => Type::Scalar(elem),
                None => Type::Void,
            },
        }
    }

    pub fn load(&self, em: IrEmitter<'_, 'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        match *self {
            Slot::Memory { ty: Type::Array { .. }, ptr } => Ok(em.array_decay(ptr)?.into()),
            Slot::Memory { ptr, .. } => em.load(ptr, "ld"),
            Slot::VectorLane { storage, lane, .. } => {
                let vector = em.load(storage, "vec")?.into_vector_value();
                em.extract_lane(vector, lane)
            }
        }
    }

    /// Store `value`, already cast to [`Slot::ty`].
    pub fn store(&self, em: IrEmitter<'_, 'ctx>, value: BasicValueEnum<'ctx>) -> CompileResult<()> {
        match *self {
            Slot::Memory { ty: Type::Array { .. }, .. } => Err(CompileError::new(
                ErrorKind::InvalidOperation,
                "cannot assign to a bounded array as a whole",
                Span::UNKNOWN,
            )),
            Slot::Memory { ptr, .. } => em.store(ptr, value),
            Slot::VectorLane { storage, lane, .. } => {
                let vector = em.load(storage, "vec")?.into_vector_value();
                let updated = em.insert_lane(vector, value, lane)?;
                em.store(storage, updated.into())
            }
        }
    }
}
