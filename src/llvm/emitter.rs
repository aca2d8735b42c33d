// IrEmitter bundles the LLVM context and instruction builder the code generator emits
// through, together with the handful of helpers every construct needs: typed constants,
// loads, stores, element addressing for arrays, vector lane access and a check for
// whether the current block has already been terminated. It is a small Copy handle so the
// value, cast and operator modules can take it by value.

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::{BasicTypeEnum, IntType};
use inkwell::values::{BasicValueEnum, IntValue, PointerValue, VectorValue};

use crate::ast::Span;
use crate::core::error::{CompileError, CompileResult, ErrorKind};
use crate::types::{Scalar, ScalarType, Type};

use super::types;

#[derive(Clone, Copy)]
pub struct IrEmitter<'a, 'ctx> {
    pub context: &'ctx Context,
    pub builder: &'a Builder<'ctx>,
}

impl<'a, 'ctx> IrEmitter<'a, 'ctx> {
    pub fn new(context: &'ctx Context, builder: &'a Builder<'ctx>) -> Self {
        Self { context, builder }
    }

    pub fn scalar_type(&self, s: ScalarType) -> BasicTypeEnum<'ctx> {
        types::scalar_type(self.context, s)
    }

    pub fn basic_type(&self, ty: &Type) -> CompileResult<BasicTypeEnum<'ctx>> {
        types::basic_type(self.context, ty)
            .ok_or_else(|| CompileError::new(ErrorKind::InvalidOperation, "Void has no value", Span::UNKNOWN))
    }

    /// Type used for lane and element indices.
    pub fn index_type(&self) -> IntType<'ctx> {
        self.context.i64_type()
    }

    pub fn const_index(&self, i: u64) -> IntValue<'ctx> {
        self.index_type().const_int(i, false)
    }

    pub fn const_scalar(&self, value: Scalar) -> BasicValueEnum<'ctx> {
        match value {
            Scalar::Bool(b) => self.context.bool_type().const_int(b as u64, false).into(),
            Scalar::I8(v) => self.context.i8_type().const_int(v as u64, true).into(),
            Scalar::I16(v) => self.context.i16_type().const_int(v as u64, true).into(),
            Scalar::I32(v) => self.context.i32_type().const_int(v as u64, true).into(),
            Scalar::I64(v) => self.context.i64_type().const_int(v as u64, true).into(),
            Scalar::F32(v) => self.context.f32_type().const_float(v as f64).into(),
            Scalar::F64(v) => self.context.f64_type().const_float(v).into(),
        }
    }

    pub fn load(&self, ptr: PointerValue<'ctx>, name: &str) -> CompileResult<BasicValueEnum<'ctx>> {
        log::trace!("emit load {}", name);
        Ok(self.builder.build_load(ptr, name)?)
    }

    pub fn store(&self, ptr: PointerValue<'ctx>, value: BasicValueEnum<'ctx>) -> CompileResult<()> {
        log::trace!("emit store");
        self.builder.build_store(ptr, value)?;
        Ok(())
    }

    /// Address of element `index` given a pointer to the first element.
    pub fn element_address(
        &self,
        base: PointerValue<'ctx>,
        index: IntValue<'ctx>,
    ) -> CompileResult<PointerValue<'ctx>> {
        // SAFETY: `base` points at an element of the array type; indices are
        // not bounds-checked, matching native array semantics.
        let ptr = unsafe { self.builder.build_gep(base, &[index], "elem") }?;
        Ok(ptr)
    }

    /// Pointer to the first element of a bounded array's `[N x T]` storage.
    pub fn array_decay(&self, storage: PointerValue<'ctx>) -> CompileResult<PointerValue<'ctx>> {
        let zero = self.context.i32_type().const_zero();
        // SAFETY: `storage` is an alloca of an array type, so [0, 0] is in bounds.
        let ptr = unsafe { self.builder.build_in_bounds_gep(storage, &[zero, zero], "decay") }?;
        Ok(ptr)
    }

    pub fn extract_lane(&self, vector: VectorValue<'ctx>, lane: IntValue<'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        Ok(self.builder.build_extract_element(vector, lane, "lane")?)
    }

    pub fn insert_lane(
        &self,
        vector: VectorValue<'ctx>,
        value: BasicValueEnum<'ctx>,
        lane: IntValue<'ctx>,
    ) -> CompileResult<VectorValue<'ctx>> {
        Ok(self.builder.build_insert_element(vector, value, lane, "ins")?)
    }

    pub fn current_block(&self) -> CompileResult<BasicBlock<'ctx>> {
        self.builder.get_insert_block().ok_or_else(|| {
            CompileError::internal("builder is not positioned", Span::UNKNOWN)
        })
    }

    /// True when the block being emitted already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|bb| bb.get_terminator())
            .is_some()
    }
}
