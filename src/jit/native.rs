// Native entry points. Every compiled function is invoked through a generated trampoline
// with the fixed C signature `void(i8** args, i8* ret)`: args[i] points at the storage of
// the i-th argument and ret at storage large enough for the result. The trampoline loads
// each argument with its declared type, calls the dialect function and stores the result,
// so the host never needs a Rust function-pointer type per signature. Scalars are passed
// by value in an 8-byte slot. Bool travels as one byte holding 0 or 1 and is widened or
// narrowed to the backend's i1 inside the trampoline. Array parameters receive a pointer
// to the first element of the caller's buffer; the element count is not passed, so a
// dialect function taking an array also takes its length as an ordinary Int argument.

//! Argument marshalling and trampolines.

use std::marker::PhantomData;

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicMetadataValueEnum, FunctionValue};
use inkwell::AddressSpace;

use crate::llvm::types;
use crate::types::prelude::Signature;
use crate::types::{Scalar, ScalarType, Type};

use super::error::JitError;

/// Element types of host buffers that can be passed as array arguments.
pub trait NativeElement: Copy {
    const TYPE: ScalarType;
}

macro_rules! native_element {
    ($($t:ty => $s:ident),*) => {
        $(impl NativeElement for $t {
            const TYPE: ScalarType = ScalarType::$s;
        })*
    };
}

native_element!(bool => Bool, i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64, f32 => Float, f64 => Double);

/// A mutable host buffer viewed as raw element storage.
#[derive(Debug)]
pub struct ArrayArg<'a> {
    elem: ScalarType,
    ptr: *mut u8,
    len: usize,
    _buffer: PhantomData<&'a mut [u8]>,
}

impl<'a> ArrayArg<'a> {
    pub fn new<T: NativeElement>(buffer: &'a mut [T]) -> Self {
        Self {
            elem: T::TYPE,
            ptr: buffer.as_mut_ptr().cast(),
            len: buffer.len(),
            _buffer: PhantomData,
        }
    }

    pub fn elem(&self) -> ScalarType {
        self.elem
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    /// Element `index`, or `None` when out of bounds.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        if index >= self.len {
            return None;
        }
        let size = self.elem.byte_size();
        // SAFETY: `ptr` and `len` come from a live `&'a mut [T]` with
        // `size_of::<T>() == size`, and `index < len`.
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr.add(index * size), size) };
        Scalar::from_ne_bytes(self.elem, bytes)
    }

    /// Store `value` (already of the element type) at `index`.
    pub fn set(&mut self, index: usize, value: Scalar) -> bool {
        if index >= self.len || value.ty() != self.elem {
            return false;
        }
        let size = self.elem.byte_size();
        let bytes = value.to_ne_bytes();
        // SAFETY: as in `get`; the borrow is exclusive for `'a`.
        let slot = unsafe { std::slice::from_raw_parts_mut(self.ptr.add(index * size), size) };
        slot.copy_from_slice(&bytes);
        true
    }
}

/// One argument of a native or reference invocation.
#[derive(Debug)]
pub enum Arg<'a> {
    Scalar(Scalar),
    Array(ArrayArg<'a>),
}

impl Arg<'_> {
    /// A readable name of the argument's type.
    pub fn type_name(&self) -> String {
        match self {
            Arg::Scalar(s) => s.ty().to_string(),
            Arg::Array(a) => format!("buffer of {}", a.elem()),
        }
    }
}

macro_rules! scalar_arg {
    ($($t:ty => $s:ident),*) => {
        $(impl From<$t> for Arg<'_> {
            fn from(v: $t) -> Self {
                Arg::Scalar(Scalar::$s(v))
            }
        })*
    };
}

scalar_arg!(bool => Bool, i8 => I8, i16 => I16, i32 => I32, i64 => I64, f32 => F32, f64 => F64);

impl From<Scalar> for Arg<'_> {
    fn from(v: Scalar) -> Self {
        Arg::Scalar(v)
    }
}

impl<'a, T: NativeElement> From<&'a mut [T]> for Arg<'a> {
    fn from(buffer: &'a mut [T]) -> Self {
        Arg::Array(ArrayArg::new(buffer))
    }
}

/// Reject signatures whose values cannot cross the native boundary.
pub fn check_invocable(name: &str, sig: &Signature) -> Result<(), JitError> {
    let not_invocable = |reason: String| JitError::NotInvocable {
        function: name.to_string(),
        reason,
    };
    for (i, p) in sig.params.iter().enumerate() {
        if p.is_vector() {
            return Err(not_invocable(format!("parameter {} is {}", i, p)));
        }
    }
    match sig.ret {
        Type::Void | Type::Scalar(_) => Ok(()),
        other => Err(not_invocable(format!("it returns {}", other))),
    }
}

/// Check `args` against the parameter types.
pub fn check_args(name: &str, sig: &Signature, args: &[Arg<'_>]) -> Result<(), JitError> {
    if args.len() != sig.params.len() {
        return Err(JitError::ArgumentCount {
            function: name.to_string(),
            expected: sig.params.len(),
            got: args.len(),
        });
    }
    for (index, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
        let matches = match (arg, param) {
            (Arg::Scalar(s), Type::Scalar(p)) => s.ty() == *p,
            (Arg::Array(a), Type::UnboundedArray(e) | Type::Slice(e)) => a.elem() == *e,
            _ => false,
        };
        if !matches {
            return Err(JitError::ArgumentType {
                function: name.to_string(),
                index,
                expected: param.to_string(),
                got: arg.type_name(),
            });
        }
    }
    Ok(())
}

/// Symbol of the trampoline for `symbol`.
pub fn trampoline_symbol(symbol: &str) -> String {
    format!("{}.entry", symbol)
}

/// Type of an argument slot as seen by the trampoline.
fn boundary_type<'ctx>(context: &'ctx Context, ty: &Type) -> Option<BasicTypeEnum<'ctx>> {
    match *ty {
        Type::BOOL => Some(context.i8_type().into()),
        other => types::basic_type(context, &other),
    }
}

/// Emit the trampoline for `target` (declared by `symbol` and `sig`) into `module`.
pub fn build_trampoline<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    symbol: &str,
    sig: &Signature,
) -> Result<FunctionValue<'ctx>, JitError> {
    let i8_ptr = context.i8_type().ptr_type(AddressSpace::default());
    let entry_type = context
        .void_type()
        .fn_type(&[i8_ptr.ptr_type(AddressSpace::default()).into(), i8_ptr.into()], false);
    let entry = module.add_function(&trampoline_symbol(symbol), entry_type, None);
    let target = match module.get_function(symbol) {
        Some(f) => f,
        None => module.add_function(symbol, types::function_type(context, sig), None),
    };

    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(entry, "entry"));
    let (args_ptr, ret_ptr) = match (entry.get_nth_param(0), entry.get_nth_param(1)) {
        (Some(a), Some(r)) => (a.into_pointer_value(), r.into_pointer_value()),
        _ => return Err(JitError::Llvm("trampoline parameters missing".into())),
    };

    let mut call_args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(sig.params.len());
    for (i, param) in sig.params.iter().enumerate() {
        let slot_type = boundary_type(context, param).ok_or_else(|| JitError::NotInvocable {
            function: symbol.to_string(),
            reason: format!("parameter {} is Void", i),
        })?;
        let index = context.i64_type().const_int(i as u64, false);
        // SAFETY: the host passes one pointer per parameter.
        let cell = unsafe { builder.build_gep(args_ptr, &[index], "argp") }?;
        let raw = builder.build_load(cell, "arg")?.into_pointer_value();
        let typed = builder.build_pointer_cast(raw, slot_type.ptr_type(AddressSpace::default()), "argt")?;
        let value = builder.build_load(typed, "argv")?;
        let value = if *param == Type::BOOL {
            let byte = value.into_int_value();
            builder
                .build_int_compare(inkwell::IntPredicate::NE, byte, byte.get_type().const_zero(), "flag")?
                .into()
        } else {
            value
        };
        call_args.push(value.into());
    }

    let call = builder.build_call(target, &call_args, "result")?;
    if let Some(result) = call.try_as_basic_value().left() {
        let result = if sig.ret == Type::BOOL {
            builder
                .build_int_z_extend(result.into_int_value(), context.i8_type(), "byte")?
                .into()
        } else {
            result
        };
        let slot_type = boundary_type(context, &sig.ret)
            .ok_or_else(|| JitError::Llvm("non-void call without a result type".into()))?;
        let out = builder.build_pointer_cast(ret_ptr, slot_type.ptr_type(AddressSpace::default()), "ret")?;
        builder.build_store(out, result)?;
    }
    builder.build_return(None)?;

    if !entry.verify(false) {
        return Err(JitError::Llvm(format!("trampoline for `{}` failed verification", symbol)));
    }
    Ok(entry)
}

/// Per-call argument storage.
pub struct Marshalled {
    slots: Vec<u64>,
    pointers: Vec<*mut u8>,
    ret: u64,
}

impl Marshalled {
    pub fn new(args: &mut [Arg<'_>]) -> Self {
        let slots = args
            .iter_mut()
            .map(|arg| match arg {
                Arg::Scalar(s) => {
                    let mut cell = [0u8; 8];
                    let bytes = s.to_ne_bytes();
                    cell[..bytes.len()].copy_from_slice(&bytes);
                    u64::from_ne_bytes(cell)
                }
                Arg::Array(a) => a.as_mut_ptr() as usize as u64,
            })
            .collect();
        Self {
            slots,
            pointers: Vec::new(),
            ret: 0,
        }
    }

    /// Call the trampoline at `address` and decode a result of type `ret`.
    ///
    /// # Safety
    /// `address` must be a trampoline built by [`build_trampoline`] for the
    /// signature the arguments were checked against.
    pub unsafe fn call(&mut self, address: usize, ret: &Type) -> Option<Scalar> {
        self.pointers = self
            .slots
            .iter_mut()
            .map(|slot| slot as *mut u64 as *mut u8)
            .collect();
        let entry: extern "C" fn(*mut *mut u8, *mut u8) = std::mem::transmute(address);
        entry(self.pointers.as_mut_ptr(), &mut self.ret as *mut u64 as *mut u8);

        let ty = ret.scalar()?;
        Scalar::from_ne_bytes(ty, &self.ret.to_ne_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_arg_access() {
        let mut data = [1i32, 2, 3];
        let mut arg = ArrayArg::new(&mut data[..]);
        assert_eq!(arg.len(), 3);
        assert_eq!(arg.get(1), Some(Scalar::I32(2)));
        assert_eq!(arg.get(3), None);
        assert!(arg.set(2, Scalar::I32(30)));
        assert!(!arg.set(0, Scalar::I64(1)));
        drop(arg);
        assert_eq!(data, [1, 2, 30]);
    }

    #[test]
    fn test_argument_checks() {
        let sig = Signature::new(Type::INT, vec![Type::INT, Type::UnboundedArray(ScalarType::Double)]);
        let mut buf = [0.0f64; 2];
        let good = [Arg::from(1i32), Arg::from(&mut buf[..])];
        assert!(check_args("f", &sig, &good).is_ok());

        let wrong = [Arg::from(1i64), Arg::from(2i32)];
        match check_args("f", &sig, &wrong) {
            Err(JitError::ArgumentType { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            check_args("f", &sig, &[Arg::from(1i32)]),
            Err(JitError::ArgumentCount { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_vectors_are_not_invocable() {
        let vec4 = Type::vector(ScalarType::Float, 4).unwrap();
        let sig = Signature::new(Type::FLOAT, vec![vec4]);
        assert!(matches!(check_invocable("v", &sig), Err(JitError::NotInvocable { .. })));
        assert!(check_invocable("s", &Signature::new(Type::Void, vec![Type::INT])).is_ok());
    }
}
