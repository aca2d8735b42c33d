// Typed scalar constants. Scalar is the compile-time representation of a literal or a
// module-level constant, and the runtime representation used by the reference
// interpreter. Its cast method follows the same conversion rules the code generator
// emits as LLVM instructions: integers sign-extend or truncate, integer to real is a
// signed conversion, real to integer truncates toward zero, anything to Bool compares
// against zero and Bool widens as an unsigned bit. Keeping both paths on one rule set
// lets native results be checked against the interpreter.

use std::fmt;

use super::ScalarType;

/// A typed scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    pub fn ty(&self) -> ScalarType {
        match self {
            Scalar::Bool(_) => ScalarType::Bool,
            Scalar::I8(_) => ScalarType::Int8,
            Scalar::I16(_) => ScalarType::Int16,
            Scalar::I32(_) => ScalarType::Int32,
            Scalar::I64(_) => ScalarType::Int64,
            Scalar::F32(_) => ScalarType::Float,
            Scalar::F64(_) => ScalarType::Double,
        }
    }

    /// Zero of the given type.
    pub fn zero(ty: ScalarType) -> Scalar {
        Scalar::I64(0).cast(ty)
    }

    /// Integer view, sign-extended (Bool is 0 or 1, reals truncate).
    pub fn as_i64(&self) -> i64 {
        match *self {
            Scalar::Bool(b) => b as i64,
            Scalar::I8(v) => v as i64,
            Scalar::I16(v) => v as i64,
            Scalar::I32(v) => v as i64,
            Scalar::I64(v) => v,
            Scalar::F32(v) => v as i64,
            Scalar::F64(v) => v as i64,
        }
    }

    /// Real view.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
            other => other.as_i64() as f64,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match *self {
            Scalar::Bool(b) => b,
            Scalar::F32(v) => v != 0.0,
            Scalar::F64(v) => v != 0.0,
            other => other.as_i64() != 0,
        }
    }

    /// Convert to `to` with the dialect's cast rules.
    pub fn cast(self, to: ScalarType) -> Scalar {
        if self.ty() == to {
            return self;
        }
        if to == ScalarType::Bool {
            return Scalar::Bool(self.is_truthy());
        }
        if self.ty().is_real() {
            let v = self.as_f64();
            return match to {
                ScalarType::Float => Scalar::F32(v as f32),
                ScalarType::Double => Scalar::F64(v),
                ScalarType::Int8 => Scalar::I8(v as i8),
                ScalarType::Int16 => Scalar::I16(v as i16),
                ScalarType::Int32 => Scalar::I32(v as i32),
                _ => Scalar::I64(v as i64),
            };
        }
        let v = self.as_i64();
        match to {
            ScalarType::Int8 => Scalar::I8(v as i8),
            ScalarType::Int16 => Scalar::I16(v as i16),
            ScalarType::Int32 => Scalar::I32(v as i32),
            ScalarType::Int64 => Scalar::I64(v),
            ScalarType::Float => Scalar::F32(v as f32),
            ScalarType::Double => Scalar::F64(v as f64),
            ScalarType::Bool => Scalar::Bool(v != 0),
        }
    }

    /// Native-order bytes as stored in memory or passed natively.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match *self {
            Scalar::Bool(b) => vec![b as u8],
            Scalar::I8(v) => v.to_ne_bytes().to_vec(),
            Scalar::I16(v) => v.to_ne_bytes().to_vec(),
            Scalar::I32(v) => v.to_ne_bytes().to_vec(),
            Scalar::I64(v) => v.to_ne_bytes().to_vec(),
            Scalar::F32(v) => v.to_ne_bytes().to_vec(),
            Scalar::F64(v) => v.to_ne_bytes().to_vec(),
        }
    }

    /// Inverse of [`Scalar::to_ne_bytes`]. `bytes` must hold at least
    /// `ty.byte_size()` bytes.
    pub fn from_ne_bytes(ty: ScalarType, bytes: &[u8]) -> Option<Scalar> {
        let bytes = bytes.get(..ty.byte_size())?;
        Some(match ty {
            ScalarType::Bool => Scalar::Bool(bytes[0] != 0),
            ScalarType::Int8 => Scalar::I8(i8::from_ne_bytes(bytes.try_into().ok()?)),
            ScalarType::Int16 => Scalar::I16(i16::from_ne_bytes(bytes.try_into().ok()?)),
            ScalarType::Int32 => Scalar::I32(i32::from_ne_bytes(bytes.try_into().ok()?)),
            ScalarType::Int64 => Scalar::I64(i64::from_ne_bytes(bytes.try_into().ok()?)),
            ScalarType::Float => Scalar::F32(f32::from_ne_bytes(bytes.try_into().ok()?)),
            ScalarType::Double => Scalar::F64(f64::from_ne_bytes(bytes.try_into().ok()?)),
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Scalar::I8(v) => write!(f, "{}", v),
            Scalar::I16(v) => write!(f, "{}", v),
            Scalar::I32(v) => write!(f, "{}", v),
            Scalar::I64(v) => write!(f, "{}", v),
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
        }
    }
}
