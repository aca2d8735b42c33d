// This module implements the dialect's type lattice: Void, Bool, signed integers of 8 to
// 64 bits, Float, Double, fixed-width vectors, stack-allocated bounded arrays, pointer-based
// unbounded arrays and slice views. Each scalar carries a rank that drives promotion in
// binary operators (the higher rank wins); a vector operand absorbs a scalar operand by
// broadcasting it. The module is backend-neutral: the mapping to LLVM machine types lives
// in llvm::types, while the typed constant representation shared by the code generator
// and the reference interpreter lives in the value submodule. The prelude submodule
// describes the names every function sees (type names, constructs, True/False) and
// resolves type expressions written in `var` declarations and registry signatures.

//! Dialect type system.

use std::fmt;

use crate::ast::Literal;

pub mod prelude;
pub mod value;

pub use prelude::{GlobalSymbol, Globals};
pub use value::Scalar;

/// Scalar element types, ordered by promotion rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
}

impl ScalarType {
    pub const ALL: [ScalarType; 7] = [
        ScalarType::Bool,
        ScalarType::Int8,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::Float,
        ScalarType::Double,
    ];

    /// Promotion rank. Void is rank 0 and has no scalar representation.
    pub fn rank(self) -> u8 {
        match self {
            ScalarType::Bool => 1,
            ScalarType::Int8 => 2,
            ScalarType::Int16 => 3,
            ScalarType::Int32 => 4,
            ScalarType::Int64 => 5,
            ScalarType::Float => 6,
            ScalarType::Double => 7,
        }
    }

    /// Width of the backend representation in bits.
    pub fn bits(self) -> u32 {
        match self {
            ScalarType::Bool => 1,
            ScalarType::Int8 => 8,
            ScalarType::Int16 => 16,
            ScalarType::Int32 | ScalarType::Float => 32,
            ScalarType::Int64 | ScalarType::Double => 64,
        }
    }

    /// Size of one element in memory (and at the native boundary).
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::Bool => 1,
            other => (other.bits() / 8) as usize,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64
        )
    }

    pub fn is_real(self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }

    pub fn is_bool(self) -> bool {
        self == ScalarType::Bool
    }

    /// All dialect integers are signed; Bool behaves as an unsigned bit.
    pub fn is_signed(self) -> bool {
        self.is_integer()
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "Bool",
            ScalarType::Int8 => "Int8",
            ScalarType::Int16 => "Int16",
            ScalarType::Int32 => "Int32",
            ScalarType::Int64 => "Int64",
            ScalarType::Float => "Float",
            ScalarType::Double => "Double",
        }
    }

    /// Higher rank of two scalar types.
    pub fn promote(self, other: ScalarType) -> ScalarType {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dialect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(ScalarType),
    /// Fixed-width SIMD value. Vectors are values, not memory.
    Vector { elem: ScalarType, count: u32 },
    /// Stack-allocated array whose length is known at compile time.
    Array { elem: ScalarType, count: u32 },
    /// Pointer to elements; the length travels separately.
    UnboundedArray(ScalarType),
    /// A view into an array starting at some offset.
    Slice(ScalarType),
}

/// Reasons a composite type cannot be formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeError {
    NonPositiveCount(i64),
    CountTooLarge(i64),
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::NonPositiveCount(n) => write!(f, "element count must be positive, got {}", n),
            TypeError::CountTooLarge(n) => write!(f, "element count {} is too large", n),
        }
    }
}

fn checked_count(count: i64) -> Result<u32, TypeError> {
    if count <= 0 {
        return Err(TypeError::NonPositiveCount(count));
    }
    u32::try_from(count).map_err(|_| TypeError::CountTooLarge(count))
}

impl Type {
    pub const BOOL: Type = Type::Scalar(ScalarType::Bool);
    pub const INT8: Type = Type::Scalar(ScalarType::Int8);
    pub const INT16: Type = Type::Scalar(ScalarType::Int16);
    pub const INT32: Type = Type::Scalar(ScalarType::Int32);
    pub const INT64: Type = Type::Scalar(ScalarType::Int64);
    pub const FLOAT: Type = Type::Scalar(ScalarType::Float);
    pub const DOUBLE: Type = Type::Scalar(ScalarType::Double);
    /// `Int` in dialect source.
    pub const INT: Type = Type::INT32;

    pub fn vector(elem: ScalarType, count: i64) -> Result<Type, TypeError> {
        Ok(Type::Vector {
            elem,
            count: checked_count(count)?,
        })
    }

    pub fn array(elem: ScalarType, count: i64) -> Result<Type, TypeError> {
        Ok(Type::Array {
            elem,
            count: checked_count(count)?,
        })
    }

    /// Promotion rank; composite types rank as their element.
    pub fn rank(&self) -> u8 {
        match self {
            Type::Void => 0,
            Type::Scalar(s) => s.rank(),
            Type::Vector { elem, .. }
            | Type::Array { elem, .. }
            | Type::UnboundedArray(elem)
            | Type::Slice(elem) => elem.rank(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Element type of vectors and array-like types.
    pub fn element(&self) -> Option<ScalarType> {
        match self {
            Type::Vector { elem, .. }
            | Type::Array { elem, .. }
            | Type::UnboundedArray(elem)
            | Type::Slice(elem) => Some(*elem),
            _ => None,
        }
    }

    /// Arrays of any flavour: indexed through memory.
    pub fn is_array_like(&self) -> bool {
        matches!(
            self,
            Type::Array { .. } | Type::UnboundedArray(_) | Type::Slice(_)
        )
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector { .. })
    }

    /// Element kind used to select operator implementations.
    pub fn operand_kind(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) => Some(*s),
            Type::Vector { elem, .. } => Some(*elem),
            _ => None,
        }
    }
}

impl From<ScalarType> for Type {
    fn from(s: ScalarType) -> Self {
        Type::Scalar(s)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "Void"),
            Type::Scalar(s) => write!(f, "{}", s),
            Type::Vector { elem, count } => write!(f, "Vector({}, {})", elem, count),
            Type::Array { elem, count } => write!(f, "Array({}, {})", elem, count),
            Type::UnboundedArray(elem) => write!(f, "Array({})", elem),
            Type::Slice(elem) => write!(f, "Slice({})", elem),
        }
    }
}

/// Common type of a binary operation's operands.
///
/// Two scalars promote to the higher rank. A vector absorbs a scalar (which
/// is later broadcast); two vectors must agree on element type and width.
pub fn coerce(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        (Type::Scalar(x), Type::Scalar(y)) => Some(Type::Scalar(x.promote(*y))),
        (Type::Vector { .. }, Type::Scalar(_)) => Some(*a),
        (Type::Scalar(_), Type::Vector { .. }) => Some(*b),
        (Type::Vector { .. }, Type::Vector { .. }) if a == b => Some(*a),
        _ => None,
    }
}

/// True when a value of type `from` may be converted to `to`.
///
/// Scalars convert among each other; a scalar broadcasts into a vector;
/// bounded arrays decay to unbounded arrays and slices, which interconvert
/// when the element types agree.
pub fn castable(from: &Type, to: &Type) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (Type::Scalar(_), Type::Scalar(_)) => true,
        (Type::Scalar(_), Type::Vector { .. }) => true,
        (
            Type::Array { elem: a, .. } | Type::UnboundedArray(a) | Type::Slice(a),
            Type::UnboundedArray(b) | Type::Slice(b),
        ) => a == b,
        _ => false,
    }
}

/// Type of a literal constant, or None for literals the dialect cannot hold.
pub fn literal_type(lit: &Literal) -> Option<ScalarType> {
    match lit {
        Literal::Int(v) => {
            if i32::try_from(*v).is_ok() {
                Some(ScalarType::Int32)
            } else {
                Some(ScalarType::Int64)
            }
        }
        Literal::Real(_) => Some(ScalarType::Double),
        Literal::Bool(_) => Some(ScalarType::Bool),
        Literal::Str(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_follow_declaration_order() {
        let ranks: Vec<u8> = ScalarType::ALL.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(Type::Void.rank(), 0);
        assert_eq!(Type::Vector { elem: ScalarType::Float, count: 4 }.rank(), 6);
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(coerce(&Type::INT32, &Type::INT64), Some(Type::INT64));
        assert_eq!(coerce(&Type::INT64, &Type::FLOAT), Some(Type::FLOAT));
        assert_eq!(coerce(&Type::BOOL, &Type::INT8), Some(Type::INT8));
        assert_eq!(coerce(&Type::DOUBLE, &Type::INT32), Some(Type::DOUBLE));
    }

    #[test]
    fn test_vector_coercion() {
        let v4 = Type::vector(ScalarType::Int32, 4).unwrap();
        let v8 = Type::vector(ScalarType::Int32, 8).unwrap();
        let f4 = Type::vector(ScalarType::Float, 4).unwrap();

        assert_eq!(coerce(&v4, &Type::INT32), Some(v4));
        assert_eq!(coerce(&Type::DOUBLE, &v4), Some(v4));
        assert_eq!(coerce(&v4, &v4), Some(v4));
        assert_eq!(coerce(&v4, &v8), None);
        assert_eq!(coerce(&v4, &f4), None);
        assert_eq!(coerce(&Type::UnboundedArray(ScalarType::Int32), &Type::INT32), None);
        assert_eq!(coerce(&Type::Void, &Type::INT32), None);
    }

    #[test]
    fn test_composite_counts() {
        assert!(Type::vector(ScalarType::Int32, 4).is_ok());
        assert_eq!(
            Type::vector(ScalarType::Int32, 0),
            Err(TypeError::NonPositiveCount(0))
        );
        assert_eq!(
            Type::array(ScalarType::Int32, -1),
            Err(TypeError::NonPositiveCount(-1))
        );
        assert_eq!(
            Type::array(ScalarType::Int8, 1 << 40),
            Err(TypeError::CountTooLarge(1 << 40))
        );
    }

    #[test]
    fn test_castability() {
        let bounded = Type::array(ScalarType::Float, 8).unwrap();
        assert!(castable(&bounded, &Type::UnboundedArray(ScalarType::Float)));
        assert!(castable(&Type::Slice(ScalarType::Float), &Type::UnboundedArray(ScalarType::Float)));
        assert!(!castable(&bounded, &Type::UnboundedArray(ScalarType::Double)));
        assert!(!castable(&bounded, &Type::FLOAT));
        assert!(castable(&Type::INT32, &Type::vector(ScalarType::Float, 4).unwrap()));
        assert!(!castable(
            &Type::vector(ScalarType::Float, 4).unwrap(),
            &Type::vector(ScalarType::Double, 4).unwrap()
        ));
    }

    #[test]
    fn test_literal_typing() {
        assert_eq!(literal_type(&Literal::Int(7)), Some(ScalarType::Int32));
        assert_eq!(literal_type(&Literal::Int(1 << 40)), Some(ScalarType::Int64));
        assert_eq!(literal_type(&Literal::Int(i32::MIN as i64)), Some(ScalarType::Int32));
        assert_eq!(literal_type(&Literal::Real(0.5)), Some(ScalarType::Double));
        assert_eq!(literal_type(&Literal::Bool(true)), Some(ScalarType::Bool));
        assert_eq!(literal_type(&Literal::Str("s".into())), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::INT.to_string(), "Int32");
        assert_eq!(Type::vector(ScalarType::Float, 4).unwrap().to_string(), "Vector(Float, 4)");
        assert_eq!(Type::UnboundedArray(ScalarType::Double).to_string(), "Array(Double)");
        assert_eq!(Type::Slice(ScalarType::Int8).to_string(), "Slice(Int8)");
    }
}
