// The global namespace visible to dialect functions. Globals starts from the prelude
// (scalar type names, the Vector/Array/Slice constructors, the var and range constructs,
// True and False) and is extended by the registry with compiled, forward-declared and
// builtin functions, and by the host with module-level constants and type aliases. The
// code generator receives a snapshot of it for each function it compiles. This module
// also resolves type expressions such as `Vector(Float, N)` into Types, which both the
// code generator and the reference interpreter need for `var` declarations.

use std::fmt;

use hashbrown::HashMap;

use crate::ast::{Expr, ExprKind, Literal};
use crate::core::error::{CompileError, CompileResult};

use super::{ScalarType, Scalar, Type};

/// Type constructors callable in type expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeConstructor {
    Vector,
    Array,
    Slice,
}

/// Built-in syntactic constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construct {
    Var,
    Range,
}

/// Declared signature of a dialect or builtin function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub ret: Type,
    pub params: Vec<Type>,
}

impl Signature {
    pub fn new(ret: Type, params: impl Into<Vec<Type>>) -> Self {
        Self {
            ret,
            params: params.into(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// A callable known to the global namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRef {
    /// Index of the registry entry.
    pub id: usize,
    /// Backend symbol name.
    pub symbol: String,
    pub sig: Signature,
    /// External native symbol rather than a dialect function.
    pub builtin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalSymbol {
    Type(Type),
    TypeConstructor(TypeConstructor),
    Construct(Construct),
    Constant(Scalar),
    Function(FunctionRef),
}

/// Snapshot of global bindings.
#[derive(Debug, Clone)]
pub struct Globals {
    symbols: HashMap<String, GlobalSymbol>,
}

impl Default for Globals {
    fn default() -> Self {
        Self::prelude()
    }
}

impl Globals {
    /// Globals holding only the dialect prelude.
    pub fn prelude() -> Self {
        let mut symbols = HashMap::new();
        symbols.insert("Void".to_string(), GlobalSymbol::Type(Type::Void));
        symbols.insert("Int".to_string(), GlobalSymbol::Type(Type::INT));
        for ty in ScalarType::ALL {
            symbols.insert(ty.name().to_string(), GlobalSymbol::Type(Type::Scalar(ty)));
        }
        symbols.insert(
            "Vector".to_string(),
            GlobalSymbol::TypeConstructor(TypeConstructor::Vector),
        );
        symbols.insert(
            "Array".to_string(),
            GlobalSymbol::TypeConstructor(TypeConstructor::Array),
        );
        symbols.insert(
            "Slice".to_string(),
            GlobalSymbol::TypeConstructor(TypeConstructor::Slice),
        );
        symbols.insert("var".to_string(), GlobalSymbol::Construct(Construct::Var));
        symbols.insert("range".to_string(), GlobalSymbol::Construct(Construct::Range));
        symbols.insert("xrange".to_string(), GlobalSymbol::Construct(Construct::Range));
        symbols.insert("True".to_string(), GlobalSymbol::Constant(Scalar::Bool(true)));
        symbols.insert("False".to_string(), GlobalSymbol::Constant(Scalar::Bool(false)));
        Self { symbols }
    }

    pub fn get(&self, name: &str) -> Option<&GlobalSymbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Bind or rebind a global name.
    pub fn insert(&mut self, name: impl Into<String>, symbol: GlobalSymbol) -> Option<GlobalSymbol> {
        self.symbols.insert(name.into(), symbol)
    }

    pub fn define_constant(&mut self, name: impl Into<String>, value: Scalar) {
        self.insert(name, GlobalSymbol::Constant(value));
    }

    pub fn define_type(&mut self, name: impl Into<String>, ty: Type) {
        self.insert(name, GlobalSymbol::Type(ty));
    }

    pub fn function(&self, name: &str) -> Option<&FunctionRef> {
        match self.symbols.get(name) {
            Some(GlobalSymbol::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Resolve a type expression: a type name (`Int`), or a constructor call
    /// (`Vector(Float, 4)`, `Array(Int)`, `Array(Int, N)`, `Slice(Double)`).
    pub fn resolve_type(&self, expr: &Expr) -> CompileResult<Type> {
        match &expr.kind {
            ExprKind::Name(name) => match self.get(name) {
                Some(GlobalSymbol::Type(ty)) => Ok(*ty),
                Some(_) => Err(CompileError::invalid_construct(
                    format!("`{}` is not a type", name),
                    expr.span,
                )),
                None => Err(CompileError::undefined_symbol(name, expr.span)),
            },
            ExprKind::Call { func, args, keywords } => {
                let ctor_name = func.as_name().unwrap_or_default();
                let ctor = match self.get(ctor_name) {
                    Some(GlobalSymbol::TypeConstructor(ctor)) => *ctor,
                    _ => {
                        return Err(CompileError::invalid_construct(
                            "expected a type or type constructor",
                            expr.span,
                        ))
                    }
                };
                if !keywords.is_empty() {
                    return Err(CompileError::invalid_construct(
                        format!("`{}` takes no keyword arguments", ctor_name),
                        expr.span,
                    ));
                }
                self.construct_type(ctor, ctor_name, args, expr)
            }
            _ => Err(CompileError::invalid_construct(
                "expected a type expression",
                expr.span,
            )),
        }
    }

    fn construct_type(
        &self,
        ctor: TypeConstructor,
        ctor_name: &str,
        args: &[Expr],
        expr: &Expr,
    ) -> CompileResult<Type> {
        let arity_ok = match ctor {
            TypeConstructor::Vector => args.len() == 2,
            TypeConstructor::Array => args.len() == 1 || args.len() == 2,
            TypeConstructor::Slice => args.len() == 1,
        };
        if !arity_ok {
            return Err(CompileError::invalid_construct(
                format!("wrong number of arguments to `{}`", ctor_name),
                expr.span,
            ));
        }

        let elem = match self.resolve_type(&args[0])? {
            Type::Scalar(s) => s,
            other => {
                return Err(CompileError::invalid_construct(
                    format!("element type of `{}` must be a scalar type, not {}", ctor_name, other),
                    args[0].span,
                ))
            }
        };

        let count = args.get(1).map(|c| self.const_count(c)).transpose()?;
        let built = match (ctor, count) {
            (TypeConstructor::Slice, _) => Ok(Type::Slice(elem)),
            (TypeConstructor::Array, None) => Ok(Type::UnboundedArray(elem)),
            (TypeConstructor::Array, Some(n)) => Type::array(elem, n),
            (TypeConstructor::Vector, n) => Type::vector(elem, n.unwrap_or(0)),
        };
        built.map_err(|e| CompileError::invalid_construct(e.to_string(), expr.span))
    }

    /// Element count of a composite type: an integer literal or a name bound to
    /// an integer constant.
    fn const_count(&self, expr: &Expr) -> CompileResult<i64> {
        let value = match &expr.kind {
            ExprKind::Constant(Literal::Int(n)) => Some(*n),
            ExprKind::UnaryOp { op: crate::ast::UnaryOp::Neg, operand } => match &operand.kind {
                ExprKind::Constant(Literal::Int(n)) => n.checked_neg(),
                _ => None,
            },
            ExprKind::Name(name) => match self.get(name) {
                Some(GlobalSymbol::Constant(c)) if c.ty().is_integer() => Some(c.as_i64()),
                _ => None,
            },
            _ => None,
        };
        value.ok_or_else(|| {
            CompileError::invalid_construct(
                "element count must be a compile-time integer constant",
                expr.span,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_prelude_names() {
        let globals = Globals::prelude();
        assert_eq!(globals.get("Int"), Some(&GlobalSymbol::Type(Type::INT32)));
        assert_eq!(globals.get("True"), Some(&GlobalSymbol::Constant(Scalar::Bool(true))));
        assert_eq!(globals.get("xrange"), Some(&GlobalSymbol::Construct(Construct::Range)));
        assert!(globals.get("print").is_none());
    }

    #[test]
    fn test_resolve_composite_types() {
        let mut globals = Globals::prelude();
        globals.define_constant("N", Scalar::I32(8));

        let vec4 = globals.resolve_type(&call("Vector", vec![name("Float"), int(4)])).unwrap();
        assert_eq!(vec4, Type::Vector { elem: ScalarType::Float, count: 4 });

        let bounded = globals.resolve_type(&call("Array", vec![name("Int"), name("N")])).unwrap();
        assert_eq!(bounded, Type::Array { elem: ScalarType::Int32, count: 8 });

        let unbounded = globals.resolve_type(&call("Array", vec![name("Double")])).unwrap();
        assert_eq!(unbounded, Type::UnboundedArray(ScalarType::Double));

        let slice = globals.resolve_type(&call("Slice", vec![name("Int8")])).unwrap();
        assert_eq!(slice, Type::Slice(ScalarType::Int8));
    }

    #[test]
    fn test_reject_malformed_types() {
        let globals = Globals::prelude();
        let cases = vec![
            call("Vector", vec![name("Int"), int(0)]),
            call("Vector", vec![name("Int"), neg(int(1))]),
            call("Vector", vec![name("Int"), neg(int(i64::MIN))]),
            call("Vector", vec![name("Int")]),
            call("Vector", vec![int(3), int(4)]),
            call("Array", vec![name("Int"), name("True")]),
            call("Vector", vec![call("Vector", vec![name("Int"), int(2)]), int(2)]),
            name("range"),
        ];
        for case in cases {
            let err = globals.resolve_type(&case).unwrap_err();
            assert!(err.is_due_to(ErrorKind::InvalidUseOfConstruct), "{:?}", case);
        }

        let err = globals.resolve_type(&name("Nope")).unwrap_err();
        assert!(err.is_due_to(ErrorKind::UndefinedSymbol));
    }

    #[test]
    fn test_signature_display() {
        let sig = Signature::new(Type::INT, vec![Type::INT, Type::UnboundedArray(ScalarType::Float)]);
        assert_eq!(sig.to_string(), "(Int32, Array(Float)) -> Int32");
    }
}
