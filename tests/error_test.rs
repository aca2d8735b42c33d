//! Compile errors reported for ill-formed dialect functions.

use bumpalo::Bump;
use inkwell::context::Context;

use dialect_jit::ast::build::*;
use dialect_jit::ast::{BinOp, FunctionDef};
use dialect_jit::{CompilationSession, ErrorKind, FunctionState, JitError, JitModule, Type};

/// Define `def` in a fresh module and return the error it fails with.
fn define_error(def: FunctionDef, ret: Type, params: Vec<Type>) -> JitError {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();
    match jit.define(def, ret, params) {
        Ok(_) => panic!("definition unexpectedly compiled"),
        Err(err) => err,
    }
}

fn vector_of(elem: &str, count: i64) -> dialect_jit::ast::Expr {
    call("Vector", vec![name(elem), int(count)])
}

#[test]
fn test_undefined_symbol() {
    let err = define_error(func("f", &[], vec![ret(name("y"))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::UndefinedSymbol), "{}", err);

    let err = define_error(func("g", &[], vec![ret(call("nowhere", vec![]))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::UndefinedSymbol), "{}", err);

    let err = define_error(
        func("h", &[], vec![aug(name("acc"), BinOp::Add, int(1)), ret(int(0))]),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::UndefinedSymbol), "{}", err);
}

#[test]
fn test_variable_redeclaration() {
    let err = define_error(
        func(
            "f",
            &[],
            vec![var(vec![("x", name("Int"))]), var(vec![("x", name("Int"))]), ret(name("x"))],
        ),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::VariableRedeclaration), "{}", err);

    let err = define_error(
        func("g", &["a"], vec![var(vec![("a", name("Double"))]), ret(name("a"))]),
        Type::INT,
        vec![Type::INT],
    );
    assert!(err.is_due_to(ErrorKind::VariableRedeclaration), "{}", err);

    let err = define_error(
        func("h", &[], vec![assign(name("x"), int(1)), var(vec![("x", name("Int"))]), ret(name("x"))]),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::VariableRedeclaration), "{}", err);

    // Loop counters are declared by the loop.
    let err = define_error(
        func(
            "k",
            &["i"],
            vec![for_range("i", vec![int(3)], vec![pass()]), ret(name("i"))],
        ),
        Type::INT,
        vec![Type::INT],
    );
    assert!(err.is_due_to(ErrorKind::VariableRedeclaration), "{}", err);
}

#[test]
fn test_missing_return() {
    let err = define_error(
        func("f", &["a"], vec![if_(gt(name("a"), int(0)), vec![ret(int(1))], vec![])]),
        Type::INT,
        vec![Type::INT],
    );
    assert!(err.is_due_to(ErrorKind::MissingReturn), "{}", err);
}

#[test]
fn test_invalid_return() {
    let err = define_error(func("f", &[], vec![ret(int(1))]), Type::Void, vec![]);
    assert!(err.is_due_to(ErrorKind::InvalidReturn), "{}", err);

    let err = define_error(func("g", &[], vec![ret_void()]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::InvalidReturn), "{}", err);

    let err = define_error(
        func("h", &[], vec![var(vec![("v", vector_of("Int", 4))]), ret(name("v"))]),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::InvalidReturn), "{}", err);
}

#[test]
fn test_invalid_cast() {
    let err = define_error(
        func(
            "f",
            &[],
            vec![
                var(vec![("v", vector_of("Int", 4))]),
                assign(name("x"), int(1)),
                assign(name("x"), name("v")),
                ret(name("x")),
            ],
        ),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::InvalidCast), "{}", err);

    let err = define_error(
        func(
            "g",
            &[],
            vec![
                var(vec![("v", vector_of("Int", 4)), ("w", vector_of("Int", 2))]),
                assign(name("u"), add(name("v"), name("w"))),
                ret(int(0)),
            ],
        ),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::InvalidCast), "{}", err);
}

#[test]
fn test_invalid_subscript() {
    let err = define_error(func("f", &["x"], vec![ret(index(name("x"), int(0)))]), Type::INT, vec![Type::INT]);
    assert!(err.is_due_to(ErrorKind::InvalidSubscript), "{}", err);

    let err = define_error(
        func("g", &["a"], vec![ret(index(name("a"), real(1.5)))]),
        Type::INT,
        vec![Type::UnboundedArray(dialect_jit::ScalarType::Int32)],
    );
    assert!(err.is_due_to(ErrorKind::InvalidSubscript), "{}", err);
}

#[test]
fn test_invalid_use_of_construct() {
    for count in [0, -1] {
        let err = define_error(
            func("f", &[], vec![var(vec![("v", vector_of("Int", count))]), ret(int(0))]),
            Type::INT,
            vec![],
        );
        assert!(err.is_due_to(ErrorKind::InvalidUseOfConstruct), "Vector(Int, {}): {}", count, err);
    }

    let err = define_error(
        func("g", &[], vec![for_range("i", vec![int(0), int(10), int(2)], vec![pass()]), ret(int(0))]),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::InvalidUseOfConstruct), "{}", err);

    let err = define_error(
        func("h", &[], vec![for_range("i", vec![real(2.0)], vec![pass()]), ret(int(0))]),
        Type::INT,
        vec![],
    );
    assert!(err.is_due_to(ErrorKind::InvalidUseOfConstruct), "{}", err);

    let err = define_error(func("k", &[], vec![ret(call("range", vec![int(3)]))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::InvalidUseOfConstruct), "{}", err);
}

#[test]
fn test_invalid_call_and_operation() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();
    jit.define(func("one", &[], vec![ret(int(1))]), Type::INT, vec![]).unwrap();

    let err = jit
        .define(func("f", &[], vec![ret(call("one", vec![int(2)]))]), Type::INT, vec![])
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidCall), "{}", err);

    let err = jit
        .define(func("g", &["x"], vec![ret(call("x", vec![]))]), Type::INT, vec![Type::INT])
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidCall), "{}", err);

    let err = jit
        .define(func("h", &["x"], vec![ret(add(name("x"), name("True")))]), Type::INT, vec![Type::BOOL])
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidOperation), "{}", err);

    let err = jit
        .define(func("k", &[], vec![assign(name("True"), int(1)), ret(int(0))]), Type::INT, vec![])
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidOperation), "{}", err);
}

#[test]
fn test_unsupported_nodes_are_internal_errors() {
    let err = define_error(func("f", &[], vec![unsupported_stmt("With"), ret(int(0))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::Internal), "{}", err);

    let err = define_error(func("g", &[], vec![ret(unsupported_expr("Lambda"))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::Internal), "{}", err);
}

#[test]
fn test_function_declaration_errors() {
    let err = define_error(func("f", &["a"], vec![ret(int(0))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::FunctionDeclaration), "{}", err);

    let err = define_error(
        func("g", &["a"], vec![ret(int(0))]),
        Type::INT,
        vec![Type::Array {
            elem: dialect_jit::ScalarType::Int32,
            count: 4,
        }],
    );
    assert!(err.is_due_to(ErrorKind::FunctionDeclaration), "{}", err);

    let err = define_error(func("Int", &[], vec![ret(int(0))]), Type::INT, vec![]);
    assert!(err.is_due_to(ErrorKind::FunctionDeclaration), "{}", err);
}

#[test]
fn test_failure_leaves_registry_usable() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let err = jit.define(func("broken", &[], vec![ret(name("nope"))]), Type::INT, vec![]).unwrap_err();
    assert!(err.is_due_to(ErrorKind::UndefinedSymbol));
    let broken = jit.handle("broken").unwrap();
    assert_eq!(jit.state(broken), Some(FunctionState::Declared));
    assert!(matches!(jit.invoke(broken, &mut []), Err(JitError::NotCompiled(_))));

    let ok = jit.define(func("ok", &[], vec![ret(int(5))]), Type::INT, vec![]).unwrap();
    assert_eq!(jit.invoke(ok, &mut []).unwrap(), Some(dialect_jit::Scalar::I32(5)));
    assert_eq!(session.stats().functions_failed, 1);
}

#[test]
fn test_error_context_names_the_function() {
    let mut def = func("located", &[], vec![pass(), ret(name("missing"))]);
    def = def.with_source("demo.py", 10, "def located():\n    pass\n    return missing\n");
    let err = define_error(def, Type::INT, vec![]);
    let text = err.to_string();
    assert!(text.contains("located"), "{}", text);
    assert!(text.contains("demo.py"), "{}", text);
    assert!(text.contains("return missing"), "{}", text);
}
