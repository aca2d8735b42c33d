//! Vectors, bounded and unbounded arrays, and slices.

use bumpalo::Bump;
use inkwell::context::Context;

use dialect_jit::ast::build::*;
use dialect_jit::ast::{BinOp, Expr};
use dialect_jit::{Arg, CompilationSession, ErrorKind, JitError, JitModule, Scalar, ScalarType, Type};

fn vector_of(elem: &str, count: i64) -> Expr {
    call("Vector", vec![name(elem), int(count)])
}

fn array_of(elem: &str, count: i64) -> Expr {
    call("Array", vec![name(elem), int(count)])
}

#[test]
fn test_vector_lanes() {
    let _ = env_logger::builder().is_test(true).try_init();

    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let lanes = jit
        .define(
            func(
                "lanes",
                &[],
                vec![
                    var(vec![("v", vector_of("Int", 4))]),
                    assign(index(name("v"), int(1)), int(5)),
                    aug(name("v"), BinOp::Add, int(1)),
                    aug(index(name("v"), int(3)), BinOp::Mul, int(10)),
                    ret(add(add(index(name("v"), int(1)), index(name("v"), int(0))), index(name("v"), int(3)))),
                ],
            ),
            Type::INT,
            vec![],
        )
        .unwrap();

    // v = [1, 6, 1, 10]
    assert_eq!(jit.invoke(lanes, &mut []).unwrap(), Some(Scalar::I32(17)));
    println!("✅ vector lane test passed!");
}

#[test]
fn test_vector_broadcast_arithmetic() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let dot = jit
        .define(
            func(
                "square_sum",
                &["x"],
                vec![
                    var(vec![("v", vector_of("Double", 2))]),
                    assign(name("v"), name("x")),
                    assign(index(name("v"), int(1)), real(0.5)),
                    assign(name("w"), mul(name("v"), name("v"))),
                    ret(add(index(name("w"), int(0)), index(name("w"), int(1)))),
                ],
            ),
            Type::DOUBLE,
            vec![Type::DOUBLE],
        )
        .unwrap();

    assert_eq!(jit.invoke(dot, &mut [1.5f64.into()]).unwrap(), Some(Scalar::F64(2.5)));
}

#[test]
fn test_vector_parameters_are_not_invocable() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let first = jit
        .define(
            func("first", &["v"], vec![ret(index(name("v"), int(0)))]),
            Type::INT,
            vec![Type::vector(ScalarType::Int32, 4).unwrap()],
        )
        .unwrap();
    let caller = jit
        .define(
            func(
                "caller",
                &["x"],
                vec![
                    var(vec![("v", vector_of("Int", 4))]),
                    assign(name("v"), name("x")),
                    ret(call("first", vec![name("v")])),
                ],
            ),
            Type::INT,
            vec![Type::INT],
        )
        .unwrap();

    assert!(matches!(jit.invoke(first, &mut [1i32.into()]), Err(JitError::NotInvocable { .. })));
    // Vectors still pass between dialect functions.
    assert_eq!(jit.invoke(caller, &mut [9i32.into()]).unwrap(), Some(Scalar::I32(9)));
}

#[test]
fn test_bounded_array_local() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let squares = jit
        .define(
            func(
                "squares",
                &[],
                vec![
                    var(vec![("a", array_of("Int", 5))]),
                    for_range("i", vec![int(5)], vec![assign(index(name("a"), name("i")), mul(name("i"), name("i")))]),
                    assign(name("total"), int(0)),
                    for_range("j", vec![int(5)], vec![aug(name("total"), BinOp::Add, index(name("a"), name("j")))]),
                    ret(name("total")),
                ],
            ),
            Type::INT,
            vec![],
        )
        .unwrap();

    assert_eq!(jit.invoke(squares, &mut []).unwrap(), Some(Scalar::I32(30)));
}

#[test]
fn test_array_argument_is_updated_in_place() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let bump = jit
        .define(
            func(
                "bump",
                &["a", "n"],
                vec![for_range(
                    "i",
                    vec![name("n")],
                    vec![aug(index(name("a"), name("i")), BinOp::Add, name("i"))],
                )],
            ),
            Type::Void,
            vec![Type::UnboundedArray(ScalarType::Int32), Type::INT],
        )
        .unwrap();

    let mut buffer = [10i32, 10, 10];
    let result = jit.invoke(bump, &mut [Arg::from(&mut buffer[..]), 3i32.into()]).unwrap();
    assert_eq!(result, None);
    assert_eq!(buffer, [10, 11, 12]);

    let mut wide = [0i64; 3];
    let err = jit.invoke(bump, &mut [Arg::from(&mut wide[..]), 3i32.into()]).unwrap_err();
    assert!(matches!(err, JitError::ArgumentType { index: 0, .. }), "{}", err);
    let err = jit.invoke(bump, &mut [3i32.into()]).unwrap_err();
    assert!(matches!(err, JitError::ArgumentCount { expected: 2, got: 1, .. }), "{}", err);
}

#[test]
fn test_slices() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let sum_from = jit
        .define(
            func(
                "sum_from",
                &["a", "start", "n"],
                vec![
                    assign(name("s"), slice(name("a"), Some(name("start")), None)),
                    assign(name("total"), real(0.0)),
                    for_range("i", vec![name("n")], vec![aug(name("total"), BinOp::Add, index(name("s"), name("i")))]),
                    ret(name("total")),
                ],
            ),
            Type::DOUBLE,
            vec![Type::Slice(ScalarType::Double), Type::INT, Type::INT],
        )
        .unwrap();

    let mut data = [1.0f64, 2.0, 3.0, 4.0];
    assert_eq!(
        jit.invoke(sum_from, &mut [Arg::from(&mut data[..]), 1i32.into(), 3i32.into()]).unwrap(),
        Some(Scalar::F64(9.0))
    );

    let err = jit
        .define(
            func("bounded", &["a"], vec![assign(name("s"), slice(name("a"), Some(int(0)), Some(int(2)))), ret(int(0))]),
            Type::INT,
            vec![Type::Slice(ScalarType::Double)],
        )
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidSubscript), "{}", err);

    let err = jit
        .define(
            func("store_slice", &["a"], vec![assign(slice(name("a"), Some(int(1)), None), real(1.0)), ret(int(0))]),
            Type::INT,
            vec![Type::Slice(ScalarType::Double)],
        )
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidSubscript), "{}", err);
}

#[test]
fn test_local_arrays_pass_to_callees() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    jit.define(
        func(
            "total",
            &["a", "n"],
            vec![
                assign(name("t"), int(0)),
                for_range("i", vec![name("n")], vec![aug(name("t"), BinOp::Add, index(name("a"), name("i")))]),
                ret(name("t")),
            ],
        ),
        Type::INT,
        vec![Type::UnboundedArray(ScalarType::Int32), Type::INT],
    )
    .unwrap();
    let caller = jit
        .define(
            func(
                "caller",
                &[],
                vec![
                    var(vec![("a", array_of("Int", 3))]),
                    assign(index(name("a"), int(0)), int(1)),
                    assign(index(name("a"), int(1)), int(2)),
                    assign(index(name("a"), int(2)), int(3)),
                    assign(name("whole"), call("total", vec![name("a"), int(3)])),
                    assign(name("tail"), call("total", vec![slice(name("a"), Some(int(1)), None), int(2)])),
                    ret(add(mul(name("whole"), int(100)), name("tail"))),
                ],
            ),
            Type::INT,
            vec![],
        )
        .unwrap();

    assert_eq!(jit.invoke(caller, &mut []).unwrap(), Some(Scalar::I32(605)));
}

#[test]
fn test_bounded_arrays_reject_whole_assignment() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let err = jit
        .define(
            func(
                "f",
                &[],
                vec![
                    var(vec![("a", array_of("Int", 3)), ("b", array_of("Int", 3))]),
                    assign(name("a"), name("b")),
                    ret(int(0)),
                ],
            ),
            Type::INT,
            vec![],
        )
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::InvalidOperation), "{}", err);
}
