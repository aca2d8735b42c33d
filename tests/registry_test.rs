//! Function registry: forward declarations, builtins, optimization and
//! native binding.

use bumpalo::Bump;
use inkwell::context::Context;

use dialect_jit::ast::build::*;
use dialect_jit::{
    CompilationSession, ErrorKind, FunctionState, JitConfig, JitError, JitModule, Scalar, Type,
};

#[test]
fn test_mutual_recursion_through_forward_declaration() {
    let _ = env_logger::builder().is_test(true).try_init();

    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let declared = jit.forward_declare("is_odd", Type::BOOL, vec![Type::INT]).unwrap();
    assert_eq!(jit.state(declared), Some(FunctionState::Declared));
    // Repeating an identical declaration is harmless.
    assert_eq!(jit.forward_declare("is_odd", Type::BOOL, vec![Type::INT]).unwrap(), declared);

    let is_even = jit
        .define(
            func(
                "is_even",
                &["n"],
                vec![
                    if_(eq(name("n"), int(0)), vec![ret(name("True"))], vec![]),
                    ret(call("is_odd", vec![sub(name("n"), int(1))])),
                ],
            ),
            Type::BOOL,
            vec![Type::INT],
        )
        .unwrap();
    let is_odd = jit
        .define(
            func(
                "is_odd",
                &["n"],
                vec![
                    if_(eq(name("n"), int(0)), vec![ret(name("False"))], vec![]),
                    ret(call("is_even", vec![sub(name("n"), int(1))])),
                ],
            ),
            Type::BOOL,
            vec![Type::INT],
        )
        .unwrap();
    assert_eq!(is_odd, declared);

    assert_eq!(jit.invoke(is_even, &mut [10i32.into()]).unwrap(), Some(Scalar::Bool(true)));
    assert_eq!(jit.invoke(is_even, &mut [7i32.into()]).unwrap(), Some(Scalar::Bool(false)));
    assert_eq!(jit.invoke(is_odd, &mut [7i32.into()]).unwrap(), Some(Scalar::Bool(true)));
    assert_eq!(jit.state(is_even), Some(FunctionState::Sealed));
    assert_eq!(jit.state(is_odd), Some(FunctionState::Sealed));
    println!("✅ mutual recursion test passed!");
}

#[test]
fn test_unresolved_callee_blocks_invocation() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    jit.forward_declare("later", Type::INT, vec![Type::INT]).unwrap();
    let outer = jit
        .define(
            func("outer", &["x"], vec![ret(add(call("later", vec![name("x")]), int(1)))]),
            Type::INT,
            vec![Type::INT],
        )
        .unwrap();

    let err = jit.invoke(outer, &mut [1i32.into()]).unwrap_err();
    assert!(matches!(err, JitError::UnresolvedCallee { ref callee, .. } if callee == "later"), "{}", err);
    assert_eq!(jit.state(outer), Some(FunctionState::Compiled));

    jit.define(func("later", &["x"], vec![ret(mul(name("x"), int(3)))]), Type::INT, vec![Type::INT])
        .unwrap();
    assert_eq!(jit.invoke(outer, &mut [2i32.into()]).unwrap(), Some(Scalar::I32(7)));
}

#[test]
fn test_declaration_conflicts() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    jit.forward_declare("f", Type::INT, vec![Type::INT]).unwrap();
    let err = jit.forward_declare("f", Type::DOUBLE, vec![Type::INT]).unwrap_err();
    assert!(err.is_due_to(ErrorKind::FunctionDeclaration), "{}", err);

    let err = jit
        .define(func("f", &["x"], vec![ret(name("x"))]), Type::INT64, vec![Type::INT64])
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::FunctionDeclaration), "{}", err);

    jit.define(func("f", &["x"], vec![ret(name("x"))]), Type::INT, vec![Type::INT]).unwrap();
    let err = jit
        .define(func("f", &["x"], vec![ret(name("x"))]), Type::INT, vec![Type::INT])
        .unwrap_err();
    assert!(err.is_due_to(ErrorKind::FunctionDeclaration), "{}", err);
}

#[test]
fn test_functions_added_after_binding() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let square = jit
        .define(func("square", &["x"], vec![ret(mul(name("x"), name("x")))]), Type::INT, vec![Type::INT])
        .unwrap();
    assert_eq!(jit.invoke(square, &mut [5i32.into()]).unwrap(), Some(Scalar::I32(25)));

    let quad = jit
        .define(
            func("quad", &["x"], vec![ret(call("square", vec![call("square", vec![name("x")])]))]),
            Type::INT,
            vec![Type::INT],
        )
        .unwrap();
    assert_eq!(jit.invoke(quad, &mut [3i32.into()]).unwrap(), Some(Scalar::I32(81)));
    assert_eq!(session.stats().native_bindings, 2);
}

#[test]
fn test_math_builtins_and_host_globals() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();
    jit.declare_math_builtins().unwrap();
    jit.define_constant("SCALE", Scalar::I32(8)).unwrap();
    jit.define_type("Real", Type::DOUBLE).unwrap();

    let err = jit.define_constant("SCALE", Scalar::I32(9)).unwrap_err();
    assert!(err.is_due_to(ErrorKind::VariableRedeclaration), "{}", err);

    let hypot = jit
        .define(
            func(
                "hypot",
                &["x", "y"],
                vec![ret(call("sqrt", vec![add(mul(name("x"), name("x")), mul(name("y"), name("y")))]))],
            ),
            Type::DOUBLE,
            vec![Type::DOUBLE, Type::DOUBLE],
        )
        .unwrap();
    let scaled = jit
        .define(
            func(
                "scaled",
                &["x"],
                vec![
                    var(vec![("r", name("Real"))]),
                    assign(name("r"), mul(name("x"), name("SCALE"))),
                    ret(call("floor", vec![name("r")])),
                ],
            ),
            Type::DOUBLE,
            vec![Type::DOUBLE],
        )
        .unwrap();

    assert_eq!(jit.invoke(hypot, &mut [3.0f64.into(), 4.0f64.into()]).unwrap(), Some(Scalar::F64(5.0)));
    assert_eq!(jit.invoke(scaled, &mut [1.3f64.into()]).unwrap(), Some(Scalar::F64(10.0)));
    assert_eq!(jit.run_reference(hypot, &mut [3.0f64.into(), 4.0f64.into()]).unwrap(), Some(Scalar::F64(5.0)));
}

#[test]
fn test_single_precision_and_stdio_builtins() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();
    jit.declare_math_builtins().unwrap();
    jit.declare_stdio_builtins().unwrap();

    let norm = jit
        .define(
            func(
                "norm",
                &["x", "e"],
                vec![ret(add(call("sqrtf", vec![name("x")]), call("powf", vec![real(2.0), name("e")])))],
            ),
            Type::FLOAT,
            vec![Type::FLOAT, Type::FLOAT],
        )
        .unwrap();
    let rounded = jit
        .define(
            func("rounded", &["x"], vec![ret(sub(call("ceilf", vec![name("x")]), call("floorf", vec![name("x")])))]),
            Type::FLOAT,
            vec![Type::FLOAT],
        )
        .unwrap();
    let shout = jit
        .define(func("shout", &["c"], vec![ret(call("putchar", vec![name("c")]))]), Type::INT, vec![Type::INT])
        .unwrap();

    // sqrtf(16) + powf(2, 10)
    let args = || vec![16.0f32.into(), 10.0f32.into()];
    assert_eq!(jit.invoke(norm, &mut args()).unwrap(), Some(Scalar::F32(1028.0)));
    assert_eq!(jit.run_reference(norm, &mut args()).unwrap(), Some(Scalar::F32(1028.0)));
    assert_eq!(jit.invoke(rounded, &mut [2.5f32.into()]).unwrap(), Some(Scalar::F32(1.0)));
    assert_eq!(jit.run_reference(rounded, &mut [2.5f32.into()]).unwrap(), Some(Scalar::F32(1.0)));

    assert_eq!(jit.invoke(shout, &mut [65i32.into()]).unwrap(), Some(Scalar::I32(65)));
    assert_eq!(jit.run_reference(shout, &mut [10i32.into()]).unwrap(), Some(Scalar::I32(10)));

    let err = jit.declare_stdio_builtins().unwrap_err();
    assert!(err.is_due_to(ErrorKind::VariableRedeclaration), "{}", err);
}

#[test]
fn test_optimize_is_idempotent_until_sealed() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let poly = jit
        .define(
            func(
                "poly",
                &["x"],
                vec![assign(name("y"), add(mul(name("x"), name("x")), int(1))), ret(name("y"))],
            ),
            Type::INT,
            vec![Type::INT],
        )
        .unwrap();
    assert!(jit.ir(poly).unwrap().contains("alloca"));

    jit.optimize(poly).unwrap();
    jit.optimize(poly).unwrap();
    assert_eq!(session.stats().optimizations_run, 1);
    assert!(!jit.ir(poly).unwrap().contains("alloca"));

    assert_eq!(jit.invoke(poly, &mut [4i32.into()]).unwrap(), Some(Scalar::I32(17)));
    let err = jit.optimize(poly).unwrap_err();
    assert!(matches!(err, JitError::AlreadyFinalized(_)), "{}", err);

    let missing = jit.forward_declare("missing", Type::INT, vec![]).unwrap();
    assert!(matches!(jit.optimize(missing), Err(JitError::NotCompiled(_))));
}

#[test]
fn test_optimize_on_define() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = JitConfig {
        optimize_on_define: true,
        ..JitConfig::default()
    };
    let mut jit = JitModule::with_config(&context, &session, config).unwrap();

    let inc = jit
        .define(func("inc", &["x"], vec![ret(add(name("x"), int(1)))]), Type::INT64, vec![Type::INT64])
        .unwrap();
    assert_eq!(session.stats().optimizations_run, 1);
    assert_eq!(jit.invoke(inc, &mut [41i64.into()]).unwrap(), Some(Scalar::I64(42)));
}

#[test]
fn test_assembly_listing() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let twice = jit
        .define(func("twice", &["x"], vec![ret(mul(name("x"), int(2)))]), Type::INT, vec![Type::INT])
        .unwrap();
    let asm = jit.assembly(twice).unwrap();
    assert!(asm.contains("dialect.twice"), "{}", asm);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_disassembly() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let twice = jit
        .define(func("twice", &["x"], vec![ret(mul(name("x"), int(2)))]), Type::INT, vec![Type::INT])
        .unwrap();
    let lines = jit.disassemble(twice).unwrap();
    assert!(!lines.is_empty());
    assert!(lines.iter().any(|l| l.contains("ret")), "{:#?}", lines);

    // Listings remain available once the function is bound.
    assert_eq!(jit.invoke(twice, &mut [21i32.into()]).unwrap(), Some(Scalar::I32(42)));
    assert!(!jit.disassemble(twice).unwrap().is_empty());

    // The module carries the function's name too; only the code symbol counts.
    let sign = jit
        .define(
            func("sign", &["x"], vec![if_(lt(name("x"), int(0)), vec![ret(int(-1))], vec![]), ret(int(1))]),
            Type::INT,
            vec![Type::INT],
        )
        .unwrap();
    let lines = jit.disassemble(sign).unwrap();
    assert!(lines.iter().any(|l| l.contains("ret")), "{:#?}", lines);
}

#[test]
fn test_session_statistics() {
    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut jit = JitModule::new(&context, &session).unwrap();

    let clamp = jit
        .define(
            func(
                "clamp",
                &["x"],
                vec![
                    if_(lt(name("x"), int(0)), vec![ret(int(0))], vec![]),
                    if_(gt(name("x"), int(9)), vec![ret(int(9))], vec![]),
                    ret(name("x")),
                ],
            ),
            Type::INT,
            vec![Type::INT],
        )
        .unwrap();
    jit.invoke(clamp, &mut [5i32.into()]).unwrap();

    let stats = session.stats();
    assert_eq!(stats.functions_compiled, 1);
    assert_eq!(stats.largest_function_name, "clamp");
    assert!(stats.blocks_created >= 4);
    assert_eq!(stats.instruction_counts.get("icmp"), Some(&2));
    assert_eq!(stats.instruction_counts.get("ret"), Some(&3));

    let text = stats.to_string();
    assert!(text.contains("Functions compiled: 1"), "{}", text);
    assert!(text.contains("Native bindings: 1"), "{}", text);
}
