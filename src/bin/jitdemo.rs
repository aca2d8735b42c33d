//! Compile and run one of the built-in demo functions.
//!
//! ```text
//! RUST_LOG=debug jitdemo fact 6 --emit ir
//! jitdemo hypot 3 4 --optimize --emit disasm
//! ```

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use inkwell::context::Context;

use dialect_jit::ast::build::*;
use dialect_jit::ast::{BinOp, FunctionDef};
use dialect_jit::{Arg, CompilationSession, JitConfig, JitModule, Scalar, ScalarType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    Add,
    SumRange,
    Fact,
    Fib,
    IsEven,
    Hypot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Ir,
    Asm,
    Disasm,
    Stats,
}

#[derive(Debug, Parser)]
#[command(name = "jitdemo", about = "Compile a demo dialect function and call it natively")]
struct Cli {
    /// Function to compile.
    #[arg(value_enum)]
    demo: Demo,

    /// Arguments, parsed according to the parameter types.
    #[arg(allow_negative_numbers = true)]
    args: Vec<String>,

    /// Run the function pass pipeline before binding.
    #[arg(long)]
    optimize: bool,

    /// Also run the reference interpreter and compare.
    #[arg(long)]
    check: bool,

    /// Listings to print.
    #[arg(long, value_enum)]
    emit: Vec<Emit>,
}

struct DemoFunction {
    def: FunctionDef,
    ret: Type,
    params: Vec<Type>,
}

/// The functions a demo registers, entry point last.
fn demo_functions(demo: Demo) -> Vec<DemoFunction> {
    match demo {
        Demo::Add => vec![DemoFunction {
            def: func("add", &["a", "b"], vec![ret(add(name("a"), name("b")))]),
            ret: Type::INT,
            params: vec![Type::INT, Type::INT],
        }],
        Demo::SumRange => vec![DemoFunction {
            def: func(
                "sum_range",
                &["n"],
                vec![
                    assign(name("res"), int(0)),
                    for_range("i", vec![name("n")], vec![aug(name("res"), BinOp::Add, name("i"))]),
                    ret(name("res")),
                ],
            ),
            ret: Type::INT,
            params: vec![Type::INT],
        }],
        Demo::Fact => vec![DemoFunction {
            def: func(
                "fact",
                &["n"],
                vec![
                    if_(le(name("n"), int(1)), vec![ret(int(1))], vec![]),
                    ret(mul(name("n"), call("fact", vec![sub(name("n"), int(1))]))),
                ],
            ),
            ret: Type::INT64,
            params: vec![Type::INT64],
        }],
        Demo::Fib => vec![DemoFunction {
            def: func(
                "fib",
                &["n"],
                vec![
                    var(vec![("a", name("Int64")), ("b", name("Int64"))]),
                    assign(name("b"), int(1)),
                    for_range(
                        "i",
                        vec![name("n")],
                        vec![
                            assign(name("t"), add(name("a"), name("b"))),
                            assign(name("a"), name("b")),
                            assign(name("b"), name("t")),
                        ],
                    ),
                    ret(name("a")),
                ],
            ),
            ret: Type::INT64,
            params: vec![Type::INT],
        }],
        Demo::IsEven => vec![
            DemoFunction {
                def: func(
                    "is_even",
                    &["n"],
                    vec![
                        if_(eq(name("n"), int(0)), vec![ret(name("True"))], vec![]),
                        ret(call("is_odd", vec![sub(name("n"), int(1))])),
                    ],
                ),
                ret: Type::BOOL,
                params: vec![Type::INT],
            },
            DemoFunction {
                def: func(
                    "is_odd",
                    &["n"],
                    vec![
                        if_(eq(name("n"), int(0)), vec![ret(name("False"))], vec![]),
                        ret(call("is_even", vec![sub(name("n"), int(1))])),
                    ],
                ),
                ret: Type::BOOL,
                params: vec![Type::INT],
            },
        ],
        Demo::Hypot => vec![DemoFunction {
            def: func(
                "hypot",
                &["x", "y"],
                vec![ret(call(
                    "sqrt",
                    vec![add(mul(name("x"), name("x")), mul(name("y"), name("y")))],
                ))],
            ),
            ret: Type::DOUBLE,
            params: vec![Type::DOUBLE, Type::DOUBLE],
        }],
    }
}

fn parse_arg(text: &str, ty: &Type) -> Result<Arg<'static>, String> {
    let Type::Scalar(scalar) = ty else {
        return Err(format!("parameters of type {} cannot be given on the command line", ty));
    };
    let value = match scalar {
        ScalarType::Bool => match text {
            "true" | "True" | "1" => Scalar::Bool(true),
            "false" | "False" | "0" => Scalar::Bool(false),
            _ => return Err(format!("`{}` is not a Bool", text)),
        },
        s if s.is_real() => Scalar::F64(text.parse().map_err(|e| format!("`{}`: {}", text, e))?).cast(*s),
        s => Scalar::I64(text.parse().map_err(|e| format!("`{}`: {}", text, e))?).cast(*s),
    };
    Ok(Arg::Scalar(value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let context = Context::create();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = JitConfig {
        optimize_on_define: cli.optimize,
        ..JitConfig::default()
    };
    let mut jit = JitModule::with_config(&context, &session, config)?;
    jit.declare_math_builtins()?;

    let functions = demo_functions(cli.demo);
    for f in &functions {
        jit.forward_declare(&f.def.name, f.ret, f.params.clone())?;
    }
    let mut entry = None;
    for f in functions {
        let params = f.params.clone();
        let handle = jit.define(f.def, f.ret, f.params)?;
        if entry.is_none() {
            entry = Some((handle, params));
        }
    }
    let Some((handle, params)) = entry else {
        return Err("demo defines no functions".into());
    };

    if cli.args.len() != params.len() {
        return Err(format!("expected {} argument(s), got {}", params.len(), cli.args.len()).into());
    }
    let mut args = cli
        .args
        .iter()
        .zip(&params)
        .map(|(text, ty)| parse_arg(text, ty))
        .collect::<Result<Vec<_>, _>>()?;

    for emit in &cli.emit {
        match emit {
            Emit::Ir => println!("{}", jit.ir(handle)?),
            Emit::Asm => println!("{}", jit.assembly(handle)?),
            Emit::Disasm => {
                for line in jit.disassemble(handle)? {
                    println!("{}", line);
                }
            }
            Emit::Stats => {}
        }
    }

    let reference = if cli.check {
        Some(jit.run_reference(handle, &mut args)?)
    } else {
        None
    };
    let result = jit.invoke(handle, &mut args)?;
    match result {
        Some(value) => println!("{:?}", value),
        None => println!("(void)"),
    }
    if let Some(expected) = reference {
        if expected != result {
            return Err(format!("reference interpreter returned {:?}", expected).into());
        }
        println!("reference interpreter agrees");
    }

    if cli.emit.contains(&Emit::Stats) {
        println!("{}", session.stats());
    }
    Ok(())
}
