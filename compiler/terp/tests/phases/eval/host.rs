//! Host packages: functions, constants, variables, callbacks and errors.

use pretty_assertions::assert_eq;
use terp::{
    error_value, AstBuilder, BinaryOp, Error, ErrorCode, HostError, HostPackage,
    HostPackageBuilder, HostSignature, HostType, Interpreter, NodeId, PanicKind, Value,
};

use crate::common::{main_fn, println};

fn strings_pkg() -> HostPackage {
    HostPackageBuilder::new("strings")
        .func(
            "ToUpper",
            HostSignature::new(vec![HostType::String], vec![HostType::String]),
            |_, args| {
                let s = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(vec![Value::string(s.to_uppercase())])
            },
        )
        .func(
            "Join",
            HostSignature::new(
                vec![HostType::String, HostType::Slice(Box::new(HostType::String))],
                vec![HostType::String],
            )
            .variadic(),
            |_, args| {
                let sep = args.first().and_then(Value::as_str).unwrap_or_default();
                let parts: Vec<String> = match args.get(1) {
                    Some(Value::Slice(parts)) => parts
                        .to_vec()
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(vec![Value::string(parts.join(sep))])
            },
        )
        .build()
}

fn conv_pkg() -> HostPackage {
    HostPackageBuilder::new("example.com/conv")
        .constant("Base", HostType::Int, Value::Int(10))
        .var("Calls", HostType::Int, Value::Int(0))
        .func(
            "Atoi",
            HostSignature::new(vec![HostType::String], vec![HostType::Int, HostType::Error]),
            |_, args| {
                let s = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(match s.parse::<i64>() {
                    Ok(n) => vec![Value::Int(n), Value::Nil],
                    Err(_) => vec![Value::Int(0), error_value(format!("invalid syntax: {s:?}"))],
                })
            },
        )
        .func(
            "Apply",
            HostSignature::new(
                vec![
                    HostType::Func(Box::new(HostSignature::new(
                        vec![HostType::Int],
                        vec![HostType::Int],
                    ))),
                    HostType::Int,
                ],
                vec![HostType::Int],
            ),
            |ctx, mut args| {
                let x = args.pop().unwrap_or(Value::Int(0));
                let f = args.pop().unwrap_or(Value::Nil);
                ctx.call(&f, vec![x])
            },
        )
        .func(
            "MustPositive",
            HostSignature::new(vec![HostType::Int], vec![HostType::Int]),
            |_, args| match args.first().and_then(Value::as_i64) {
                Some(n) if n > 0 => Ok(vec![Value::Int(n)]),
                _ => Err(HostError::new("value must be positive")),
            },
        )
        .interface(
            "Stringer",
            vec![("String", HostSignature::new(Vec::new(), vec![HostType::String]))],
        )
        .func(
            "Show",
            HostSignature::new(
                vec![HostType::Named("Stringer".to_string())],
                vec![HostType::String],
            ),
            |ctx, args| {
                let recv = args.first().cloned().unwrap_or(Value::Nil);
                let name = ctx.type_name(&recv);
                let text = ctx.call_method(&recv, "String", Vec::new())?;
                let text = text.first().and_then(Value::as_str).unwrap_or_default();
                Ok(vec![Value::string(format!("{name}:{text}"))])
            },
        )
        .build()
}

fn host_interp() -> Interpreter {
    Interpreter::builder()
        .buffered()
        .host_package(strings_pkg())
        .host_package(conv_pkg())
        .build()
}

/// Compile `decls` importing `imports` and run `main`.
fn run_with(
    imports: &[&str],
    build: impl FnOnce(&AstBuilder) -> Vec<NodeId>,
) -> (Result<(), Error>, String) {
    let interp = host_interp();
    let b = interp.ast_builder();
    let decls = build(&b);
    let program = interp
        .compile(b.into_unit(imports, decls, Vec::new()))
        .unwrap_or_else(|e| panic!("compile failed: {e}"));
    let result = interp.run_main(&program);
    (result, interp.output())
}

#[test]
fn host_functions_are_called_through_their_package() {
    let (result, out) = run_with(&["strings"], |b| {
        let upper = b.call(b.selector(b.ident("strings"), "ToUpper"), vec![b.string("go")]);
        let join = b.call(
            b.selector(b.ident("strings"), "Join"),
            vec![b.string("-"), b.string("a"), b.string("b"), b.string("c")],
        );
        vec![main_fn(b, vec![println(b, vec![upper, join])])]
    });
    result.unwrap();
    assert_eq!(out, "GO a-b-c\n");
}

#[test]
fn host_constants_fold_and_variables_are_shared() {
    let (result, out) = run_with(&["example.com/conv"], |b| {
        let calls = || b.selector(b.ident("conv"), "Calls");
        let main = main_fn(
            b,
            vec![
                b.inc(calls()),
                b.inc(calls()),
                println(
                    b,
                    vec![
                        b.binary(BinaryOp::Mul, b.selector(b.ident("conv"), "Base"), b.int(3)),
                        calls(),
                    ],
                ),
            ],
        );
        vec![main]
    });
    result.unwrap();
    assert_eq!(out, "30 2\n");
}

#[test]
fn host_errors_come_back_as_error_values() {
    let (result, out) = run_with(&["example.com/conv"], |b| {
        let atoi = |s: &str| b.call(b.selector(b.ident("conv"), "Atoi"), vec![b.string(s)]);
        let main = main_fn(
            b,
            vec![
                b.define(&["n", "err"], vec![atoi("42")]),
                println(b, vec![b.ident("n"), b.binary(BinaryOp::Eq, b.ident("err"), b.nil())]),
                b.define(&["m", "err2"], vec![atoi("x")]),
                b.if_stmt(
                    None,
                    b.binary(BinaryOp::NotEq, b.ident("err2"), b.nil()),
                    b.block(vec![println(
                        b,
                        vec![b.ident("m"), b.method_call(b.ident("err2"), "Error", Vec::new())],
                    )]),
                    None,
                ),
            ],
        );
        vec![main]
    });
    result.unwrap();
    assert_eq!(out, "42 true\n0 invalid syntax: \"x\"\n");
}

#[test]
fn host_functions_can_call_back_into_interpreted_code() {
    let (result, out) = run_with(&["example.com/conv"], |b| {
        let triple = b.func_lit(
            b.sig(vec![b.field(&["v"], b.ident("int"))], vec![b.anon(b.ident("int"))]),
            b.block(vec![b.ret(vec![b.binary(BinaryOp::Mul, b.ident("v"), b.ident("k"))])]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["k"], vec![b.int(3)]),
                println(
                    b,
                    vec![b.call(b.selector(b.ident("conv"), "Apply"), vec![triple, b.int(5)])],
                ),
            ],
        );
        vec![main]
    });
    result.unwrap();
    assert_eq!(out, "15\n");
}

#[test]
fn host_interfaces_accept_interpreted_types() {
    let (result, out) = run_with(&["example.com/conv"], |b| {
        let celsius = b.type_decl("Celsius", b.ident("int"));
        let string = b.method(
            b.field(&["c"], b.ident("Celsius")),
            "String",
            b.sig(Vec::new(), vec![b.anon(b.ident("string"))]),
            b.block(vec![b.ret(vec![b.string("warm")])]),
        );
        let main = main_fn(
            b,
            vec![println(
                b,
                vec![b.call(
                    b.selector(b.ident("conv"), "Show"),
                    vec![b.call(b.ident("Celsius"), vec![b.int(30)])],
                )],
            )],
        );
        vec![celsius, string, main]
    });
    result.unwrap();
    assert_eq!(out, "Celsius:warm\n");
}

#[test]
fn host_function_failure_is_a_host_panic() {
    let (result, _) = run_with(&["example.com/conv"], |b| {
        let call = b.call(b.selector(b.ident("conv"), "MustPositive"), vec![b.int(-1)]);
        vec![main_fn(b, vec![println(b, vec![call])])]
    });
    let err = result.unwrap_err();
    assert_eq!(err.panic_kind(), Some(PanicKind::Host));
    assert!(err.to_string().contains("value must be positive"), "{err}");
}

#[test]
fn unknown_imports_and_members_are_reported() {
    let interp = host_interp();
    let b = interp.ast_builder();
    let err = interp
        .compile(b.into_unit(&["nosuch"], Vec::new(), Vec::new()))
        .unwrap_err();
    assert!(err.as_compile().is_some_and(|e| e.has_code(ErrorCode::E1003)));

    let b = interp.ast_builder();
    let main = main_fn(&b, vec![println(&b, vec![b.selector(b.ident("strings"), "Nope")])]);
    let err = interp
        .compile(b.into_unit(&["strings"], vec![main], Vec::new()))
        .unwrap_err();
    assert!(err.as_compile().is_some_and(|e| e.has_code(ErrorCode::E1005)));
}

#[test]
fn imports_in_incremental_units_persist() {
    let interp = host_interp();
    let b = interp.ast_builder();
    interp.eval(b.into_unit(&["strings"], Vec::new(), Vec::new())).unwrap();
    let b = interp.ast_builder();
    let upper = b.call(b.selector(b.ident("strings"), "ToUpper"), vec![b.string("later")]);
    let stmt = b.expr_stmt(upper);
    let v = interp.eval(b.into_unit(&[], Vec::new(), vec![stmt])).unwrap();
    assert_eq!(v, Some(Value::string("LATER")));
}
