//! Incremental evaluation: state carried from one unit to the next.

use pretty_assertions::assert_eq;
use terp::{AstBuilder, BinaryOp, Error, ErrorCode, Interpreter, NodeId, SymbolKind, Value};

use crate::common::{interp, println};

/// Evaluate one unit of top-level statements.
fn eval(
    interp: &Interpreter,
    build: impl FnOnce(&AstBuilder) -> Vec<NodeId>,
) -> Result<Option<Value>, Error> {
    let b = interp.ast_builder();
    let stmts = build(&b);
    interp.eval(b.into_unit(&[], Vec::new(), stmts))
}

/// Evaluate one unit of declarations only.
fn declare(
    interp: &Interpreter,
    build: impl FnOnce(&AstBuilder) -> Vec<NodeId>,
) -> Result<Option<Value>, Error> {
    let b = interp.ast_builder();
    let decls = build(&b);
    interp.eval(b.into_unit(&[], decls, Vec::new()))
}

/// `func f() int { return n }`
fn f_returning(b: &AstBuilder, n: i128) -> NodeId {
    b.func(
        "f",
        Vec::new(),
        vec![b.anon(b.ident("int"))],
        b.block(vec![b.ret(vec![b.int(n)])]),
    )
}

#[test]
fn short_declarations_persist_between_units() {
    let interp = interp();
    let none = eval(&interp, |b| vec![b.define(&["x"], vec![b.int(10)])]).unwrap();
    assert_eq!(none, None);
    let doubled = eval(&interp, |b| {
        vec![b.expr_stmt(b.binary(BinaryOp::Mul, b.ident("x"), b.int(2)))]
    })
    .unwrap();
    assert_eq!(doubled, Some(Value::Int(20)));
    assert_eq!(interp.global("x"), Some(Value::Int(10)));
    assert_eq!(interp.symbol("x").map(|s| s.kind), Some(SymbolKind::Var));
}

#[test]
fn untyped_trailing_expression_takes_its_default_type() {
    let interp = interp();
    let v = eval(&interp, |b| vec![b.expr_stmt(b.binary(BinaryOp::Add, b.int(1), b.int(2)))]).unwrap();
    assert_eq!(v, Some(Value::Int(3)));
}

#[test]
fn trailing_call_without_results_yields_nothing() {
    let interp = interp();
    let v = eval(&interp, |b| vec![println(b, vec![b.string("hi")])]).unwrap();
    assert_eq!(v, None);
    assert_eq!(interp.take_output(), "hi\n");
    assert_eq!(interp.output(), "");
}

#[test]
fn package_variables_keep_their_values() {
    let interp = interp();
    eval(&interp, |b| vec![b.var_stmt(&["counter"], Some(b.ident("int")), Vec::new())]).unwrap();
    for _ in 0..3 {
        eval(&interp, |b| vec![b.inc(b.ident("counter"))]).unwrap();
    }
    let v = eval(&interp, |b| vec![b.expr_stmt(b.ident("counter"))]).unwrap();
    assert_eq!(v, Some(Value::Int(3)));
}

#[test]
fn declared_functions_are_callable_later() {
    let interp = interp();
    declare(&interp, |b| {
        vec![b.func(
            "square",
            vec![b.field(&["n"], b.ident("int"))],
            vec![b.anon(b.ident("int"))],
            b.block(vec![b.ret(vec![b.binary(BinaryOp::Mul, b.ident("n"), b.ident("n"))])]),
        )]
    })
    .unwrap();
    let v = eval(&interp, |b| vec![b.expr_stmt(b.call_named("square", vec![b.int(12)]))]).unwrap();
    assert_eq!(v, Some(Value::Int(144)));
}

#[test]
fn redefining_a_function_rebinds_the_name() {
    let interp = interp();
    declare(&interp, |b| vec![f_returning(b, 1)]).unwrap();
    let call_f = |b: &AstBuilder| vec![b.expr_stmt(b.call_named("f", Vec::new()))];
    assert_eq!(eval(&interp, call_f).unwrap(), Some(Value::Int(1)));
    declare(&interp, |b| vec![f_returning(b, 2)]).unwrap();
    assert_eq!(eval(&interp, call_f).unwrap(), Some(Value::Int(2)));
}

#[test]
fn failed_unit_leaves_earlier_state_intact() {
    let interp = interp();
    eval(&interp, |b| vec![b.define(&["y"], vec![b.int(5)])]).unwrap();
    let err = eval(&interp, |b| {
        vec![
            b.define(&["z"], vec![b.int(1)]),
            b.define(
                &["w"],
                vec![b.binary(BinaryOp::Add, b.ident("y"), b.string("s"))],
            ),
        ]
    })
    .unwrap_err();
    assert!(err.as_compile().is_some_and(|e| e.has_code(ErrorCode::E2001)));
    assert!(interp.symbol("z").is_none());
    assert!(interp.symbol("w").is_none());
    let v = eval(&interp, |b| vec![b.expr_stmt(b.ident("y"))]).unwrap();
    assert_eq!(v, Some(Value::Int(5)));
}

#[test]
fn runtime_panic_in_a_unit_keeps_the_session_usable() {
    let interp = interp();
    eval(&interp, |b| vec![b.define(&["n"], vec![b.int(0)])]).unwrap();
    let err = eval(&interp, |b| {
        vec![b.expr_stmt(b.binary(BinaryOp::Div, b.int(1), b.ident("n")))]
    })
    .unwrap_err();
    assert!(err.panic_kind().is_some());
    let v = eval(&interp, |b| vec![b.expr_stmt(b.binary(BinaryOp::Add, b.ident("n"), b.int(1)))]).unwrap();
    assert_eq!(v, Some(Value::Int(1)));
}

#[test]
fn undefined_name_in_a_unit_is_reported() {
    let interp = interp();
    let err = eval(&interp, |b| vec![b.expr_stmt(b.ident("missing"))]).unwrap_err();
    assert!(err.as_compile().is_some_and(|e| e.has_code(ErrorCode::E1001)));
}
