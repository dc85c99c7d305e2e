//! Panics, runtime faults and recovery.

use pretty_assertions::assert_eq;
use terp::{AstBuilder, BinaryOp, Error, NodeId, PanicKind, UnaryOp};

use crate::common::{main_fn, println, run, run_err};

/// `defer func() { if r := recover(); r != nil { body } }()`
fn recover_with(b: &AstBuilder, body: Vec<NodeId>) -> NodeId {
    let check = b.if_stmt(
        Some(b.define(&["r"], vec![b.call_named("recover", Vec::new())])),
        b.binary(BinaryOp::NotEq, b.ident("r"), b.nil()),
        b.block(body),
        None,
    );
    let lit = b.func_lit(b.sig(Vec::new(), Vec::new()), b.block(vec![check]));
    b.defer(b.call(lit, Vec::new()))
}

#[test]
fn recovered_panic_becomes_a_normal_return() {
    let out = run(|b| {
        let safe = b.func(
            "safe",
            Vec::new(),
            vec![b.field(&["result"], b.ident("int"))],
            b.block(vec![
                recover_with(
                    b,
                    vec![
                        println(b, vec![b.string("recovered:"), b.ident("r")]),
                        b.assign(vec![b.ident("result")], vec![b.int(-1)]),
                    ],
                ),
                b.expr_stmt(b.call_named("panic", vec![b.string("boom")])),
                b.ret(vec![b.int(1)]),
            ]),
        );
        let main = main_fn(
            b,
            vec![
                println(b, vec![b.call_named("safe", Vec::new())]),
                println(b, vec![b.string("after")]),
            ],
        );
        vec![safe, main]
    });
    assert_eq!(out, "recovered: boom\n-1\nafter\n");
}

#[test]
fn unrecovered_panic_reports_value_and_trace() {
    let (err, out) = run_err(|b| {
        let call_next = |name: &str, next: &str| {
            b.func(
                name,
                Vec::new(),
                Vec::new(),
                b.block(vec![b.expr_stmt(b.call_named(next, Vec::new()))]),
            )
        };
        let deep = b.func(
            "c",
            Vec::new(),
            Vec::new(),
            b.block(vec![
                b.defer(b.call_named("println", vec![b.string("deferred in c")])),
                b.expr_stmt(b.call_named("panic", vec![b.string("deep")])),
            ]),
        );
        vec![
            call_next("a", "b"),
            call_next("b", "c"),
            deep,
            main_fn(b, vec![b.expr_stmt(b.call_named("a", Vec::new()))]),
        ]
    });
    // Deferred calls still run while the panic unwinds.
    assert_eq!(out, "deferred in c\n");
    let Error::Panic {
        value,
        kind,
        message,
        trace,
    } = err
    else {
        panic!("expected a panic");
    };
    assert_eq!(kind, PanicKind::Explicit);
    assert_eq!(value.concrete().as_str(), Some("deep"));
    assert_eq!(message, "deep");
    assert_eq!(trace, vec!["c", "b", "a", "main"]);
}

#[test]
fn runtime_faults_are_recoverable_errors() {
    let out = run(|b| {
        let int = || b.ident("int");
        let div = b.func(
            "div",
            vec![b.field(&["a", "b"], int())],
            vec![
                b.field(&["q"], int()),
                b.field(&["err"], b.ident("error")),
            ],
            b.block(vec![
                recover_with(
                    b,
                    vec![b.assign(
                        vec![b.ident("err")],
                        vec![b.type_assert(b.ident("r"), b.ident("error"))],
                    )],
                ),
                b.assign(
                    vec![b.ident("q")],
                    vec![b.binary(BinaryOp::Div, b.ident("a"), b.ident("b"))],
                ),
                b.ret(Vec::new()),
            ]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["q", "err"], vec![b.call_named("div", vec![b.int(7), b.int(0)])]),
                println(
                    b,
                    vec![b.ident("q"), b.method_call(b.ident("err"), "Error", Vec::new())],
                ),
                b.define(&["q2", "err2"], vec![b.call_named("div", vec![b.int(7), b.int(2)])]),
                println(
                    b,
                    vec![b.ident("q2"), b.binary(BinaryOp::Eq, b.ident("err2"), b.nil())],
                ),
            ],
        );
        vec![div, main]
    });
    assert_eq!(out, "0 runtime error: integer divide by zero\n3 true\n");
}

#[test]
fn index_out_of_range_is_a_runtime_fault() {
    let (err, _) = run_err(|b| {
        let nums = b.composite(Some(b.slice_type(b.ident("int"))), vec![b.int(1), b.int(2)]);
        let main = main_fn(
            b,
            vec![
                b.define(&["xs"], vec![nums]),
                b.define(&["i"], vec![b.int(5)]),
                println(b, vec![b.index(b.ident("xs"), b.ident("i"))]),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::IndexOutOfRange));
    assert_eq!(
        err.to_string(),
        "panic: runtime error: index out of range [5] with length 2"
    );
}

#[test]
fn nil_dereference_and_nil_map_writes_fault() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.var_stmt(&["p"], Some(b.pointer_type(b.ident("int"))), Vec::new()),
                println(b, vec![b.unary(UnaryOp::Deref, b.ident("p"))]),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::NilDereference));

    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.var_stmt(
                    &["m"],
                    Some(b.map_type(b.ident("string"), b.ident("int"))),
                    Vec::new(),
                ),
                b.assign(vec![b.index(b.ident("m"), b.string("k"))], vec![b.int(1)]),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::NilMap));
}

#[test]
fn failed_type_assertion_faults() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.var_stmt(&["x"], Some(b.ident("any")), vec![b.string("text")]),
                println(b, vec![b.type_assert(b.ident("x"), b.ident("int"))]),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::TypeAssertion));
}

#[test]
fn repanic_from_a_deferred_call_replaces_the_value() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                recover_with(
                    b,
                    vec![b.expr_stmt(b.call_named("panic", vec![b.string("second")]))],
                ),
                b.expr_stmt(b.call_named("panic", vec![b.string("first")])),
            ],
        );
        vec![main]
    });
    let Error::Panic { message, .. } = err else {
        panic!("expected a panic");
    };
    assert_eq!(message, "second");
}

#[test]
fn recover_outside_a_panic_returns_nil() {
    let out = run(|b| {
        let main = main_fn(
            b,
            vec![println(
                b,
                vec![b.binary(BinaryOp::Eq, b.call_named("recover", Vec::new()), b.nil())],
            )],
        );
        vec![main]
    });
    assert_eq!(out, "true\n");
}

#[test]
fn runaway_recursion_is_a_stack_overflow_panic() {
    let interp = terp::Interpreter::builder().buffered().max_depth(200).build();
    let program = crate::common::compile_on(&interp, |b| {
        let forever = b.func(
            "forever",
            vec![b.field(&["n"], b.ident("int"))],
            vec![b.anon(b.ident("int"))],
            b.block(vec![b.ret(vec![b.call_named(
                "forever",
                vec![b.binary(BinaryOp::Add, b.ident("n"), b.int(1))],
            )])]),
        );
        vec![
            forever,
            main_fn(b, vec![println(b, vec![b.call_named("forever", vec![b.int(0)])])]),
        ]
    })
    .unwrap();
    let err = interp.run_main(&program).unwrap_err();
    assert_eq!(err.panic_kind(), Some(PanicKind::StackOverflow));
    // The session stays usable after the overflow.
    assert!(interp.run_main(&program).is_err());
}
