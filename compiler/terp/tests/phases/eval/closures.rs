//! Closures, loop-variable capture, multi-value returns and defers.

use pretty_assertions::assert_eq;
use terp::{AstBuilder, BinaryOp, NodeId};

use crate::common::{main_fn, println, run};

/// `var fs []func()`
fn funcs_var(b: &AstBuilder) -> NodeId {
    let ty = b.slice_type(b.func_type(Vec::new(), Vec::new(), false));
    b.var_stmt(&["fs"], Some(ty), Vec::new())
}

/// `fs = append(fs, func() { println(i) })`
fn capture_i(b: &AstBuilder) -> NodeId {
    let lit = b.func_lit(
        b.sig(Vec::new(), Vec::new()),
        b.block(vec![println(b, vec![b.ident("i")])]),
    );
    b.assign(
        vec![b.ident("fs")],
        vec![b.call_named("append", vec![b.ident("fs"), lit])],
    )
}

/// `for j := range fs { fs[j]() }`
fn call_all(b: &AstBuilder) -> NodeId {
    let call = b.expr_stmt(b.call(b.index(b.ident("fs"), b.ident("j")), Vec::new()));
    b.range_define("j", None, b.ident("fs"), b.block(vec![call]))
}

#[test]
fn loop_variables_are_fresh_per_iteration() {
    let out = run(|b| {
        let init = b.define(&["i"], vec![b.int(0)]);
        let cond = b.binary(BinaryOp::Lt, b.ident("i"), b.int(3));
        let post = b.inc(b.ident("i"));
        let lp = b.for_stmt(Some(init), Some(cond), Some(post), b.block(vec![capture_i(b)]));
        vec![main_fn(b, vec![funcs_var(b), lp, call_all(b)])]
    });
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn variables_declared_outside_the_loop_are_shared() {
    let out = run(|b| {
        let decl = b.var_stmt(&["i"], Some(b.ident("int")), Vec::new());
        let init = b.assign(vec![b.ident("i")], vec![b.int(0)]);
        let cond = b.binary(BinaryOp::Lt, b.ident("i"), b.int(3));
        let post = b.inc(b.ident("i"));
        let lp = b.for_stmt(Some(init), Some(cond), Some(post), b.block(vec![capture_i(b)]));
        vec![main_fn(b, vec![funcs_var(b), decl, lp, call_all(b)])]
    });
    assert_eq!(out, "3\n3\n3\n");
}

#[test]
fn range_variables_are_fresh_per_iteration() {
    let out = run(|b| {
        let nums = b.composite(
            Some(b.slice_type(b.ident("int"))),
            vec![b.int(10), b.int(20), b.int(30)],
        );
        let lit = b.func_lit(
            b.sig(Vec::new(), Vec::new()),
            b.block(vec![println(b, vec![b.ident("k"), b.ident("v")])]),
        );
        let body = b.block(vec![b.assign(
            vec![b.ident("fs")],
            vec![b.call_named("append", vec![b.ident("fs"), lit])],
        )]);
        let lp = b.range_define("k", Some("v"), nums, body);
        vec![main_fn(b, vec![funcs_var(b), lp, call_all(b)])]
    });
    assert_eq!(out, "0 10\n1 20\n2 30\n");
}

#[test]
fn closures_share_captured_variables_by_reference() {
    let out = run(|b| {
        let int = || b.ident("int");
        let inc = b.func_lit(
            b.sig(Vec::new(), vec![b.anon(int())]),
            b.block(vec![b.inc(b.ident("n")), b.ret(vec![b.ident("n")])]),
        );
        let counter = b.func(
            "counter",
            Vec::new(),
            vec![b.anon(b.func_type(Vec::new(), vec![b.anon(int())], false))],
            b.block(vec![b.define(&["n"], vec![b.int(0)]), b.ret(vec![inc])]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["c"], vec![b.call_named("counter", Vec::new())]),
                b.define(&["d"], vec![b.call_named("counter", Vec::new())]),
                b.expr_stmt(b.call(b.ident("c"), Vec::new())),
                b.expr_stmt(b.call(b.ident("c"), Vec::new())),
                println(
                    b,
                    vec![b.call(b.ident("c"), Vec::new()), b.call(b.ident("d"), Vec::new())],
                ),
            ],
        );
        vec![counter, main]
    });
    assert_eq!(out, "3 1\n");
}

#[test]
fn multiple_results_destructure_in_order() {
    let out = run(|b| {
        let int = || b.ident("int");
        let divmod = b.func(
            "divmod",
            vec![b.field(&["a", "b"], int())],
            vec![b.anon(int()), b.anon(int())],
            b.block(vec![b.ret(vec![
                b.binary(BinaryOp::Div, b.ident("a"), b.ident("b")),
                b.binary(BinaryOp::Rem, b.ident("a"), b.ident("b")),
            ])]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["q", "r"], vec![b.call_named("divmod", vec![b.int(17), b.int(5)])]),
                println(b, vec![b.ident("q"), b.ident("r")]),
                b.define(&["_", "r2"], vec![b.call_named("divmod", vec![b.int(9), b.int(4)])]),
                b.define(&["q3", "_"], vec![b.call_named("divmod", vec![b.int(9), b.int(4)])]),
                println(b, vec![b.ident("r2"), b.ident("q3")]),
                b.assign(
                    vec![b.ident("q"), b.ident("r")],
                    vec![b.ident("r"), b.ident("q")],
                ),
                println(b, vec![b.ident("q"), b.ident("r")]),
            ],
        );
        vec![divmod, main]
    });
    assert_eq!(out, "3 2\n1 2\n2 3\n");
}

#[test]
fn named_results_and_bare_return() {
    let out = run(|b| {
        let split = b.func(
            "split",
            vec![b.field(&["sum"], b.ident("int"))],
            vec![b.field(&["x", "y"], b.ident("int"))],
            b.block(vec![
                b.assign(
                    vec![b.ident("x")],
                    vec![b.binary(
                        BinaryOp::Div,
                        b.binary(BinaryOp::Mul, b.ident("sum"), b.int(4)),
                        b.int(9),
                    )],
                ),
                b.assign(
                    vec![b.ident("y")],
                    vec![b.binary(BinaryOp::Sub, b.ident("sum"), b.ident("x"))],
                ),
                b.ret(Vec::new()),
            ]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["x", "y"], vec![b.call_named("split", vec![b.int(17)])]),
                println(b, vec![b.ident("x"), b.ident("y")]),
            ],
        );
        vec![split, main]
    });
    assert_eq!(out, "7 10\n");
}

#[test]
fn defers_run_last_in_first_out_with_arguments_evaluated_early() {
    let out = run(|b| {
        let main = main_fn(
            b,
            vec![
                b.define(&["x"], vec![b.int(1)]),
                b.defer(b.call_named("println", vec![b.string("first"), b.ident("x")])),
                b.assign(vec![b.ident("x")], vec![b.int(2)]),
                b.defer(b.call_named("println", vec![b.string("second"), b.ident("x")])),
                println(b, vec![b.string("body")]),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "body\nsecond 2\nfirst 1\n");
}

#[test]
fn deferred_closures_can_change_named_results() {
    let out = run(|b| {
        let bump = b.func_lit(
            b.sig(Vec::new(), Vec::new()),
            b.block(vec![b.op_assign(BinaryOp::Mul, b.ident("n"), b.int(10))]),
        );
        let f = b.func(
            "f",
            Vec::new(),
            vec![b.field(&["n"], b.ident("int"))],
            b.block(vec![
                b.defer(b.call(bump, Vec::new())),
                b.ret(vec![b.int(4)]),
            ]),
        );
        vec![f, main_fn(b, vec![println(b, vec![b.call_named("f", Vec::new())])])]
    });
    assert_eq!(out, "40\n");
}

#[test]
fn recursion_and_variadic_calls() {
    let out = run(|b| {
        let int = || b.ident("int");
        let fib = b.func(
            "fib",
            vec![b.field(&["n"], int())],
            vec![b.anon(int())],
            b.block(vec![
                b.if_stmt(
                    None,
                    b.binary(BinaryOp::Lt, b.ident("n"), b.int(2)),
                    b.block(vec![b.ret(vec![b.ident("n")])]),
                    None,
                ),
                b.ret(vec![b.binary(
                    BinaryOp::Add,
                    b.call_named("fib", vec![b.binary(BinaryOp::Sub, b.ident("n"), b.int(1))]),
                    b.call_named("fib", vec![b.binary(BinaryOp::Sub, b.ident("n"), b.int(2))]),
                )]),
            ]),
        );
        let sum_sig = b.func_type(
            vec![b.field(&["xs"], int())],
            vec![b.anon(int())],
            true,
        );
        let sum_body = b.block(vec![
            b.define(&["t"], vec![b.int(0)]),
            b.range(
                Some(b.ident("_")),
                Some(b.ident("x")),
                true,
                b.ident("xs"),
                b.block(vec![b.op_assign(BinaryOp::Add, b.ident("t"), b.ident("x"))]),
            ),
            b.ret(vec![b.ident("t")]),
        ]);
        let sum = b.func_decl("sum", None, Vec::new(), sum_sig, sum_body);
        let nums = b.composite(Some(b.slice_type(int())), vec![b.int(4), b.int(5)]);
        let main = main_fn(
            b,
            vec![
                println(b, vec![b.call_named("fib", vec![b.int(15)])]),
                println(
                    b,
                    vec![
                        b.call_named("sum", Vec::new()),
                        b.call_named("sum", vec![b.int(1), b.int(2), b.int(3)]),
                        b.call_spread(b.ident("sum"), vec![nums]),
                    ],
                ),
            ],
        );
        vec![fib, sum, main]
    });
    assert_eq!(out, "610\n0 6 9\n");
}

#[test]
fn labeled_continue_skips_to_the_outer_loop() {
    let out = run(|b| {
        let i_loop = |body: Vec<NodeId>, var: &str, limit: i128| {
            b.for_stmt(
                Some(b.define(&[var], vec![b.int(0)])),
                Some(b.binary(BinaryOp::Lt, b.ident(var), b.int(limit))),
                Some(b.inc(b.ident(var))),
                b.block(body),
            )
        };
        let inner = i_loop(
            vec![
                b.if_stmt(
                    None,
                    b.binary(BinaryOp::Eq, b.ident("j"), b.int(2)),
                    b.block(vec![b.cont(Some("outer"))]),
                    None,
                ),
                b.expr_stmt(b.call_named("print", vec![b.ident("i"), b.ident("j"), b.string(" ")])),
            ],
            "j",
            5,
        );
        let outer = i_loop(vec![inner], "i", 2);
        vec![main_fn(b, vec![b.labeled("outer", outer), println(b, Vec::new())])]
    });
    assert_eq!(out, "00 01 10 11 \n");
}
