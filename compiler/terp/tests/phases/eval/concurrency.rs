//! Goroutines, channels, select and deadlock detection.

use pretty_assertions::assert_eq;
use terp::{AstBuilder, BinaryOp, ChanDir, Error, NodeId, PanicKind};

use crate::common::{call_stmt, main_fn, println, run, run_err};

/// `make(chan int, cap)`, or unbuffered when `cap` is `None`.
fn make_chan(b: &AstBuilder, cap: Option<i128>) -> NodeId {
    let mut args = vec![b.chan_type(ChanDir::Both, b.ident("int"))];
    args.extend(cap.map(|c| b.int(c)));
    b.call_named("make", args)
}

/// `go func() { body }()`
fn go(b: &AstBuilder, body: Vec<NodeId>) -> NodeId {
    let lit = b.func_lit(b.sig(Vec::new(), Vec::new()), b.block(body));
    b.go_stmt(b.call(lit, Vec::new()))
}

#[test]
fn unbuffered_channel_hands_values_to_a_ranging_goroutine() {
    let out = run(|b| {
        let consumer = go(
            b,
            vec![
                b.range_define(
                    "v",
                    None,
                    b.ident("ch"),
                    b.block(vec![println(b, vec![b.ident("v")])]),
                ),
                b.send(b.ident("done"), b.boolean(true)),
            ],
        );
        let produce = b.for_stmt(
            Some(b.define(&["i"], vec![b.int(0)])),
            Some(b.binary(BinaryOp::Lt, b.ident("i"), b.int(3))),
            Some(b.inc(b.ident("i"))),
            b.block(vec![b.send(b.ident("ch"), b.ident("i"))]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, None)]),
                b.define(
                    &["done"],
                    vec![b.call_named("make", vec![b.chan_type(ChanDir::Both, b.ident("bool"))])],
                ),
                consumer,
                produce,
                call_stmt(b, "close", vec![b.ident("ch")]),
                b.expr_stmt(b.recv(b.ident("done"))),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn buffered_channel_drains_after_close() {
    let out = run(|b| {
        let recv_ok = |v: &str, ok: &str| b.define(&[v, ok], vec![b.recv(b.ident("ch"))]);
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, Some(2))]),
                b.send(b.ident("ch"), b.int(1)),
                b.send(b.ident("ch"), b.int(2)),
                println(b, vec![b.call_named("len", vec![b.ident("ch")])]),
                call_stmt(b, "close", vec![b.ident("ch")]),
                recv_ok("a", "aok"),
                recv_ok("c", "cok"),
                recv_ok("d", "dok"),
                println(b, vec![b.ident("a"), b.ident("aok")]),
                println(b, vec![b.ident("c"), b.ident("cok")]),
                println(b, vec![b.ident("d"), b.ident("dok")]),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "2\n1 true\n2 true\n0 false\n");
}

#[test]
fn sending_past_capacity_with_no_receiver_deadlocks() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, Some(2))]),
                b.send(b.ident("ch"), b.int(1)),
                b.send(b.ident("ch"), b.int(2)),
                b.send(b.ident("ch"), b.int(3)),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::Deadlock));
}

#[test]
fn receiving_with_no_sender_is_a_fatal_deadlock() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, None)]),
                b.expr_stmt(b.recv(b.ident("ch"))),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::Deadlock));
    assert_eq!(
        err.to_string(),
        "fatal error: all goroutines are asleep - deadlock!"
    );
}

#[test]
fn select_completes_exactly_one_ready_case() {
    let out = run(|b| {
        let send_case = b.comm(Some(b.send(b.ident("a"), b.int(1))), Vec::new());
        let recv_case = b.comm(
            Some(b.define(&["v"], vec![b.recv(b.ident("b"))])),
            vec![b.assign(vec![b.ident("got")], vec![b.ident("v")])],
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["a"], vec![make_chan(b, Some(1))]),
                b.define(&["b"], vec![make_chan(b, Some(1))]),
                b.send(b.ident("b"), b.int(7)),
                b.define(&["got"], vec![b.int(0)]),
                b.select(vec![send_case, recv_case]),
                // One send into `a` or one receive out of `b`, never both.
                println(
                    b,
                    vec![b.binary(
                        BinaryOp::Sub,
                        b.binary(
                            BinaryOp::Add,
                            b.call_named("len", vec![b.ident("a")]),
                            b.int(1),
                        ),
                        b.call_named("len", vec![b.ident("b")]),
                    )],
                ),
                println(
                    b,
                    vec![b.binary(
                        BinaryOp::LogicalOr,
                        b.binary(BinaryOp::Eq, b.ident("got"), b.int(7)),
                        b.binary(
                            BinaryOp::Eq,
                            b.call_named("len", vec![b.ident("a")]),
                            b.int(1),
                        ),
                    )],
                ),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "1\ntrue\n");
}

#[test]
fn select_default_runs_when_nothing_is_ready() {
    let out = run(|b| {
        let recv_case = b.comm(
            Some(b.expr_stmt(b.recv(b.ident("ch")))),
            vec![println(b, vec![b.string("received")])],
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, None)]),
                b.select(vec![recv_case, b.comm(None, vec![println(b, vec![b.string("idle")])])]),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "idle\n");
}

#[test]
fn goroutines_fan_in_through_one_channel() {
    let out = run(|b| {
        let square = b.binary(BinaryOp::Mul, b.ident("i"), b.ident("i"));
        let spawn = b.for_stmt(
            Some(b.define(&["i"], vec![b.int(1)])),
            Some(b.binary(BinaryOp::LtEq, b.ident("i"), b.int(3))),
            Some(b.inc(b.ident("i"))),
            b.block(vec![go(b, vec![b.send(b.ident("results"), square)])]),
        );
        let collect = b.for_stmt(
            Some(b.define(&["k"], vec![b.int(0)])),
            Some(b.binary(BinaryOp::Lt, b.ident("k"), b.int(3))),
            Some(b.inc(b.ident("k"))),
            b.block(vec![b.op_assign(
                BinaryOp::Add,
                b.ident("total"),
                b.recv(b.ident("results")),
            )]),
        );
        let main = main_fn(
            b,
            vec![
                b.define(&["results"], vec![make_chan(b, None)]),
                spawn,
                b.define(&["total"], vec![b.int(0)]),
                collect,
                println(b, vec![b.ident("total")]),
            ],
        );
        vec![main]
    });
    assert_eq!(out, "14\n");
}

#[test]
fn unrecovered_goroutine_panic_ends_the_run() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, None)]),
                go(b, vec![b.expr_stmt(b.call_named("panic", vec![b.string("worker failed")]))]),
                b.expr_stmt(b.recv(b.ident("ch"))),
            ],
        );
        vec![main]
    });
    let Error::Panic { kind, message, .. } = err else {
        panic!("expected a panic");
    };
    assert_eq!(kind, PanicKind::Explicit);
    assert_eq!(message, "worker failed");
}

#[test]
fn send_on_a_closed_channel_panics() {
    let (err, _) = run_err(|b| {
        let main = main_fn(
            b,
            vec![
                b.define(&["ch"], vec![make_chan(b, Some(1))]),
                call_stmt(b, "close", vec![b.ident("ch")]),
                b.send(b.ident("ch"), b.int(1)),
            ],
        );
        vec![main]
    });
    assert_eq!(err.panic_kind(), Some(PanicKind::ClosedChannel));
}
