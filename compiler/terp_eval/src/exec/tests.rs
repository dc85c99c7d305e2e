#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use smallvec::smallvec;
use terp_ir::{BinaryOp, SharedInterner, Span};
use terp_types::Idx;

use super::{ExecConfig, Executor};
use crate::errors::PanicKind;
use crate::print_handler::buffer_handler;
use crate::program::{
    Builtin, Callee, CfgId, CfgNode, Dispatch, DispatchTarget, FuncId, Loc, NumKind, Op, OpKind,
    Program, RangeKind, Src,
};
use crate::runtime::RuntimeConfig;
use crate::Value;

const INT: OpKind = OpKind::Num(NumKind::I64);

/// Appends straight-line code to one function.
struct Asm<'p> {
    prog: &'p mut Program,
    func: FuncId,
    last: CfgId,
}

impl<'p> Asm<'p> {
    fn func(prog: &'p mut Program, name: &str, frame_size: u32, nresults: u32) -> Self {
        let func = prog.reserve_func(name, Span::DUMMY);
        let proto = prog.func_mut(func);
        proto.frame_size = frame_size;
        proto.nresults = nresults;
        proto.result_zeros = vec![Value::Int(0); nresults as usize];
        Asm {
            prog,
            func,
            last: CfgId::NONE,
        }
    }

    fn op(&mut self, op: Op) -> CfgId {
        let id = self.prog.push(CfgNode::new(op, Span::DUMMY));
        if self.last.is_none() {
            self.prog.func_mut(self.func).start = id;
        } else {
            self.prog.node_mut(self.last).next = id;
        }
        self.last = id;
        id
    }

    fn done(mut self) -> FuncId {
        self.op(Op::Return);
        self.func
    }
}

fn local(i: u32) -> Src {
    Src::Loc(Loc::Local(i))
}

fn int(v: i64) -> Src {
    Src::Const(Value::Int(v))
}

fn add(dst: Loc, lhs: Src, rhs: Src) -> Op {
    Op::Binary {
        dst,
        op: BinaryOp::Add,
        kind: INT,
        lhs,
        rhs,
    }
}

fn call(func: FuncId, args: Vec<Src>, rets: Vec<Loc>) -> Op {
    Op::Call {
        callee: Callee::Static(func),
        args: args.into_iter().collect(),
        rets: rets.into_iter().collect(),
    }
}

fn run(prog: Program, entry: FuncId) -> Result<Vec<Value>, Box<crate::Panic>> {
    Executor::new(ExecConfig {
        print: buffer_handler(),
        runtime: RuntimeConfig::default(),
    })
    .execute(&Arc::new(prog), entry, Vec::new())
}

#[test]
fn functions_return_multiple_values() {
    let mut prog = Program::new(SharedInterner::new());
    // func pair(a int) (int, int) { return a, a + 1 }
    let mut f = Asm::func(&mut prog, "pair", 3, 2);
    f.op(Op::Move {
        dst: Loc::Local(0),
        src: local(2),
    });
    f.op(add(Loc::Local(1), local(2), int(1)));
    let pair = f.done();

    let mut m = Asm::func(&mut prog, "main", 2, 2);
    m.op(call(pair, vec![int(5)], vec![Loc::Local(0), Loc::Local(1)]));
    let main = m.done();

    assert_eq!(run(prog, main).unwrap(), vec![Value::Int(5), Value::Int(6)]);
}

#[test]
fn closures_capture_variables_by_reference() {
    let mut prog = Program::new(SharedInterner::new());
    // x++ on the enclosing frame
    let mut inc = Asm::func(&mut prog, "main.func1", 0, 0);
    let x = Loc::Up { level: 1, index: 1 };
    inc.op(add(x, Src::Loc(x), int(1)));
    let inc = inc.done();

    let mut m = Asm::func(&mut prog, "main", 3, 1);
    m.op(Op::Closure {
        dst: Loc::Local(2),
        func: inc,
    });
    for _ in 0..2 {
        m.op(Op::Call {
            callee: Callee::Value(local(2)),
            args: smallvec![],
            rets: smallvec![],
        });
    }
    m.op(Op::Move {
        dst: Loc::Local(0),
        src: local(1),
    });
    let main = m.done();

    assert_eq!(run(prog, main).unwrap(), vec![Value::Int(2)]);
}

#[test]
fn deferred_closure_recovers_and_sets_named_result() {
    let mut prog = Program::new(SharedInterner::new());
    let mut rec = Asm::func(&mut prog, "f.func1", 1, 0);
    rec.op(Op::Builtin {
        func: Builtin::Recover,
        args: smallvec![],
        dst: Some(Loc::Local(0)),
    });
    rec.op(Op::Move {
        dst: Loc::Up { level: 1, index: 0 },
        src: int(7),
    });
    let rec = rec.done();

    let mut f = Asm::func(&mut prog, "f", 2, 1);
    f.op(Op::Closure {
        dst: Loc::Local(1),
        func: rec,
    });
    f.op(Op::Defer {
        callee: Callee::Value(local(1)),
        args: smallvec![],
    });
    f.op(Op::Builtin {
        func: Builtin::Panic,
        args: smallvec![Src::Const(Value::from("boom"))],
        dst: None,
    });
    let f = f.done();

    assert_eq!(run(prog, f).unwrap(), vec![Value::Int(7)]);
}

#[test]
fn recover_outside_a_deferred_call_returns_nil() {
    let mut prog = Program::new(SharedInterner::new());
    let mut f = Asm::func(&mut prog, "f", 1, 1);
    f.op(Op::Builtin {
        func: Builtin::Recover,
        args: smallvec![],
        dst: Some(Loc::Local(0)),
    });
    let f = f.done();
    assert_eq!(run(prog, f).unwrap(), vec![Value::Nil]);
}

#[test]
fn unrecovered_panic_carries_trace_innermost_first() {
    let mut prog = Program::new(SharedInterner::new());
    let mut inner = Asm::func(&mut prog, "inner", 0, 0);
    inner.op(Op::Builtin {
        func: Builtin::Panic,
        args: smallvec![Src::Const(Value::from("boom"))],
        dst: None,
    });
    let inner = inner.done();
    let mut outer = Asm::func(&mut prog, "outer", 0, 0);
    outer.op(call(inner, vec![], vec![]));
    let outer = outer.done();

    let err = run(prog, outer).unwrap_err();
    assert_eq!(err.kind, PanicKind::Explicit);
    assert_eq!(err.message, "boom");
    assert_eq!(err.trace, vec!["inner".to_string(), "outer".to_string()]);
}

#[test]
fn runtime_faults_are_error_values() {
    let mut prog = Program::new(SharedInterner::new());
    let mut f = Asm::func(&mut prog, "f", 1, 1);
    f.op(Op::Binary {
        dst: Loc::Local(0),
        op: BinaryOp::Div,
        kind: INT,
        lhs: int(1),
        rhs: int(0),
    });
    let f = f.done();

    let err = run(prog, f).unwrap_err();
    assert_eq!(err.kind, PanicKind::DivideByZero);
    assert_eq!(err.message, "runtime error: integer divide by zero");
    assert_eq!(err.value.dynamic_type(), Some(Idx::RUNTIME_ERROR));
}

#[test]
fn goroutine_sends_to_main() {
    let mut prog = Program::new(SharedInterner::new());
    let mut worker = Asm::func(&mut prog, "worker", 1, 0);
    worker.op(Op::Send {
        chan: local(0),
        value: int(42),
    });
    let worker = worker.done();

    let mut m = Asm::func(&mut prog, "main", 2, 1);
    m.op(Op::Builtin {
        func: Builtin::MakeChan,
        args: smallvec![],
        dst: Some(Loc::Local(1)),
    });
    m.op(Op::Go {
        callee: Callee::Static(worker),
        args: smallvec![local(1)],
    });
    m.op(Op::Recv {
        chan: local(1),
        dst: Some(Loc::Local(0)),
        ok: None,
        zero: Value::Int(0),
    });
    let main = m.done();

    assert_eq!(run(prog, main).unwrap(), vec![Value::Int(42)]);
}

#[test]
fn receive_without_sender_deadlocks() {
    let mut prog = Program::new(SharedInterner::new());
    let mut m = Asm::func(&mut prog, "main", 1, 0);
    m.op(Op::Builtin {
        func: Builtin::MakeChan,
        args: smallvec![],
        dst: Some(Loc::Local(0)),
    });
    m.op(Op::Recv {
        chan: local(0),
        dst: None,
        ok: None,
        zero: Value::Nil,
    });
    let main = m.done();

    let err = run(prog, main).unwrap_err();
    assert_eq!(err.kind, PanicKind::Deadlock);
    assert_eq!(err.to_string(), "fatal error: all goroutines are asleep - deadlock!");
}

#[test]
fn runaway_recursion_is_a_stack_overflow() {
    let mut prog = Program::new(SharedInterner::new());
    let f = prog.reserve_func("loop", Span::DUMMY);
    let call = prog.push(CfgNode::new(
        Op::Call {
            callee: Callee::Static(f),
            args: smallvec![],
            rets: smallvec![],
        },
        Span::DUMMY,
    ));
    prog.func_mut(f).start = call;

    let exec = Executor::new(ExecConfig {
        print: buffer_handler(),
        runtime: RuntimeConfig {
            max_depth: 64,
            ..RuntimeConfig::default()
        },
    });
    let err = exec.execute(&Arc::new(prog), f, Vec::new()).unwrap_err();
    assert_eq!(err.kind, PanicKind::StackOverflow);
    assert!(err.trace.len() <= 256);
}

#[test]
fn interface_calls_dispatch_on_the_dynamic_type() {
    let interner = SharedInterner::new();
    let get = interner.intern("Get");
    let ty = Idx::from_raw(100);
    let mut prog = Program::new(interner);

    // func (c counter) Get() int { return int(c) + 1 }
    let mut method = Asm::func(&mut prog, "counter.Get", 2, 1);
    method.op(add(Loc::Local(0), local(1), int(1)));
    let method = method.done();
    prog.set_method(
        ty,
        get,
        Dispatch {
            steps: smallvec![],
            target: DispatchTarget::Func(method),
        },
    );

    let mut m = Asm::func(&mut prog, "main", 2, 1);
    m.op(Op::MakeIface {
        dst: Loc::Local(1),
        src: int(41),
        ty,
    });
    m.op(Op::Call {
        callee: Callee::Iface {
            recv: local(1),
            name: get,
        },
        args: smallvec![],
        rets: smallvec![Loc::Local(0)],
    });
    let main = m.done();

    assert_eq!(run(prog, main).unwrap(), vec![Value::Int(42)]);
}

#[test]
fn map_range_visits_keys_in_order() {
    let mut prog = Program::new(SharedInterner::new());
    let mut m = Asm::func(&mut prog, "main", 4, 0);
    m.op(Op::MakeMap {
        dst: Loc::Local(0),
        entries: vec![
            (Src::Const("b".into()), int(2)),
            (Src::Const("a".into()), int(1)),
        ],
    });
    m.op(Op::RangeStart {
        dst: Loc::Local(1),
        src: local(0),
        kind: RangeKind::Map,
    });
    let next = m.op(Op::RangeNext {
        iter: local(1),
        key: Some(Loc::Local(2)),
        value: Some(Loc::Local(3)),
    });
    let print = m.op(Op::Builtin {
        func: Builtin::Println,
        args: smallvec![local(2), local(3)],
        dst: None,
    });
    let ret = m.prog.push(CfgNode::new(Op::Return, Span::DUMMY));
    m.prog.node_mut(print).next = next;
    m.prog.node_mut(next).alt = ret;
    let main = m.func;

    let print = buffer_handler();
    let exec = Executor::new(ExecConfig {
        print: Arc::clone(&print),
        runtime: RuntimeConfig::default(),
    });
    exec.execute(&Arc::new(prog), main, Vec::new()).unwrap();
    assert_eq!(print.output(), "a 1\nb 2\n");
}

#[test]
fn package_initializers_run_once_across_executions() {
    let mut prog = Program::new(SharedInterner::new());
    let g = prog.add_global(Value::Int(0));
    let mut init = Asm::func(&mut prog, "init", 0, 0);
    init.op(add(Loc::Global(g), Src::Loc(Loc::Global(g)), int(1)));
    let init = init.done();
    prog.push_init(init);
    let main = Asm::func(&mut prog, "main", 0, 0).done();

    let prog = Arc::new(prog);
    let exec = Executor::new(ExecConfig {
        print: buffer_handler(),
        runtime: RuntimeConfig::default(),
    });
    exec.execute(&prog, main, Vec::new()).unwrap();
    exec.execute(&prog, main, Vec::new()).unwrap();
    assert_eq!(exec.global(g), Value::Int(1));
}
