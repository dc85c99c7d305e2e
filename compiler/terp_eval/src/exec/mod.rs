//! The frame executor.
//!
//! A [`Task`] is one thread of interpreted execution: the main task runs on
//! the caller's thread, every `go` statement starts another on its own host
//! thread. A task walks CFG nodes of the shared [`Program`], reading and
//! writing frame slots. Calls recurse on the host stack (guarded by
//! `ensure_sufficient_stack`), so panics unwind as `Err(Unwind)` through
//! ordinary Rust returns and deferred calls run on the way out.

mod builtins;
mod call;
mod ops;
mod place;
mod range;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{internal, ExecResult, Panic, PanicKind, Unwind};
use crate::print_handler::{stdout_handler, SharedPrintHandler};
use crate::program::{
    AssertTarget, CfgId, FuncId, Loc, Op, Program, SelectCase, Src,
};
use crate::runtime::{Channel, Runtime, RuntimeConfig, SelectArm, SelectResult, Waiter};
use crate::value::{FuncValue, Pointer};
use crate::{Frame, Value};

pub(crate) use call::Callable;
use call::{ActivePanic, Deferred};

/// Settings shared by every run of an [`Executor`].
#[derive(Clone)]
pub struct ExecConfig {
    pub print: SharedPrintHandler,
    pub runtime: RuntimeConfig,
}

impl Default for ExecConfig {
    fn default() -> Self {
        ExecConfig {
            print: stdout_handler(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Runs functions of successive program versions against one set of
/// package variables.
///
/// The global frame grows as later compilations add variables; init
/// functions run once each, the first time an `execute` sees them.
pub struct Executor {
    config: ExecConfig,
    globals: Arc<Frame>,
    inits_run: Mutex<usize>,
}

impl Executor {
    pub fn new(config: ExecConfig) -> Self {
        Executor {
            config,
            globals: Frame::new(0, None),
            inits_run: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn print_handler(&self) -> &SharedPrintHandler {
        &self.config.print
    }

    /// Current value of package variable slot `index`.
    pub fn global(&self, index: u32) -> Value {
        self.globals.get(index)
    }

    /// Run `func` to completion on the calling thread.
    ///
    /// Goroutines started along the way are stopped and joined before this
    /// returns. An unrecovered panic in any task, or a deadlock, is returned
    /// as the error.
    #[tracing::instrument(level = "debug", skip_all, fields(func = %prog.func(func).name))]
    pub fn execute(
        &self,
        prog: &Arc<Program>,
        func: FuncId,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Box<Panic>> {
        self.run(prog, Some((func, args)))
    }

    /// Run the initializers of `prog` that have not run yet, and nothing else.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn initialize(&self, prog: &Arc<Program>) -> Result<(), Box<Panic>> {
        self.run(prog, None).map(|_| ())
    }

    fn run(
        &self,
        prog: &Arc<Program>,
        call: Option<(FuncId, Vec<Value>)>,
    ) -> Result<Vec<Value>, Box<Panic>> {
        self.globals.extend_to(prog.global_zeros());
        let rt = Runtime::new(self.config.runtime.clone(), Arc::clone(&self.config.print));
        let mut task = Task::new(Arc::clone(prog), Arc::clone(&rt), Arc::clone(&self.globals), true);
        rt.set_main(&task.waiter);

        let result = task.run_inits(&self.inits_run).and_then(|()| match call {
            Some((func, args)) => task.call_func(func, None, args),
            None => Ok(Vec::new()),
        });
        let result = result.map_err(|unwind| task.into_panic(unwind));
        rt.shutdown();

        // A goroutine failure ends the run even if main finished first.
        match rt.fatal() {
            Some(fatal) => Err(fatal),
            None => result,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new(ExecConfig::default())
    }
}

/// Call state of one function activation.
pub(crate) struct CallState {
    /// Frame holding results and parameters.
    root: Arc<Frame>,
    /// Innermost frame; loop iteration frames are pushed on top of `root`.
    frame: Arc<Frame>,
    defers: Vec<Deferred>,
}

/// One thread of interpreted execution.
pub struct Task {
    pub(crate) prog: Arc<Program>,
    pub(crate) rt: Arc<Runtime>,
    globals: Arc<Frame>,
    waiter: Arc<Waiter>,
    is_main: bool,
    depth: usize,
    /// Panics whose deferred calls are running, innermost last.
    panics: Vec<ActivePanic>,
}

impl Task {
    fn new(prog: Arc<Program>, rt: Arc<Runtime>, globals: Arc<Frame>, is_main: bool) -> Self {
        let waiter = rt.new_waiter();
        Task {
            prog,
            rt,
            globals,
            waiter,
            is_main,
            depth: 0,
            panics: Vec::new(),
        }
    }

    fn run_inits(&mut self, counter: &Mutex<usize>) -> ExecResult<()> {
        let prog = Arc::clone(&self.prog);
        let mut done = counter.lock();
        while let Some(&init) = prog.inits().get(*done) {
            // Counted before running so a failed init is not retried.
            *done += 1;
            tracing::debug!(init = %prog.func(init).name, "running package initializer");
            self.call_func(init, None, Vec::new())?;
        }
        Ok(())
    }

    /// Final form of an unwind that left the task.
    fn into_panic(&mut self, unwind: Unwind) -> Box<Panic> {
        match unwind {
            Unwind::Panic(p) | Unwind::Fatal(p) => self.with_message(p),
            Unwind::Exit => self.rt.fatal().unwrap_or_else(|| {
                Box::new(Panic::new(Value::string("execution stopped"), PanicKind::Internal))
            }),
        }
    }

    /// Replace the message of an error-valued panic with its `Error()`.
    fn with_message(&mut self, mut panic: Box<Panic>) -> Box<Panic> {
        if let Value::Iface(_) = &panic.value {
            let value = panic.value.clone();
            if let Ok(text) = self.error_text(&value) {
                panic.message = text;
            }
        }
        panic
    }

    #[inline]
    fn check_stop(&self) -> ExecResult<()> {
        if self.rt.stopped() {
            Err(Unwind::Exit)
        } else {
            Ok(())
        }
    }

    // === Slots ===

    fn frame_of(&self, cs: &CallState, loc: Loc) -> Option<(Arc<Frame>, u32)> {
        match loc {
            Loc::Local(i) => Some((Arc::clone(&cs.frame), i)),
            Loc::Up { level, index } => cs.frame.ancestor(level).map(|f| (Arc::clone(f), index)),
            Loc::Global(i) => Some((Arc::clone(&self.globals), i)),
        }
    }

    fn load(&self, cs: &CallState, loc: Loc) -> Value {
        match loc {
            Loc::Local(i) => cs.frame.get(i),
            Loc::Up { level, index } => cs.frame.ancestor(level).map_or(Value::Nil, |f| f.get(index)),
            Loc::Global(i) => self.globals.get(i),
        }
    }

    fn read(&self, cs: &CallState, src: &Src) -> Value {
        match src {
            Src::Loc(loc) => self.load(cs, *loc),
            Src::Const(v) => v.clone(),
        }
    }

    fn read_all<'a>(&self, cs: &CallState, srcs: impl IntoIterator<Item = &'a Src>) -> Vec<Value> {
        srcs.into_iter().map(|s| self.read(cs, s)).collect()
    }

    fn write(&self, cs: &CallState, loc: Loc, value: Value) {
        match loc {
            Loc::Local(i) => cs.frame.set(i, value),
            Loc::Up { level, index } => {
                if let Some(frame) = cs.frame.ancestor(level) {
                    frame.set(index, value);
                }
            }
            Loc::Global(i) => self.globals.set(i, value),
        }
    }

    // === Run loop ===

    /// Execute nodes from `start` until a `Return`.
    fn run(&mut self, cs: &mut CallState, start: CfgId) -> ExecResult<()> {
        let prog = Arc::clone(&self.prog);
        let mut pc = start;
        while !pc.is_none() {
            let node = prog.node(pc);
            let mut next = node.next;
            match &node.op {
                Op::Nop => self.check_stop()?,
                Op::Move { dst, src } => {
                    let v = self.read(cs, src);
                    self.write(cs, *dst, v);
                }
                Op::Binary {
                    dst,
                    op,
                    kind,
                    lhs,
                    rhs,
                } => {
                    let v = ops::binary(*op, *kind, &self.read(cs, lhs), &self.read(cs, rhs))?;
                    self.write(cs, *dst, v);
                }
                Op::Unary { dst, op, kind, src } => {
                    let v = ops::unary(*op, *kind, &self.read(cs, src))?;
                    self.write(cs, *dst, v);
                }
                Op::Convert { dst, src, conv } => {
                    let v = ops::convert(*conv, &self.read(cs, src));
                    self.write(cs, *dst, v);
                }
                Op::MakeIface { dst, src, ty } => {
                    let v = self.read(cs, src);
                    self.write(cs, *dst, Value::iface(*ty, v));
                }
                Op::Branch { cond } => {
                    self.check_stop()?;
                    if self.read(cs, cond).as_bool() != Some(true) {
                        next = node.alt;
                    }
                }
                Op::Load { dst, place } => {
                    let v = self.load_place(cs, place)?;
                    self.write(cs, *dst, v);
                }
                Op::Store { place, src } => {
                    let v = self.read(cs, src);
                    self.store_place(cs, place, v)?;
                }
                Op::Addr { dst, place } => {
                    let p = self.place_pointer(cs, place)?;
                    self.write(cs, *dst, Value::Pointer(p));
                }
                Op::Box { dst, src } => {
                    let v = self.read(cs, src);
                    self.write(cs, *dst, Value::Pointer(Pointer::cell(v)));
                }
                Op::MapIndex {
                    dst,
                    ok,
                    map,
                    key,
                    zero,
                } => {
                    let (v, found) = place::map_index(&self.read(cs, map), &self.read(cs, key), zero);
                    self.write(cs, *dst, v);
                    if let Some(ok) = ok {
                        self.write(cs, *ok, Value::Bool(found));
                    }
                }
                Op::MapStore { map, key, src } => {
                    let (m, k, v) = (self.read(cs, map), self.read(cs, key), self.read(cs, src));
                    place::map_store(&m, k, v)?;
                }
                Op::StrIndex { dst, text, index } => {
                    let v = place::str_index(&self.read(cs, text), &self.read(cs, index))?;
                    self.write(cs, *dst, v);
                }
                Op::SliceExpr {
                    dst,
                    src,
                    low,
                    high,
                    max,
                } => {
                    let bound = |b: &Option<Src>| b.as_ref().map(|s| self.read(cs, s));
                    let v = place::slice_expr(
                        &self.read(cs, src),
                        bound(low),
                        bound(high),
                        bound(max),
                    )?;
                    self.write(cs, *dst, v);
                }
                Op::MakeStruct { dst, fields } => {
                    let v = Value::strukt(self.read_all(cs, fields));
                    self.write(cs, *dst, v);
                }
                Op::MakeArray { dst, elems } => {
                    let v = Value::array(self.read_all(cs, elems));
                    self.write(cs, *dst, v);
                }
                Op::MakeSlice { dst, elems } => {
                    let v = Value::slice(self.read_all(cs, elems));
                    self.write(cs, *dst, v);
                }
                Op::MakeMap { dst, entries } => {
                    let mut map = FxHashMap::default();
                    for (k, v) in entries {
                        map.insert(self.read(cs, k), self.read(cs, v));
                    }
                    self.write(cs, *dst, Value::map(map));
                }
                Op::Closure { dst, func } => {
                    let v = Value::Func(FuncValue::Closure {
                        func: *func,
                        env: Some(Arc::clone(&cs.frame)),
                    });
                    self.write(cs, *dst, v);
                }
                Op::MethodValue { dst, recv, func } => {
                    let recv = self.read(cs, recv);
                    let v = Value::Func(FuncValue::Bound {
                        func: *func,
                        recv: Box::new(recv),
                    });
                    self.write(cs, *dst, v);
                }
                Op::IfaceMethodValue { dst, recv, name } => {
                    let v = self.iface_method_value(&self.read(cs, recv), *name)?;
                    self.write(cs, *dst, v);
                }
                Op::Call { callee, args, rets } => {
                    self.check_stop()?;
                    let (target, args) = self.resolve_call(cs, callee, args)?;
                    let results = self.invoke(target, args)?;
                    for (dst, v) in rets.iter().zip(results) {
                        self.write(cs, *dst, v);
                    }
                }
                Op::Go { callee, args } => {
                    let (target, args) = self.resolve_call(cs, callee, args)?;
                    self.go(target, args)?;
                }
                Op::Defer { callee, args } => {
                    let (target, args) = self.resolve_call(cs, callee, args)?;
                    cs.defers.push(Deferred { target, args });
                }
                Op::DeferBuiltin { func, args, go } => {
                    let target = Callable::Builtin(func.clone());
                    let args = self.read_all(cs, args);
                    if *go {
                        self.go(target, args)?;
                    } else {
                        cs.defers.push(Deferred { target, args });
                    }
                }
                Op::Builtin { func, args, dst } => {
                    let args = self.read_all(cs, args);
                    let v = self.builtin(func, args)?;
                    if let Some(dst) = dst {
                        self.write(cs, *dst, v);
                    }
                }
                Op::Return => return Ok(()),
                Op::TypeAssert {
                    dst,
                    ok,
                    src,
                    target,
                    zero,
                } => {
                    let v = self.read(cs, src);
                    match (self.type_assert(&v, target), ok) {
                        (Some(got), _) => {
                            if let Some(dst) = dst {
                                self.write(cs, *dst, got);
                            }
                            if let Some(ok) = ok {
                                self.write(cs, *ok, Value::Bool(true));
                            }
                        }
                        (None, Some(ok)) => {
                            if let Some(dst) = dst {
                                self.write(cs, *dst, zero.clone());
                            }
                            self.write(cs, *ok, Value::Bool(false));
                        }
                        (None, None) => return Err(self.assertion_failure(&v, target)),
                    }
                }
                Op::Send { chan, value } => {
                    let ch = chan_of(&self.read(cs, chan));
                    let v = self.read(cs, value);
                    self.rt.send(ch.as_ref(), v, &self.waiter, self.is_main)?;
                }
                Op::Recv { chan, dst, ok, zero } => {
                    let ch = chan_of(&self.read(cs, chan));
                    let got = self.rt.recv(ch.as_ref(), &self.waiter, self.is_main)?;
                    if let Some(ok) = ok {
                        self.write(cs, *ok, Value::Bool(got.is_some()));
                    }
                    if let Some(dst) = dst {
                        self.write(cs, *dst, got.unwrap_or_else(|| zero.clone()));
                    }
                }
                Op::Select {
                    cases,
                    has_default,
                    chosen,
                } => {
                    let index = self.select(cs, cases, *has_default)?;
                    self.write(cs, *chosen, Value::Int(index));
                }
                Op::RangeStart { dst, src, kind } => {
                    let it = range::start(*kind, self.read(cs, src))?;
                    self.write(cs, *dst, it);
                }
                Op::RangeNext { iter, key, value } => {
                    match self.range_next(&self.read(cs, iter))? {
                        Some((k, v)) => {
                            if let Some(key) = key {
                                self.write(cs, *key, k);
                            }
                            if let Some(value) = value {
                                self.write(cs, *value, v);
                            }
                        }
                        None => next = node.alt,
                    }
                }
                Op::EnterFrame { size } => {
                    cs.frame = Frame::new(*size as usize, Some(Arc::clone(&cs.frame)));
                }
                Op::NextFrame { size, carry } => {
                    let fresh = Frame::new(*size as usize, cs.frame.parent().cloned());
                    for &slot in carry {
                        fresh.set(slot, cs.frame.get(slot));
                    }
                    cs.frame = fresh;
                }
                Op::LeaveFrame { levels } => {
                    let outer = cs
                        .frame
                        .ancestor(*levels)
                        .cloned()
                        .ok_or_else(|| internal("frame underflow"))?;
                    cs.frame = outer;
                }
            }
            pc = next;
        }
        Ok(())
    }

    fn select(&self, cs: &CallState, cases: &[SelectCase], has_default: bool) -> ExecResult<i64> {
        let arms: Vec<SelectArm> = cases
            .iter()
            .map(|case| match case {
                SelectCase::Send { chan, value } => SelectArm::Send {
                    chan: chan_of(&self.read(cs, chan)),
                    value: self.read(cs, value),
                },
                SelectCase::Recv { chan, .. } => SelectArm::Recv {
                    chan: chan_of(&self.read(cs, chan)),
                },
            })
            .collect();
        Ok(
            match self.rt.select(&arms, has_default, &self.waiter, self.is_main)? {
                SelectResult::Default => -1,
                SelectResult::Sent(case) => case as i64,
                SelectResult::Received { case, value } => {
                    if let Some(SelectCase::Recv { dst, ok, zero, .. }) = cases.get(case) {
                        if let Some(ok) = ok {
                            self.write(cs, *ok, Value::Bool(value.is_some()));
                        }
                        if let Some(dst) = dst {
                            self.write(cs, *dst, value.unwrap_or_else(|| zero.clone()));
                        }
                    }
                    case as i64
                }
            },
        )
    }

    /// Result of a successful assertion, `None` on failure.
    fn type_assert(&self, value: &Value, target: &AssertTarget) -> Option<Value> {
        let Value::Iface(iv) = value else {
            return None;
        };
        match target {
            AssertTarget::Concrete(ty) => (iv.ty == *ty).then(|| iv.value.clone()),
            AssertTarget::Iface { methods, .. } => methods
                .iter()
                .all(|m| self.prog.has_method(iv.ty, *m))
                .then(|| value.clone()),
        }
    }

    fn assertion_failure(&self, value: &Value, target: &AssertTarget) -> Unwind {
        let want = match target {
            AssertTarget::Concrete(ty) | AssertTarget::Iface { ty, .. } => self.prog.type_name(*ty),
        };
        let msg = match value {
            Value::Iface(iv) => {
                let have = self.prog.type_name(iv.ty);
                match target {
                    AssertTarget::Concrete(_) => {
                        format!("interface conversion: interface is {have}, not {want}")
                    }
                    AssertTarget::Iface { .. } => {
                        format!("interface conversion: {have} is not {want}: missing method")
                    }
                }
            }
            _ => format!("interface conversion: interface is nil, not {want}"),
        };
        crate::errors::runtime_error(PanicKind::TypeAssertion, msg)
    }
}

fn chan_of(value: &Value) -> Option<Arc<Channel>> {
    match value {
        Value::Chan(ch) => Some(Arc::clone(ch)),
        _ => None,
    }
}
