//! Calls, deferred calls, panics and interface dispatch.

use std::sync::Arc;

use terp_ir::Name;
use terp_stack::ensure_sufficient_stack;

use super::{CallState, Task};
use crate::errors::{internal, nil_dereference, nil_func, stack_overflow, ExecResult, Panic, Unwind};
use crate::host::{HostCtx, HostSignature, HostType};
use crate::program::{Builtin, Callee, DispatchTarget, FuncId, RecvStep, Src};
use crate::value::{format_value, FuncValue};
use crate::{Frame, HostFunc, Value};

/// Trace entries beyond this many frames are dropped.
const MAX_TRACE: usize = 256;

/// A resolved call target.
#[derive(Clone)]
pub(crate) enum Callable {
    Func {
        func: FuncId,
        env: Option<Arc<Frame>>,
        /// Receiver prepended to the arguments.
        recv: Option<Value>,
    },
    Host(Arc<HostFunc>),
    Builtin(Builtin),
    /// `Error()` of a built-in error value: returns the text.
    Text(String),
}

pub(crate) struct Deferred {
    pub target: Callable,
    pub args: Vec<Value>,
}

/// A panic whose deferred calls are running.
pub(crate) struct ActivePanic {
    panic: Box<Panic>,
    /// Call depth of the deferred functions allowed to recover it.
    depth: usize,
    recovered: bool,
}

impl Task {
    /// Call a compiled function. Deferred calls run before this returns,
    /// whether the body returned or panicked.
    pub(crate) fn call_func(
        &mut self,
        func: FuncId,
        env: Option<Arc<Frame>>,
        args: Vec<Value>,
    ) -> ExecResult<Vec<Value>> {
        let max_depth = self.rt.config().max_depth;
        if self.depth >= max_depth {
            return Err(stack_overflow(max_depth));
        }
        let prog = Arc::clone(&self.prog);
        let proto = prog.func(func);

        let mut slots = Vec::with_capacity(proto.frame_size as usize);
        slots.extend(proto.result_zeros.iter().cloned());
        slots.extend(args);
        let frame = Frame::with_slots(slots, proto.frame_size as usize, env);
        let mut cs = CallState {
            root: Arc::clone(&frame),
            frame,
            defers: Vec::new(),
        };

        self.depth += 1;
        let body = ensure_sufficient_stack(|| self.run(&mut cs, proto.start));
        let result = self.run_defers(&mut cs, body);
        self.depth -= 1;

        match result {
            Ok(()) => Ok(cs.root.prefix(proto.nresults as usize)),
            Err(Unwind::Panic(mut panic)) => {
                if panic.trace.len() < MAX_TRACE {
                    panic.trace.push(proto.name.clone());
                }
                Err(Unwind::Panic(panic))
            }
            Err(other) => Err(other),
        }
    }

    /// Run deferred calls last-in first-out. A panic stays active until a
    /// deferred call recovers it; a panic raised by a deferred call
    /// replaces the one in flight.
    fn run_defers(&mut self, cs: &mut CallState, mut result: ExecResult<()>) -> ExecResult<()> {
        loop {
            if matches!(result, Err(Unwind::Exit | Unwind::Fatal(_))) {
                return result;
            }
            let Some(deferred) = cs.defers.pop() else {
                return result;
            };
            result = match result {
                Err(Unwind::Panic(panic)) => self.defer_while_panicking(deferred, panic),
                done => self.invoke(deferred.target, deferred.args).and(done),
            };
        }
    }

    fn defer_while_panicking(&mut self, deferred: Deferred, panic: Box<Panic>) -> ExecResult<()> {
        self.panics.push(ActivePanic {
            panic,
            depth: self.depth + 1,
            recovered: false,
        });
        let outcome = self.invoke(deferred.target, deferred.args);
        let active = self.panics.pop();
        match (outcome, active) {
            (Err(unwind), _) => Err(unwind),
            (Ok(_), Some(active)) if active.recovered => {
                tracing::debug!(panic = %active.panic.message, "panic recovered");
                Ok(())
            }
            (Ok(_), Some(active)) => Err(Unwind::Panic(active.panic)),
            (Ok(_), None) => Err(internal("panic stack underflow")),
        }
    }

    /// `recover()`: stops the active panic when called directly by a
    /// deferred function; otherwise returns nil.
    pub(super) fn recover(&mut self) -> Value {
        match self.panics.last_mut() {
            Some(active) if active.depth == self.depth && !active.recovered => {
                active.recovered = true;
                active.panic.value.clone()
            }
            _ => Value::Nil,
        }
    }

    pub(crate) fn invoke(&mut self, target: Callable, args: Vec<Value>) -> ExecResult<Vec<Value>> {
        match target {
            Callable::Func { func, env, recv } => {
                let args = match recv {
                    Some(recv) => std::iter::once(recv).chain(args).collect(),
                    None => args,
                };
                self.call_func(func, env, args)
            }
            Callable::Host(host) => {
                let mut ctx = HostCtx { task: self };
                host.call(&mut ctx, args).map_err(|unwind| match unwind {
                    Unwind::Panic(mut panic) => {
                        panic.trace.push(host.name.clone());
                        Unwind::Panic(panic)
                    }
                    other => other,
                })
            }
            Callable::Builtin(func) => {
                let v = self.builtin(&func, args)?;
                Ok(vec![v])
            }
            Callable::Text(text) => Ok(vec![Value::string(text)]),
        }
    }

    pub(super) fn resolve_call(
        &self,
        cs: &CallState,
        callee: &Callee,
        args: &[Src],
    ) -> ExecResult<(Callable, Vec<Value>)> {
        let target = match callee {
            Callee::Static(func) => Callable::Func {
                func: *func,
                env: None,
                recv: None,
            },
            Callee::Value(src) => callable_of(&self.read(cs, src))?,
            Callee::Iface { recv, name } => self.resolve_method(&self.read(cs, recv), *name)?,
        };
        Ok((target, self.read_all(cs, args)))
    }

    /// Find the implementation of method `name` for the dynamic type of
    /// interface value `recv`, adjusting the receiver on the way.
    fn resolve_method(&self, recv: &Value, name: Name) -> ExecResult<Callable> {
        let Value::Iface(iv) = recv else {
            return Err(nil_dereference());
        };
        let Some(dispatch) = self.prog.dispatch(iv.ty, name) else {
            return Err(internal(format!(
                "no method {} on {}",
                self.prog.interner().lookup(name),
                self.prog.type_name(iv.ty)
            )));
        };
        let mut r = iv.value.clone();
        for step in &dispatch.steps {
            r = match (step, r) {
                (RecvStep::Field(i), Value::Pointer(p)) => Value::Pointer(p.child(*i)),
                (RecvStep::Field(i), Value::Struct(fields)) => {
                    fields.get(*i as usize).cloned().unwrap_or(Value::Nil)
                }
                (RecvStep::Deref, Value::Pointer(p)) => p.load(),
                (_, Value::Nil) => return Err(nil_dereference()),
                (step, other) => {
                    return Err(internal(format!(
                        "cannot apply {step:?} to {}",
                        format_value(&other)
                    )))
                }
            };
        }
        Ok(match dispatch.target {
            DispatchTarget::Func(func) => Callable::Func {
                func,
                env: None,
                recv: Some(r),
            },
            DispatchTarget::Iface(inner) => return self.resolve_method(&r, inner),
            DispatchTarget::RuntimeError => {
                Callable::Text(format!("runtime error: {}", format_value(&r)))
            }
            DispatchTarget::ErrorString => Callable::Text(format_value(&r)),
        })
    }

    /// Method value `x.M` of an interface value `x`.
    pub(super) fn iface_method_value(&self, recv: &Value, name: Name) -> ExecResult<Value> {
        Ok(match self.resolve_method(recv, name)? {
            Callable::Func {
                func,
                recv: Some(r),
                ..
            } => Value::Func(FuncValue::Bound {
                func,
                recv: Box::new(r),
            }),
            Callable::Func { func, env, .. } => Value::Func(FuncValue::Closure { func, env }),
            Callable::Host(host) => Value::Func(FuncValue::Host(host)),
            Callable::Text(text) => {
                let sig = HostSignature::new(Vec::new(), vec![HostType::String]);
                let host = HostFunc::new("Error", sig, move |_, _| Ok(vec![Value::string(text.as_str())]));
                Value::Func(FuncValue::Host(Arc::new(host)))
            }
            Callable::Builtin(_) => return Err(internal("builtin as method")),
        })
    }

    /// Start a goroutine running `target`.
    pub(super) fn go(&self, target: Callable, args: Vec<Value>) -> ExecResult<()> {
        let prog = Arc::clone(&self.prog);
        let rt = Arc::clone(&self.rt);
        let globals = Arc::clone(&self.globals);
        self.rt.spawn(move || {
            let mut task = Task::new(prog, Arc::clone(&rt), globals, false);
            match task.invoke(target, args) {
                Ok(_) | Err(Unwind::Exit) => {}
                Err(Unwind::Panic(panic) | Unwind::Fatal(panic)) => {
                    let panic = task.with_message(panic);
                    rt.fail(panic);
                }
            }
        })
    }

    // === Entry points for host functions ===

    pub(crate) fn call_value(&mut self, func: &Value, args: Vec<Value>) -> ExecResult<Vec<Value>> {
        let target = callable_of(func)?;
        self.invoke(target, args)
    }

    pub(crate) fn call_iface(
        &mut self,
        recv: &Value,
        name: Name,
        args: Vec<Value>,
    ) -> ExecResult<Vec<Value>> {
        let target = self.resolve_method(recv, name)?;
        self.invoke(target, args)
    }

    /// `Error()` of an error value; the printed form for anything else.
    pub(crate) fn error_text(&mut self, value: &Value) -> ExecResult<String> {
        let error = self.prog.interner().intern("Error");
        match value {
            Value::Iface(iv) if self.prog.has_method(iv.ty, error) => {
                let results = self.call_iface(value, error, Vec::new())?;
                Ok(results.first().map(format_value).unwrap_or_default())
            }
            other => Ok(format_value(other)),
        }
    }
}

fn callable_of(value: &Value) -> ExecResult<Callable> {
    match value {
        Value::Func(FuncValue::Closure { func, env }) => Ok(Callable::Func {
            func: *func,
            env: env.clone(),
            recv: None,
        }),
        Value::Func(FuncValue::Bound { func, recv }) => Ok(Callable::Func {
            func: *func,
            env: None,
            recv: Some((**recv).clone()),
        }),
        Value::Func(FuncValue::Host(host)) => Ok(Callable::Host(Arc::clone(host))),
        _ => Err(nil_func()),
    }
}
