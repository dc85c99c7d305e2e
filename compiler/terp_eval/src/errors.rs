//! Panics and unwinding.
//!
//! Runtime faults and explicit `panic` calls share one path: both produce a
//! [`Panic`] that unwinds call by call, running deferred calls, until a
//! deferred function recovers it or it reaches the top of the task. Fault
//! values are interface values of the built-in runtime error type, so
//! recovered faults can be inspected with `Error()`.

use std::fmt;

use terp_types::Idx;

use crate::value::format_value;
use crate::Value;

/// Category of a panic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PanicKind {
    /// `panic(v)` in interpreted code.
    Explicit,
    NilDereference,
    IndexOutOfRange,
    DivideByZero,
    /// Send on or close of a closed channel, close of a nil channel.
    ClosedChannel,
    /// Assignment to an entry of a nil map.
    NilMap,
    TypeAssertion,
    /// Call of a nil function value.
    NilFunc,
    StackOverflow,
    /// Every task is blocked.
    Deadlock,
    /// Error returned by a host function.
    Host,
    /// Inconsistent program; indicates a compiler bug.
    Internal,
}

impl PanicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PanicKind::Explicit => "panic",
            PanicKind::NilDereference => "nil dereference",
            PanicKind::IndexOutOfRange => "index out of range",
            PanicKind::DivideByZero => "divide by zero",
            PanicKind::ClosedChannel => "closed channel",
            PanicKind::NilMap => "nil map",
            PanicKind::TypeAssertion => "type assertion",
            PanicKind::NilFunc => "nil function",
            PanicKind::StackOverflow => "stack overflow",
            PanicKind::Deadlock => "deadlock",
            PanicKind::Host => "host error",
            PanicKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for PanicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A panic in flight or one that terminated a run.
#[derive(Clone, Debug)]
pub struct Panic {
    pub value: Value,
    pub kind: PanicKind,
    /// Human-readable form of `value`; for error values, their `Error()`.
    pub message: String,
    /// Functions unwound by the panic, innermost first.
    pub trace: Vec<String>,
}

impl Panic {
    pub fn new(value: Value, kind: PanicKind) -> Self {
        let message = describe(&value);
        Panic {
            value,
            kind,
            message,
            trace: Vec::new(),
        }
    }

    pub fn deadlock() -> Self {
        Panic::new(
            Value::string("all goroutines are asleep - deadlock!"),
            PanicKind::Deadlock,
        )
    }
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == PanicKind::Deadlock {
            write!(f, "fatal error: {}", self.message)
        } else {
            write!(f, "panic: {}", self.message)
        }
    }
}

/// Default message for a panic value. Runtime faults carry the
/// `runtime error: ` prefix that their `Error()` method returns.
fn describe(value: &Value) -> String {
    match value {
        Value::Iface(i) if i.ty == Idx::RUNTIME_ERROR => {
            format!("runtime error: {}", format_value(&i.value))
        }
        other => format_value(other),
    }
}

/// Non-local exit from interpreted code.
#[derive(Debug)]
pub enum Unwind {
    /// Recoverable panic.
    Panic(Box<Panic>),
    /// Unrecoverable failure; deferred calls do not run.
    Fatal(Box<Panic>),
    /// The runtime is shutting down (main returned or another task failed).
    Exit,
}

pub type ExecResult<T = ()> = Result<T, Unwind>;

/// A runtime fault panic carrying a runtime error value.
pub(crate) fn runtime_error(kind: PanicKind, msg: impl Into<String>) -> Unwind {
    let value = Value::iface(Idx::RUNTIME_ERROR, Value::string(msg.into()));
    Unwind::Panic(Box::new(Panic::new(value, kind)))
}

pub(crate) fn nil_dereference() -> Unwind {
    runtime_error(
        PanicKind::NilDereference,
        "invalid memory address or nil pointer dereference",
    )
}

pub(crate) fn index_out_of_range(index: i64, len: usize) -> Unwind {
    runtime_error(
        PanicKind::IndexOutOfRange,
        format!("index out of range [{index}] with length {len}"),
    )
}

pub(crate) fn slice_out_of_range(low: i64, high: i64, cap: usize) -> Unwind {
    runtime_error(
        PanicKind::IndexOutOfRange,
        format!("slice bounds out of range [{low}:{high}] with capacity {cap}"),
    )
}

pub(crate) fn divide_by_zero() -> Unwind {
    runtime_error(PanicKind::DivideByZero, "integer divide by zero")
}

pub(crate) fn closed_channel(msg: &str) -> Unwind {
    // Channel misuse panics are plain errors, not runtime.Error values.
    Unwind::Panic(Box::new(Panic::new(
        Value::string(msg),
        PanicKind::ClosedChannel,
    )))
}

pub(crate) fn nil_map_write() -> Unwind {
    Unwind::Panic(Box::new(Panic::new(
        Value::string("assignment to entry in nil map"),
        PanicKind::NilMap,
    )))
}

pub(crate) fn nil_func() -> Unwind {
    nil_dereference_kind(PanicKind::NilFunc)
}

pub(crate) fn stack_overflow(depth: usize) -> Unwind {
    runtime_error(
        PanicKind::StackOverflow,
        format!("stack overflow: call depth exceeds {depth}"),
    )
}

pub(crate) fn internal(msg: impl Into<String>) -> Unwind {
    let msg = msg.into();
    tracing::warn!(%msg, "internal executor error");
    Unwind::Fatal(Box::new(Panic::new(Value::string(msg), PanicKind::Internal)))
}

fn nil_dereference_kind(kind: PanicKind) -> Unwind {
    runtime_error(kind, "invalid memory address or nil pointer dereference")
}
