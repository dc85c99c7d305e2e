//! Terp Eval - executor and runtime for compiled terp programs.
//!
//! The compiler lowers function bodies to a control-flow graph of [`Op`]
//! nodes stored in a [`Program`]; this crate runs them.
//!
//! # Architecture
//!
//! - [`Value`]: runtime values, shared across goroutine threads via `Arc`
//! - [`Frame`]: slot vectors linked to their lexical parent, so closures
//!   capture variables by reference
//! - [`Executor`]: runs entry functions, owns package variables
//! - [`Runtime`]: goroutine threads, channels, `select` and deadlock
//!   detection
//! - [`SymbolProvider`]: host packages imported by interpreted code

pub mod errors;
mod exec;
mod frame;
pub mod host;
mod print_handler;
pub mod program;
mod runtime;
pub mod value;

pub use errors::{ExecResult, Panic, PanicKind, Unwind};
pub use exec::{ExecConfig, Executor};
pub use frame::Frame;
pub use host::{
    error_value, HostCtx, HostError, HostFunc, HostInterface, HostMember, HostPackage,
    HostSignature, HostType, SymbolProvider,
};
pub use print_handler::{
    buffer_handler, silent_handler, stdout_handler, PrintHandler, SharedPrintHandler,
};
pub use program::{CfgId, CfgNode, FuncId, FuncProto, Program};
pub use runtime::{Channel, Runtime, RuntimeConfig};
pub use value::{format_value, FuncValue, Pointer, SliceValue, Value};
