//! Terp - an embeddable interpreter for a Go-like language.
//!
//! Callers hand in syntax trees built with [`AstBuilder`]; the interpreter
//! resolves and type-checks them, lowers them to a frame-addressed CFG and
//! runs that CFG directly. Two modes share one session:
//!
//! - **Whole program**: [`Interpreter::compile`] a package, then
//!   [`Interpreter::run_main`] or [`Interpreter::execute`] any function.
//! - **Incremental**: [`Interpreter::eval`] units of declarations and
//!   statements one after another, REPL style. Top-level variables of an
//!   eval unit persist for later units.
//!
//! Imports are served by [`SymbolProvider`]s; [`HostPackageBuilder`] and
//! [`MapProvider`] cover the common case of registering native functions.
//!
//! ```no_run
//! use terp::{BinaryOp, Interpreter};
//!
//! let interp = Interpreter::builder().buffered().build();
//! let b = interp.ast_builder();
//! let sum = b.binary(BinaryOp::Add, b.int(40), b.int(2));
//! let stmt = b.expr_stmt(sum);
//! let unit = b.into_unit(&[], Vec::new(), vec![stmt]);
//! let value = interp.eval(unit).unwrap();
//! assert_eq!(value.and_then(|v| v.as_i64()), Some(42));
//! ```

mod config;
mod error;
mod host;
mod interpreter;

use std::sync::Once;

pub use config::{InterpreterBuilder, InterpreterConfig};
pub use error::Error;
pub use host::{HostPackageBuilder, MapProvider};
pub use interpreter::Interpreter;

pub use terp_compile::{Storage, Symbol, SymbolKind};
pub use terp_diagnostic::{CompileError, Diagnostic, ErrorCode};
pub use terp_eval::{
    buffer_handler, error_value, format_value, silent_handler, stdout_handler, HostCtx,
    HostError, HostFunc, HostInterface, HostMember, HostPackage, HostSignature, HostType, Panic,
    PanicKind, PrintHandler, Program, SharedPrintHandler, SymbolProvider, Value,
};
pub use terp_ir::{
    AstBuilder, BinaryOp, ChanDir, NodeId, Package, SharedInterner, SourceFile, Span, UnaryOp,
};

static TRACING_INIT: Once = Once::new();

/// Initialize the tracing subscriber.
///
/// Does nothing unless `RUST_LOG` is set, e.g. `RUST_LOG=terp_compile=debug`.
/// Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
