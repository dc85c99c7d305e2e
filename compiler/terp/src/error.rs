use terp_diagnostic::CompileError;
use terp_eval::{Panic, PanicKind, Value};

/// Everything an [`Interpreter`](crate::Interpreter) call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The unit did not compile; nothing from it was kept.
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// An unrecovered panic, runtime fault or deadlock ended the run.
    #[error("{}", render_panic(.kind, .message))]
    Panic {
        value: Value,
        kind: PanicKind,
        message: String,
        /// Functions the panic unwound through, innermost first.
        trace: Vec<String>,
    },

    /// The program has no function with the requested entry name.
    #[error("no entry function `{0}`")]
    UnknownEntry(String),
}

impl Error {
    pub fn panic_kind(&self) -> Option<PanicKind> {
        match self {
            Error::Panic { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn as_compile(&self) -> Option<&CompileError> {
        match self {
            Error::Compile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Box<Panic>> for Error {
    fn from(panic: Box<Panic>) -> Self {
        let Panic {
            value,
            kind,
            message,
            trace,
        } = *panic;
        Error::Panic {
            value,
            kind,
            message,
            trace,
        }
    }
}

fn render_panic(kind: &PanicKind, message: &str) -> String {
    if *kind == PanicKind::Deadlock {
        format!("fatal error: {message}")
    } else {
        format!("panic: {message}")
    }
}
