//! Failure plumbing shared by declaration resolution and body lowering.
//!
//! Every checking function returns [`Check`]. A [`Halt::Blocked`] means the
//! item depends on a name that is not resolved yet; the GTA worklist retries
//! such items, everywhere else it is reported as an unresolved name.

use terp_diagnostic::{undefined, Diagnostic, ErrorCode};
use terp_ir::{Name, SharedInterner, Span};

#[derive(Debug)]
pub(crate) enum Halt {
    /// Depends on `name`, which is pending (`pending`) or unknown.
    Blocked {
        name: Name,
        span: Span,
        pending: bool,
    },
    Error(Box<Diagnostic>),
}

pub(crate) type Check<T> = Result<T, Halt>;

impl From<Diagnostic> for Halt {
    fn from(diag: Diagnostic) -> Self {
        Halt::Error(Box::new(diag))
    }
}

impl Halt {
    /// The diagnostic to report once retrying is no longer possible.
    pub(crate) fn into_diagnostic(self, interner: &SharedInterner) -> Diagnostic {
        match self {
            Halt::Error(diag) => *diag,
            Halt::Blocked {
                name,
                span,
                pending: false,
            } => undefined(span, interner.lookup(name)),
            Halt::Blocked { name, span, .. } => Diagnostic::error(ErrorCode::E1004)
                .with_message(format!(
                    "initialization cycle or invalid recursive declaration of {}",
                    interner.lookup(name)
                ))
                .with_label(span, "refers to itself through this reference"),
        }
    }
}

/// `Err` with a plain diagnostic.
pub(crate) fn fail<T>(code: ErrorCode, span: Span, message: impl Into<String>) -> Check<T> {
    let message = message.into();
    Err(Diagnostic::error(code)
        .with_message(message.clone())
        .with_label(span, message)
        .into())
}
