//! Diagnostic system for compile-time errors.
//!
//! Every resolution or type error is a [`Diagnostic`] with an [`ErrorCode`]
//! and a primary span. Compilation collects them and returns them together
//! as a [`CompileError`]; nothing is deferred to run time.

mod diagnostic;
mod error_code;
pub mod span_utils;

pub use diagnostic::{type_mismatch, undefined, Diagnostic, Label, Severity};
pub use error_code::{parse_error_code, ErrorCode};

use std::fmt;

/// All diagnostics produced by one failed compilation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        CompileError { diagnostics }
    }

    /// Whether any diagnostic carries `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }

    pub fn first(&self) -> Option<&Diagnostic> {
        self.diagnostics.first()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}
