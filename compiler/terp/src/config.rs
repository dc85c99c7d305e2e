//! Interpreter configuration and its builder.

use std::sync::Arc;

use terp_eval::{
    buffer_handler, silent_handler, stdout_handler, ExecConfig, HostPackage, RuntimeConfig,
    SharedPrintHandler, SymbolProvider,
};

use crate::host::MapProvider;
use crate::interpreter::Interpreter;

/// Settings fixed for the lifetime of an [`Interpreter`].
#[derive(Clone)]
pub struct InterpreterConfig {
    /// Destination of `print`/`println`.
    pub print: SharedPrintHandler,
    /// Consulted in order for every import path.
    pub providers: Vec<Arc<dyn SymbolProvider>>,
    /// Host stack size of goroutine threads.
    pub stack_size: usize,
    /// Call depth at which interpreted code panics with a stack overflow.
    pub max_depth: usize,
    /// Function [`Interpreter::run_main`] starts.
    pub entry: String,
}

impl InterpreterConfig {
    pub(crate) fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            print: Arc::clone(&self.print),
            runtime: RuntimeConfig {
                stack_size: self.stack_size,
                max_depth: self.max_depth,
            },
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        let runtime = RuntimeConfig::default();
        InterpreterConfig {
            print: stdout_handler(),
            providers: Vec::new(),
            stack_size: runtime.stack_size,
            max_depth: runtime.max_depth,
            entry: "main".to_string(),
        }
    }
}

/// Builder for [`Interpreter`] instances.
///
/// Host packages added with [`host_package`](Self::host_package) are
/// collected into one [`MapProvider`] that is consulted after any
/// explicitly added providers.
#[derive(Default)]
pub struct InterpreterBuilder {
    config: InterpreterConfig,
    packages: MapProvider,
}

impl InterpreterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the print handler. Default is stdout.
    #[must_use]
    pub fn print_handler(mut self, handler: SharedPrintHandler) -> Self {
        self.config.print = handler;
        self
    }

    /// Capture output in memory; read it back with [`Interpreter::output`].
    #[must_use]
    pub fn buffered(self) -> Self {
        self.print_handler(buffer_handler())
    }

    /// Discard all output.
    #[must_use]
    pub fn silent(self) -> Self {
        self.print_handler(silent_handler())
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn SymbolProvider>) -> Self {
        self.config.providers.push(provider);
        self
    }

    /// Make `package` importable under its path.
    #[must_use]
    pub fn host_package(mut self, package: HostPackage) -> Self {
        self.packages.insert(package);
        self
    }

    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = bytes;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Set the function [`Interpreter::run_main`] starts. Default is `main`.
    #[must_use]
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.config.entry = name.into();
        self
    }

    /// Finish the configuration without creating an interpreter.
    pub fn into_config(mut self) -> InterpreterConfig {
        if !self.packages.is_empty() {
            self.config.providers.push(Arc::new(self.packages));
        }
        self.config
    }

    pub fn build(self) -> Interpreter {
        Interpreter::with_config(self.into_config())
    }
}
