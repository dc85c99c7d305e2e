//! The embedding entry point.

use std::sync::Arc;

use parking_lot::Mutex;
use terp_compile::{CompileContext, Storage, Symbol};
use terp_eval::{Executor, Program, Value};
use terp_ir::{AstBuilder, Package, SharedInterner};
use tracing::{debug, instrument};

use crate::config::{InterpreterBuilder, InterpreterConfig};
use crate::error::Error;

/// One interpreter session.
///
/// The compile state sits behind a single mutex, so compiling and
/// evaluating from several threads is serialized. Execution runs outside
/// that lock. Package variables live in the session's executor and survive
/// from one [`eval`](Self::eval) to the next. Separate interpreters share
/// nothing.
pub struct Interpreter {
    config: InterpreterConfig,
    interner: SharedInterner,
    ctx: Mutex<CompileContext>,
    exec: Executor,
}

impl Interpreter {
    /// Interpreter with default settings: output to stdout, no host packages.
    pub fn new() -> Self {
        InterpreterBuilder::new().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::new()
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let interner = SharedInterner::new();
        let ctx = CompileContext::with_providers(interner.clone(), config.providers.clone());
        let exec = Executor::new(config.exec_config());
        Interpreter {
            config,
            interner,
            ctx: Mutex::new(ctx),
            exec,
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Interner every unit handed to this interpreter must be built with.
    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// Fresh syntax builder sharing this interpreter's interner.
    pub fn ast_builder(&self) -> AstBuilder {
        AstBuilder::new(self.interner.clone())
    }

    /// Compile a whole package.
    ///
    /// On failure the session is left exactly as it was before the call.
    #[instrument(level = "debug", skip_all, fields(files = unit.files.len()))]
    pub fn compile(&self, unit: Package) -> Result<Arc<Program>, Error> {
        let program = self.ctx.lock().compile_package(unit)?;
        debug!(funcs = program.func_count(), nodes = program.node_count(), "compiled");
        Ok(program)
    }

    /// Run `entry` with `args`, after any initializers of `program` that
    /// have not run yet.
    pub fn execute(
        &self,
        program: &Arc<Program>,
        entry: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Error> {
        let Some(func) = program.entry(entry) else {
            return Err(Error::UnknownEntry(entry.to_string()));
        };
        Ok(self.exec.execute(program, func, args)?)
    }

    /// Run the configured entry function (`main` unless changed).
    pub fn run_main(&self, program: &Arc<Program>) -> Result<(), Error> {
        self.execute(program, &self.config.entry, Vec::new())
            .map(|_| ())
    }

    /// Compile and run an incremental unit.
    ///
    /// Declarations join the session; top-level `var` and `:=` declare
    /// package variables visible to later units. Returns the value of a
    /// trailing expression statement, if the unit ends with one.
    #[instrument(level = "debug", skip_all)]
    pub fn eval(&self, unit: Package) -> Result<Option<Value>, Error> {
        let unit = self.ctx.lock().compile_eval(unit)?;
        let Some(func) = unit.func else {
            self.exec.initialize(&unit.program)?;
            return Ok(None);
        };
        let results = self.exec.execute(&unit.program, func, Vec::new())?;
        Ok(if unit.has_value {
            results.into_iter().next()
        } else {
            None
        })
    }

    /// Package-level symbol declared so far.
    pub fn symbol(&self, name: &str) -> Option<Symbol> {
        self.ctx.lock().lookup(name).cloned()
    }

    /// Current value of the package variable `name`.
    pub fn global(&self, name: &str) -> Option<Value> {
        match self.symbol(name)?.storage {
            Storage::Global(slot) => Some(self.exec.global(slot)),
            _ => None,
        }
    }

    /// Number of distinct generic instantiations created so far.
    pub fn instantiation_count(&self) -> usize {
        self.ctx.lock().instantiation_count()
    }

    /// Output captured by a buffering print handler.
    pub fn output(&self) -> String {
        self.config.print.output()
    }

    /// Captured output, clearing the buffer.
    pub fn take_output(&self) -> String {
        self.config.print.take_output()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
