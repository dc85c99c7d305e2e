//! Shared helpers for phase tests.

#![allow(dead_code)]

use std::sync::Arc;

use terp::{AstBuilder, CompileError, Error, ErrorCode, Interpreter, NodeId, Program};

/// Interpreter capturing output in memory.
pub fn interp() -> Interpreter {
    Interpreter::builder().buffered().build()
}

/// `func main() { stmts }`
pub fn main_fn(b: &AstBuilder, stmts: Vec<NodeId>) -> NodeId {
    b.func("main", Vec::new(), Vec::new(), b.block(stmts))
}

/// `println(args...)` as a statement.
pub fn println(b: &AstBuilder, args: Vec<NodeId>) -> NodeId {
    b.expr_stmt(b.call_named("println", args))
}

/// `name(args...)` as a statement.
pub fn call_stmt(b: &AstBuilder, name: &str, args: Vec<NodeId>) -> NodeId {
    b.expr_stmt(b.call_named(name, args))
}

/// Compile a single-file package on `interp`.
pub fn compile_on(
    interp: &Interpreter,
    build: impl FnOnce(&AstBuilder) -> Vec<NodeId>,
) -> Result<Arc<Program>, Error> {
    let b = interp.ast_builder();
    let decls = build(&b);
    interp.compile(b.into_package(decls))
}

/// Compile and run `main`, returning what it printed.
pub fn run(build: impl FnOnce(&AstBuilder) -> Vec<NodeId>) -> String {
    let interp = interp();
    let program = compile_on(&interp, build).unwrap_or_else(|e| panic!("compile failed: {e}"));
    interp
        .run_main(&program)
        .unwrap_or_else(|e| panic!("run failed: {e}\noutput so far:\n{}", interp.output()));
    interp.output()
}

/// Compile and run `main`, expecting it to fail at run time.
pub fn run_err(build: impl FnOnce(&AstBuilder) -> Vec<NodeId>) -> (Error, String) {
    let interp = interp();
    let program = compile_on(&interp, build).unwrap_or_else(|e| panic!("compile failed: {e}"));
    match interp.run_main(&program) {
        Ok(()) => panic!("expected a run-time failure, output:\n{}", interp.output()),
        Err(err) => (err, interp.output()),
    }
}

/// Compile, expecting diagnostics.
pub fn compile_err(build: impl FnOnce(&AstBuilder) -> Vec<NodeId>) -> CompileError {
    let interp = interp();
    match compile_on(&interp, build) {
        Ok(_) => panic!("expected a compile error"),
        Err(Error::Compile(err)) => err,
        Err(other) => panic!("expected a compile error, got {other}"),
    }
}

/// Assert that compiling fails with `code`.
pub fn assert_compile_error(build: impl FnOnce(&AstBuilder) -> Vec<NodeId>, code: ErrorCode) {
    let err = compile_err(build);
    assert!(
        err.has_code(code),
        "expected {code}, got:\n{err}"
    );
}
