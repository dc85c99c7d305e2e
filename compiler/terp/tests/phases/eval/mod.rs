//! Execution-phase tests.

mod closures;
mod concurrency;
mod host;
mod panics;
mod repl;
