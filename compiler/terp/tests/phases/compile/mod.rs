//! Compile-phase tests.

mod generics;
mod gta;
mod types;
