//! In-process execution of generated modules.
//!
//! The engine resolves every function the module only declares (runtime
//! helpers and host functions) against the native symbol table, computes
//! struct layouts from the engine's target data, and runs global
//! initialization before any Floyd function is called. `call` lowers Rust
//! arguments to the generated calling convention.

pub mod call;
pub mod engine;

#[cfg(test)]
mod tests;
