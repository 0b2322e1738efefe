//! Error types for running generated programs.
//!
//! Code generation itself does not fail recoverably: a malformed tree or IR
//! the verifier rejects is a defect and panics. Everything that can go wrong
//! once a module is handed to the execution engine is a `JitError`.

pub mod errors;

#[cfg(test)]
mod tests;
