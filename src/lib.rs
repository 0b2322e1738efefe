#![allow(clippy::module_inception)]

//! LLVM back end for the Floyd language.
//!
//! Takes a type-checked `SemanticAst`, generates a verified LLVM module and
//! runs it in-process with MCJIT against a native runtime.

use std::sync::Once;

pub mod ast;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod jit;
pub mod runtime;

pub use compiler::compiler::{generate_llvm_ir_program, LlvmInstance, LlvmIrProgram};
pub use config::GeneratorConfig;
pub use errors::errors::{JitError, JitResult};
pub use jit::call::JitValue;
pub use jit::engine::{
    get_global_function, get_global_ptr, make_engine_no_init, make_engine_run_init, LlvmExecutionEngine,
};

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, for example
/// `RUST_LOG=floyd_llvm=debug`. Does nothing when `RUST_LOG` is unset.
/// Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .try_init();
        }
    });
}
