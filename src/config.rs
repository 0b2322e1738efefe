//! Options for code generation and execution.

use std::env;

pub const DEBUG_LLVM_VAR: &str = "FLOYD_DEBUG_LLVM";
pub const TRACE_RUNTIME_VAR: &str = "FLOYD_TRACE_RUNTIME";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Log the module IR before it is handed to the JIT.
    pub dump_ir: bool,
    /// Log every native runtime helper call.
    pub trace_runtime: bool,
}

impl GeneratorConfig {
    /// Reads the options from the environment. A variable counts as set
    /// unless it is empty, `0` or `false`.
    pub fn from_env() -> Self {
        GeneratorConfig {
            dump_ir: env_flag(DEBUG_LLVM_VAR),
            trace_runtime: env_flag(TRACE_RUNTIME_VAR),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| parse_flag(&value))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false")
}
