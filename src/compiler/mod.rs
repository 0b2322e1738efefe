//! Code generation module.
//!
//! This module contains the LLVM-based code generator that lowers a
//! `SemanticAst` into a verified LLVM module. It handles:
//!
//! - Mapping Floyd types and function signatures to LLVM
//! - Lexical scopes and symbol resolution
//! - Compilation of expressions and statements
//! - Value encodings shared with the native runtime

pub mod compiler;
pub mod expr;
pub mod scope;
pub mod stmt;
pub mod types;
pub mod values;
