use std::fmt::Display;

use thiserror::Error;

pub type JitResult<T> = Result<T, JitError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JitError {
    #[error("failed to create execution engine: {message}")]
    EngineCreation { message: String },
    #[error("function {name:?} not found")]
    FunctionNotFound { name: String },
    #[error("global {name:?} not found")]
    GlobalNotFound { name: String },
    #[error("global {name:?} has type {actual}, expected {expected}")]
    GlobalTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("runtime init returned {result}, expected {expected}")]
    InitFailed { result: i64, expected: i64 },
    #[error("runtime error: {message}")]
    Runtime { message: String },
    #[error("bad call to {name:?}: {message}")]
    ArgumentMismatch { name: String, message: String },
    #[error("cannot call {name:?} from Rust: {message}")]
    UnsupportedSignature { name: String, message: String },
}

impl JitError {
    pub fn get_error_name(&self) -> &str {
        match self {
            JitError::EngineCreation { .. } => "EngineCreation",
            JitError::FunctionNotFound { .. } => "FunctionNotFound",
            JitError::GlobalNotFound { .. } => "GlobalNotFound",
            JitError::GlobalTypeMismatch { .. } => "GlobalTypeMismatch",
            JitError::InitFailed { .. } => "InitFailed",
            JitError::Runtime { .. } => "Runtime",
            JitError::ArgumentMismatch { .. } => "ArgumentMismatch",
            JitError::UnsupportedSignature { .. } => "UnsupportedSignature",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match self {
            JitError::EngineCreation { .. } => ErrorTip::Suggestion(String::from(
                "Is the native target available to LLVM?",
            )),
            JitError::FunctionNotFound { name } => ErrorTip::Suggestion(format!(
                "Function `{}` is not defined in the module, or was declared but never resolved",
                name
            )),
            JitError::GlobalNotFound { name } => {
                ErrorTip::Suggestion(format!("No top-level symbol named `{}`", name))
            }
            JitError::GlobalTypeMismatch { name, expected, .. } => ErrorTip::Suggestion(format!(
                "Read `{}` with the accessor for `{}`",
                name, expected
            )),
            JitError::InitFailed { .. } => ErrorTip::Suggestion(String::from(
                "Global initialization did not run to completion",
            )),
            JitError::Runtime { .. } => ErrorTip::None,
            JitError::ArgumentMismatch { name, .. } => ErrorTip::Suggestion(format!(
                "Check the arguments against the Floyd signature of `{}`",
                name
            )),
            JitError::UnsupportedSignature { .. } => ErrorTip::Suggestion(String::from(
                "Call the function through `get_function` with an explicit signature",
            )),
        }
    }
}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}
