//! Unit tests for error handling.

use crate::errors::errors::{ErrorTip, JitError};

#[test]
fn test_error_names() {
    let error = JitError::FunctionNotFound {
        name: "main".to_string(),
    };
    assert_eq!(error.get_error_name(), "FunctionNotFound");

    let error = JitError::InitFailed {
        result: 0,
        expected: 667,
    };
    assert_eq!(error.get_error_name(), "InitFailed");
}

#[test]
fn test_error_display() {
    let error = JitError::Runtime {
        message: "Division by zero".to_string(),
    };
    assert_eq!(error.to_string(), "runtime error: Division by zero");

    let error = JitError::InitFailed {
        result: 3,
        expected: 667,
    };
    assert_eq!(error.to_string(), "runtime init returned 3, expected 667");
}

#[test]
fn test_global_not_found_tip() {
    let error = JitError::GlobalNotFound {
        name: "counter".to_string(),
    };
    match error.get_tip() {
        ErrorTip::Suggestion(tip) => assert!(tip.contains("counter")),
        ErrorTip::None => panic!("Expected a suggestion"),
    }
}

#[test]
fn test_runtime_error_has_no_tip() {
    let error = JitError::Runtime {
        message: "Dict key not found".to_string(),
    };
    assert!(matches!(error.get_tip(), ErrorTip::None));
    assert_eq!(error.get_tip().to_string(), "");
}

#[test]
fn test_argument_mismatch() {
    let error = JitError::ArgumentMismatch {
        name: "f".to_string(),
        message: "expected 2 arguments, got 1".to_string(),
    };
    assert_eq!(error.get_error_name(), "ArgumentMismatch");
    assert_eq!(error.to_string(), "bad call to \"f\": expected 2 arguments, got 1");
    assert!(error.get_tip().to_string().contains("`f`"));
}
