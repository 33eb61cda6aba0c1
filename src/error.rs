//! Shared error-code contract.
//!
//! Every module error enum implements [`ErrorCode`] so callers can log a
//! grepable code and decide whether an operation is worth repeating without
//! matching on concrete variants.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
