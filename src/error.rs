//! Error types for the learned index.
//!
//! Errors carry a coarse code plus a human readable message. Recoverable
//! situations (empty buckets, degenerate partitions) are not errors and are
//! absorbed by the components that encounter them.

use std::fmt;
use thiserror::Error;

/// Error codes for index operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid argument provided (bad shape, zero k, unsupported level count).
    InvalidArgument,
    /// A model or index was used before training finished.
    NotTrained,
    /// Failed precondition other than training state.
    FailedPrecondition,
    /// Operation out of range.
    OutOfRange,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::NotTrained => write!(f, "NOT_TRAINED"),
            ErrorCode::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
            ErrorCode::OutOfRange => write!(f, "OUT_OF_RANGE"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Main error type for learned index operations.
#[derive(Error, Debug, Clone)]
pub struct IndexError {
    code: ErrorCode,
    message: String,
}

impl IndexError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if the error reports use of an untrained model or index.
    pub fn is_not_trained(&self) -> bool {
        self.code == ErrorCode::NotTrained
    }

    // Convenience constructors

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, msg)
    }

    /// Create a not trained error.
    pub fn not_trained(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotTrained, msg)
    }

    /// Create a failed precondition error.
    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, msg)
    }

    /// Create an out of range error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutOfRange, msg)
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_argument(format!("malformed configuration: {err}"))
    }
}

/// Result type alias for learned index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
