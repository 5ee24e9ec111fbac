//! Service error taxonomy.
//!
//! Every externally triggered operation converts internal failures into one
//! of these three kinds before crossing the service boundary, so callers can
//! tell "fix your request" from "retry later" from "opaque store failure".

use thiserror::Error;

/// Classified failure of a service operation
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Missing or malformed caller-supplied parameter; the store was never
    /// touched and the caller can correct the input.
    #[error("{0}")]
    Validation(String),
    /// Store unreachable or not yet connected; the caller may retry.
    #[error("{0}")]
    Connection(String),
    /// Any other store-level failure, including partial operation failures.
    #[error("{0}")]
    Database(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Wire name of this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Connection(_) => "connection_error",
            Self::Database(_) => "database_error",
        }
    }
}
