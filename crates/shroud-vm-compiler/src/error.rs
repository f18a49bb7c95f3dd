//! Compilation errors

use thiserror::Error;

/// Compilation errors
///
/// `Ineligible` and `Unsupported` are expected outcomes: the caller keeps
/// the original function. `Internal` means a broken invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The eligibility gate rejected the function
    #[error("Not eligible: {0}")]
    Ineligible(String),

    /// A construct the compiler cannot lower
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create an ineligibility error
    pub fn ineligible(reason: impl Into<String>) -> Self {
        Self::Ineligible(reason.into())
    }

    /// Create an unsupported error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this is an internal invariant violation rather than a
    /// normal "cannot virtualize" outcome
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
