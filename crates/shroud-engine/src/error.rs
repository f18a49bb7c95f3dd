//! Error types for shroud-engine

use shroud_codec::CodecError;
use shroud_vm_compiler::CompileError;
use shroud_vm_core::VmError;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// A function could not be lowered
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Encoding or decoding an artifact failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Execution on the reference interpreter failed
    #[error("{0}")]
    Vm(#[from] VmError),

    /// Options out of range
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create an invalid-option error
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The thrown JavaScript value, when execution ended with an uncaught
    /// exception
    pub fn thrown(&self) -> Option<&shroud_vm_core::Value> {
        match self {
            Self::Vm(err) => err.thrown(),
            _ => None,
        }
    }
}

/// Result type using EngineError
pub type EngineResult<T> = Result<T, EngineError>;
