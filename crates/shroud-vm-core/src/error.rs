//! VM error types

use thiserror::Error;

use crate::value::Value;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., calling non-function)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (unresolvable global)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (e.g., invalid array length)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Thrown JS exception
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),

    /// Tape word that does not decode under the opcode mapping
    #[error("Invalid opcode word {word} at offset {offset}")]
    InvalidOpcode {
        /// Raw word
        word: u32,
        /// Tape offset
        offset: usize,
    },

    /// An instruction popped an empty operand stack
    #[error("Operand stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// `AWAIT` reached by the synchronous interpreter
    #[error("AWAIT executed by the synchronous interpreter at offset {0}")]
    AwaitInSync(usize),

    /// Bytecode error
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] shroud_vm_bytecode::BytecodeError),
}

/// A thrown JavaScript value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a reference error
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create an exception from a thrown JS value
    pub fn exception(value: Value) -> Self {
        let message = value.display_string();
        Self::Exception(Box::new(ThrownValue { value, message }))
    }

    /// Whether script code may catch this error
    ///
    /// Faults in the tape itself end the whole interpretation.
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            Self::TypeError(_) | Self::ReferenceError(_) | Self::RangeError(_) | Self::Exception(_)
        )
    }

    /// The thrown value, when this is an exception
    pub fn thrown(&self) -> Option<&Value> {
        match self {
            Self::Exception(thrown) => Some(&thrown.value),
            _ => None,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;
