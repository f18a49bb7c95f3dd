//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while decoding or checking a tape
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Word does not decode to any opcode
    #[error("Invalid opcode word {word} at offset {offset}")]
    InvalidOpcode {
        /// Raw word
        word: u32,
        /// Tape offset
        offset: usize,
    },

    /// Instruction runs past the end of the tape
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Operand out of range (jump target, constant index, operator code)
    #[error("Invalid operand at offset {offset}: {reason}")]
    InvalidOperand {
        /// Tape offset of the instruction
        offset: usize,
        /// What was wrong
        reason: String,
    },

    /// Two control-flow paths reach an instruction with different depths
    #[error("Stack depth mismatch at offset {offset}: {first} vs {second}")]
    DepthMismatch {
        /// Tape offset
        offset: usize,
        /// Depth recorded first
        first: usize,
        /// Conflicting depth
        second: usize,
    },

    /// An instruction pops more than the stack holds
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),
}

impl BytecodeError {
    /// Create an invalid operand error
    pub fn invalid_operand(offset: usize, reason: impl Into<String>) -> Self {
        Self::InvalidOperand {
            offset,
            reason: reason.into(),
        }
    }
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
