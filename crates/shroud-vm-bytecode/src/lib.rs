//! # Shroud VM Bytecode
//!
//! Bytecode format for functions lowered by the Shroud virtualizer.
//!
//! ## Design Principles
//!
//! - **Stack-based**: every expression pushes exactly one value
//! - **Flat**: a tape of `u32` words, `[encoded opcode, operands...]`
//! - **Per-run encoding**: logical opcodes are permuted and masked by an
//!   [`OpcodeMap`] chosen once per obfuscation run
//! - **Serializable**: units round-trip through `serde`

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constant;
pub mod error;
pub mod mapping;
pub mod opcode;
pub mod operator;
pub mod unit;
pub mod verify;

pub use constant::{ClosureSource, Constant, ConstantPool};
pub use error::{BytecodeError, Result};
pub use mapping::OpcodeMap;
pub use opcode::{NO_TARGET, OP_COUNT, Opcode};
pub use operator::{BinaryOperator, GlobalMode, UnaryOperator};
pub use unit::{CompiledUnit, DecodedInstruction};
pub use verify::{StackReport, verify_stack};
