//! # Shroud VM Compiler
//!
//! Lowers one JavaScript function at a time to the stack bytecode of
//! `shroud-vm-bytecode`.
//!
//! ## Pipeline
//!
//! 1. [`eligibility`]: reject functions the virtual machine cannot run
//! 2. [`normalize`]: lower parameters, patterns, `for-of` and block scopes
//!    into plain `var` code
//! 3. [`compiler`]: emit the tape, resolving names against the
//!    environment record and capturing closures through [`closure`]
//! 4. a static stack-balance check over the finished unit
//!
//! Any failure leaves the function untouched; callers treat
//! [`CompileError::Ineligible`] and [`CompileError::Unsupported`] as a
//! reason to skip, and [`CompileError::Internal`] as a bug.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod closure;
pub mod codegen;
pub mod compiler;
pub mod context;
pub mod eligibility;
pub mod error;
pub mod normalize;
pub mod scope;

pub use compiler::{CompiledFunction, compile_function};
pub use context::{CompileContext, CompileOptions, EnvSlots};
pub use eligibility::{can_virtualize, check_eligibility};
pub use error::{CompileError, CompileResult};
pub use scope::LocalSet;
