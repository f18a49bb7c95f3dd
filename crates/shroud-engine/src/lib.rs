//! Shroud virtualization engine.
//!
//! This crate rewrites eligible functions of a JavaScript program so their
//! bodies run as encoded bytecode on an interpreter embedded in the output.
//!
//! # Features
//!
//! - **Virtualization pass**: outer-first walk with per-function fallback
//! - **Per-run context**: one opcode mapping, random source and name
//!   generator per run, never shared between runs
//! - **Emitted runtime**: a single JavaScript interpreter inserted per program
//! - **Encoding**: tapes, constant pools and the opcode table shipped as
//!   self-decoding bundles
//! - **Harness**: runs virtualized functions on the reference interpreter
//!
//! # Example
//!
//! ```no_run
//! use shroud_engine::{VirtualizeOptions, Virtualizer};
//! use shroud_engine::ast::{Program, print_program};
//!
//! fn protect(mut program: Program) -> Result<String, Box<dyn std::error::Error>> {
//!     let mut virtualizer = Virtualizer::new(VirtualizeOptions::seeded(42))?;
//!     let report = virtualizer.run(&mut program)?;
//!     for skipped in &report.skipped {
//!         eprintln!("kept {}: {}", skipped.name, skipped.reason);
//!     }
//!     Ok(print_program(&program))
//! }
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod context;
pub mod disasm;
pub mod error;
pub mod harness;
pub mod options;
pub mod runtime;
pub mod virtualize;

pub use context::VirtualizeContext;
pub use disasm::{FunctionListing, disassemble_program};
pub use error::{EngineError, EngineResult};
pub use harness::{Harness, HarnessFactory};
pub use options::VirtualizeOptions;
pub use runtime::{RuntimeFeatures, RuntimeNames, runtime_source};
pub use virtualize::{SkippedFunction, VirtualizeReport, Virtualizer, virtualize};

// Re-export the syntax tree and the interpreter's value type for convenience
pub use shroud_ast as ast;
pub use shroud_vm_core::Value;
