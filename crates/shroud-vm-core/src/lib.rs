//! # Shroud VM Core
//!
//! Reference interpreter for Shroud bytecode. It executes the same tapes
//! the emitted JavaScript runtime executes and is used to check that a
//! virtualized function behaves like the original.
//!
//! ## Overview
//!
//! - [`Value`] and [`JsObject`]: a compact object model (plain objects,
//!   arrays, functions, errors, promises) shared through `Arc`
//! - [`Realm`]: globals, intrinsics, conversions, operators and calls
//! - [`Frame`]: one activation of a bytecode function, with [`run`] and
//!   [`run_async`] as drivers
//! - [`ClosureFactory`]: the host hook that turns closure constants into
//!   callable values

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod convert;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod intrinsics;
pub mod object;
pub mod operators;
pub mod promise;
pub mod realm;
pub mod value;

pub use error::{ThrownValue, VmError, VmResult};
pub use function::{BytecodeFunction, ClosureFactory, Code, EnvKeys, FunctionTemplate, ScopeChain, empty_scope};
pub use interpreter::{Frame, InstructionResult, run, run_async};
pub use intrinsics::{Intrinsics, rest_helper};
pub use object::{FunctionKind, JsObject, NativeFn, NativeFunction, ObjectKind, PropertyKey};
pub use promise::{JsPromise, PromiseState};
pub use realm::{ErrorKind, MAX_CALL_DEPTH, Realm};
pub use value::{JsSymbol, Value};
