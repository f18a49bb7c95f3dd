//! Shared collaborators for the Shroud obfuscation passes.
//!
//! Every random decision made while protecting a program is routed through
//! [`ObfuscationRng`], so a fixed seed reproduces the exact same output.
//! Synthetic identifiers come from a [`NameGenerator`] that never collides
//! with names already present in the program.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod names;
pub mod rng;

pub use names::NameGenerator;
pub use rng::ObfuscationRng;
