//! # Shroud Codec
//!
//! Layered encoding for the artifacts of virtualized functions: instruction
//! tapes, constant pools and the opcode table.
//!
//! ## Pipeline
//!
//! 1. [`Payload::to_bytes`] serializes the artifact
//! 2. [`CipherKey`] XORs a ChaCha20 keystream over the bytes
//! 3. [`Alphabet`] turns bytes into text over a shuffled 64-symbol alphabet
//! 4. [`shard::split`] cuts the text into shuffled shards
//! 5. every secret is hidden in a [`SecretBundle`] and rebuilt at run time
//!    by a per-artifact [`BootstrapProgram`]
//!
//! [`decode`] reverses all of it, [`DecodeCache`] memoizes it, and
//! [`emit`] produces the JavaScript that performs the same steps in the
//! protected output.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod alphabet;
pub mod bootstrap;
pub mod cache;
pub mod cipher;
pub mod emit;
pub mod error;
pub mod payload;
pub mod secret;
pub mod shard;
pub mod wire;

pub use alphabet::Alphabet;
pub use bootstrap::{BootstrapProgram, SecretRole};
pub use cache::DecodeCache;
pub use cipher::CipherKey;
pub use emit::{CodecNames, bundle_call, decoder_source};
pub use error::{CodecError, CodecResult};
pub use payload::{ArtifactKind, Payload};
pub use secret::SecretBundle;
pub use wire::{WireBundle, decode, encode};
