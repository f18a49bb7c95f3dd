//! Virtualization options
//!
//! Deserializable from the `[virtualize]` table of `shroud.toml`; every
//! field is optional and falls back to [`VirtualizeOptions::default`].

use serde::{Deserialize, Serialize};
use shroud_vm_compiler::CompileOptions;

use crate::error::{EngineError, EngineResult};

/// Knobs for one virtualization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizeOptions {
    /// Seed for every random choice; `None` draws from the OS
    pub seed: Option<u64>,

    /// Downgrade block-scoped declarations and classes instead of skipping
    /// the functions that use them
    pub downlevel: bool,

    /// Probability of a filler instruction after each real one
    pub fake_opcode_rate: f64,

    /// Ship instruction tapes as self-decoding bundles
    pub encode_bytecode: bool,

    /// Ship constant pools as self-decoding bundles
    pub encode_constants: bool,

    /// Ship the opcode table as a self-decoding bundle
    pub encode_opcode_table: bool,

    /// Names generated identifiers must never take (globals provided by the
    /// host page, for instance)
    pub reserved_names: Vec<String>,
}

impl Default for VirtualizeOptions {
    fn default() -> Self {
        Self {
            seed: None,
            downlevel: false,
            fake_opcode_rate: CompileOptions::default().fake_opcode_rate,
            encode_bytecode: true,
            encode_constants: true,
            encode_opcode_table: true,
            reserved_names: Vec::new(),
        }
    }
}

impl VirtualizeOptions {
    /// Options with a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Turn off every encoding layer (literal arrays in the output)
    pub fn without_encoding(mut self) -> Self {
        self.encode_bytecode = false;
        self.encode_constants = false;
        self.encode_opcode_table = false;
        self
    }

    /// Whether any artifact goes through the codec
    pub fn encodes_anything(&self) -> bool {
        self.encode_bytecode || self.encode_constants || self.encode_opcode_table
    }

    /// Reject values the compiler cannot use
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.fake_opcode_rate) {
            return Err(EngineError::invalid_option(format!(
                "fake_opcode_rate must be within [0, 1], got {}",
                self.fake_opcode_rate
            )));
        }
        Ok(())
    }

    /// Options handed to the bytecode compiler
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            downlevel: self.downlevel,
            fake_opcode_rate: self.fake_opcode_rate,
        }
    }
}
