//! Per-run opcode permutation

use serde::{Deserialize, Serialize};
use shroud_common::ObfuscationRng;

use crate::opcode::{OP_COUNT, Opcode};

/// Random bijection between logical opcodes and the words stored on a tape.
///
/// One mapping is chosen per obfuscation run and shared by every function
/// virtualized in that run and by the embedded runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeMap {
    /// logical opcode → permuted index
    encode: [u8; OP_COUNT],
    /// permuted index → logical opcode (inverse of `encode`)
    decode: [u8; OP_COUNT],
    /// XOR mask applied to every stored opcode word
    mask: u8,
}

impl OpcodeMap {
    /// Generate a random mapping
    pub fn from_rng(rng: &mut ObfuscationRng) -> Self {
        let perm = rng.permutation(OP_COUNT);
        let mut encode = [0u8; OP_COUNT];
        let mut decode = [0u8; OP_COUNT];
        for (logical, &permuted) in perm.iter().enumerate() {
            encode[logical] = permuted as u8;
            decode[permuted] = logical as u8;
        }
        Self {
            encode,
            decode,
            mask: rng.byte(),
        }
    }

    /// The identity mapping with no mask (useful when inspecting tapes)
    pub fn identity() -> Self {
        let mut table = [0u8; OP_COUNT];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self {
            encode: table,
            decode: table,
            mask: 0,
        }
    }

    /// Rebuild a mapping from a decode table and mask
    pub fn from_decode_table(decode: &[u8], mask: u8) -> Option<Self> {
        if decode.len() != OP_COUNT {
            return None;
        }
        let mut encode = [u8::MAX; OP_COUNT];
        let mut table = [0u8; OP_COUNT];
        for (permuted, &logical) in decode.iter().enumerate() {
            let slot = encode.get_mut(logical as usize)?;
            if *slot != u8::MAX {
                return None;
            }
            *slot = permuted as u8;
            table[permuted] = logical;
        }
        Some(Self {
            encode,
            decode: table,
            mask,
        })
    }

    /// Tape word for a logical opcode
    #[inline]
    pub fn encode_op(&self, op: Opcode) -> u32 {
        (self.encode[op.index() as usize] ^ self.mask) as u32
    }

    /// Logical opcode for a tape word
    #[inline]
    pub fn decode_word(&self, word: u32) -> Option<Opcode> {
        if word > u8::MAX as u32 {
            return None;
        }
        let permuted = (word as u8 ^ self.mask) as usize;
        self.decode
            .get(permuted)
            .and_then(|&logical| Opcode::from_index(logical))
    }

    /// Permuted index → logical opcode table
    pub fn decode_table(&self) -> &[u8; OP_COUNT] {
        &self.decode
    }

    /// Logical opcode → permuted index table
    pub fn encode_table(&self) -> &[u8; OP_COUNT] {
        &self.encode
    }

    /// XOR mask
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Whether `encode` is a permutation of `0..OP_COUNT` with `decode` its inverse
    pub fn is_bijection(&self) -> bool {
        let mut seen = [false; OP_COUNT];
        for (logical, &permuted) in self.encode.iter().enumerate() {
            let p = permuted as usize;
            if p >= OP_COUNT || seen[p] || self.decode[p] as usize != logical {
                return false;
            }
            seen[p] = true;
        }
        true
    }
}
