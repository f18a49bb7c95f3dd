//! Bootstrap mini-VM
//!
//! Every artifact carries a tiny program that rebuilds its own secrets. It
//! has four instructions and per-artifact opcode numbers, slot numbers, pool
//! order and instruction order:
//!
//! | instruction | operand | effect |
//! |---|---|---|
//! | `PUSH` | pool index | push `pool[i]` |
//! | `REBUILD_SECRET` | - | pop masked, mask, order, order mask; push bytes |
//! | `TO_STRING` | - | pop bytes, push text |
//! | `STORE` | slot | pop into `slots[s]` |

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shroud_common::ObfuscationRng;

use crate::error::{CodecError, CodecResult};
use crate::secret::SecretBundle;

/// The four bootstrap operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOp {
    /// Push a pool array
    Push,
    /// Rebuild a secret bundle from four arrays
    RebuildSecret,
    /// Turn bytes into text
    ToString,
    /// Store into a slot
    Store,
}

/// Secrets every artifact needs, in the order their slots are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretRole {
    /// Cipher key
    Key,
    /// First nonce half
    NonceLo,
    /// Second nonce half
    NonceHi,
    /// Alphabet symbols (stored as text)
    Alphabet,
    /// `[rot, xor, step, byte length]`
    Params,
    /// Shard order
    Order,
}

impl SecretRole {
    /// All roles in slot-list order
    pub const ALL: [SecretRole; 6] = [
        SecretRole::Key,
        SecretRole::NonceLo,
        SecretRole::NonceHi,
        SecretRole::Alphabet,
        SecretRole::Params,
        SecretRole::Order,
    ];

    fn as_text(self) -> bool {
        self == SecretRole::Alphabet
    }
}

/// A bootstrap program with its data pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapProgram {
    /// Opcode numbers for `[PUSH, REBUILD_SECRET, TO_STRING, STORE]`
    pub ops: [u32; 4],
    /// Instruction words
    pub program: Vec<u32>,
    /// Arrays referenced by `PUSH`
    pub pool: Vec<Vec<u32>>,
    /// Slot number of each [`SecretRole`], in [`SecretRole::ALL`] order
    pub slots: [u32; 6],
}

/// Value on the bootstrap stack or in a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootValue {
    /// Pool array
    Array(Vec<u32>),
    /// Rebuilt bytes
    Bytes(Vec<u8>),
    /// Text from `TO_STRING`
    Text(String),
}

impl BootValue {
    /// Bytes of a rebuilt secret (text is returned as its char codes)
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            BootValue::Array(words) => words.into_iter().map(|w| w as u8).collect(),
            BootValue::Bytes(bytes) => bytes,
            BootValue::Text(text) => text.chars().map(|c| c as u32 as u8).collect(),
        }
    }
}

impl BootstrapProgram {
    /// Build a program that rebuilds `secrets`, which must cover every role
    pub fn assemble(secrets: &[(SecretRole, SecretBundle)], rng: &mut ObfuscationRng) -> Self {
        let codes = rng.permutation(256);
        let ops = [codes[0] as u32, codes[1] as u32, codes[2] as u32, codes[3] as u32];
        let slot_numbers = rng.permutation(64);
        let mut slots = [0u32; 6];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = slot_numbers[i] as u32;
        }

        let mut arrays: Vec<Vec<u32>> = Vec::with_capacity(secrets.len() * 4);
        for (_, bundle) in secrets {
            arrays.push(bundle.masked.iter().map(|&b| u32::from(b)).collect());
            arrays.push(bundle.mask.iter().map(|&b| u32::from(b)).collect());
            arrays.push(bundle.order.clone());
            arrays.push(vec![u32::from(bundle.order_mask)]);
        }
        // pool[i] = arrays[perm[i]]; pool_index[j] locates arrays[j]
        let perm = rng.permutation(arrays.len());
        let mut pool_index = vec![0u32; arrays.len()];
        for (stored, &original) in perm.iter().enumerate() {
            pool_index[original] = stored as u32;
        }
        let mut taken: Vec<Option<Vec<u32>>> = arrays.into_iter().map(Some).collect();
        let pool = perm.iter().filter_map(|&original| taken[original].take()).collect();

        let mut sequence: Vec<usize> = (0..secrets.len()).collect();
        rng.shuffle(&mut sequence);
        let mut program = Vec::new();
        for i in sequence {
            let role = secrets[i].0;
            for part in 0..4 {
                program.push(ops[0]);
                program.push(pool_index[i * 4 + part]);
            }
            program.push(ops[1]);
            if role.as_text() {
                program.push(ops[2]);
            }
            program.push(ops[3]);
            program.push(slots[role_index(role)]);
        }
        Self {
            ops,
            program,
            pool,
            slots,
        }
    }

    fn decode_op(&self, word: u32) -> Option<BootOp> {
        match self.ops.iter().position(|&op| op == word)? {
            0 => Some(BootOp::Push),
            1 => Some(BootOp::RebuildSecret),
            2 => Some(BootOp::ToString),
            _ => Some(BootOp::Store),
        }
    }

    /// Run the program and return the filled slots
    pub fn run(&self) -> CodecResult<FxHashMap<u32, BootValue>> {
        let mut stack: Vec<BootValue> = Vec::new();
        let mut slots = FxHashMap::default();
        let mut ip = 0;
        while ip < self.program.len() {
            let offset = ip;
            let word = self.program[ip];
            ip += 1;
            let op = self
                .decode_op(word)
                .ok_or_else(|| CodecError::bootstrap(offset, "unknown instruction"))?;
            match op {
                BootOp::Push => {
                    let index = *self
                        .program
                        .get(ip)
                        .ok_or_else(|| CodecError::bootstrap(offset, "missing operand"))?;
                    ip += 1;
                    let array = self
                        .pool
                        .get(index as usize)
                        .ok_or_else(|| CodecError::bootstrap(offset, "pool index out of range"))?;
                    stack.push(BootValue::Array(array.clone()));
                }
                BootOp::RebuildSecret => {
                    let order_mask = pop_array(&mut stack, offset)?;
                    let order = pop_array(&mut stack, offset)?;
                    let mask = pop_array(&mut stack, offset)?;
                    let masked = pop_array(&mut stack, offset)?;
                    let bundle = SecretBundle {
                        masked: masked.iter().map(|&w| w as u8).collect(),
                        mask: mask.iter().map(|&w| w as u8).collect(),
                        order,
                        order_mask: order_mask.first().copied().unwrap_or(0) as u8,
                    };
                    stack.push(BootValue::Bytes(bundle.rebuild()?));
                }
                BootOp::ToString => {
                    let bytes = stack
                        .pop()
                        .ok_or_else(|| CodecError::bootstrap(offset, "stack underflow"))?
                        .into_bytes();
                    stack.push(BootValue::Text(bytes.into_iter().map(char::from).collect()));
                }
                BootOp::Store => {
                    let slot = *self
                        .program
                        .get(ip)
                        .ok_or_else(|| CodecError::bootstrap(offset, "missing operand"))?;
                    ip += 1;
                    let value = stack
                        .pop()
                        .ok_or_else(|| CodecError::bootstrap(offset, "stack underflow"))?;
                    slots.insert(slot, value);
                }
            }
        }
        Ok(slots)
    }

    /// Run the program and pick out the bytes of each role
    pub fn secrets(&self) -> CodecResult<FxHashMap<SecretRole, Vec<u8>>> {
        let mut slots = self.run()?;
        let mut out = FxHashMap::default();
        for role in SecretRole::ALL {
            let value = slots
                .remove(&self.slots[role_index(role)])
                .ok_or_else(|| CodecError::corrupt(format!("{:?} was never stored", role)))?;
            out.insert(role, value.into_bytes());
        }
        Ok(out)
    }
}

fn pop_array(stack: &mut Vec<BootValue>, offset: usize) -> CodecResult<Vec<u32>> {
    match stack.pop() {
        Some(BootValue::Array(words)) => Ok(words),
        Some(_) => Err(CodecError::bootstrap(offset, "secret part is not an array")),
        None => Err(CodecError::bootstrap(offset, "stack underflow")),
    }
}

fn role_index(role: SecretRole) -> usize {
    SecretRole::ALL.iter().position(|r| *r == role).unwrap_or(0)
}
