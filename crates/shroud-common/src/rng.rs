//! Seedable randomness for obfuscation decisions.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministic random source used by every obfuscation step.
///
/// Wraps a ChaCha20 stream so that a given seed always yields the same
/// opcode permutation, fake instructions, keys and shard layouts.
#[derive(Debug, Clone)]
pub struct ObfuscationRng {
    inner: ChaCha20Rng,
}

impl ObfuscationRng {
    /// Create a generator from a fixed seed
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Create a generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self {
            inner: ChaCha20Rng::from_entropy(),
        }
    }

    /// Uniform integer in `lo..=hi`
    pub fn int_in(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.inner.gen_range(lo..=hi)
    }

    /// Uniform index in `0..n` (returns 0 when `n == 0`)
    pub fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.inner.gen_range(0..n)
    }

    /// Bernoulli trial with success probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.inner.gen_bool(p)
    }

    /// Shuffle a slice in place
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }

    /// A random permutation of `0..n`
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..n).collect();
        self.shuffle(&mut perm);
        perm
    }

    /// `n` random bytes
    pub fn bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.inner.fill_bytes(&mut out);
        out
    }

    /// A random byte
    pub fn byte(&mut self) -> u8 {
        (self.inner.next_u32() & 0xff) as u8
    }

    /// A random 32-bit word
    pub fn word(&mut self) -> u32 {
        self.inner.next_u32()
    }

    /// Derive an independent child generator
    pub fn fork(&mut self) -> Self {
        Self::from_seed(self.inner.next_u64())
    }
}
