//! Secret bundles
//!
//! A byte sequence is permuted, then masked per position; the permutation
//! itself is stored masked with a single byte. No literal in the output
//! holds the original bytes.

use serde::{Deserialize, Serialize};
use shroud_common::ObfuscationRng;

use crate::error::{CodecError, CodecResult};

/// A concealed byte sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBundle {
    /// Permuted values, each XORed with `mask` at the same position
    pub masked: Vec<u8>,
    /// Per-position mask
    pub mask: Vec<u8>,
    /// Original index of each stored value, XORed with `order_mask`
    pub order: Vec<u32>,
    /// Mask applied to every `order` entry
    pub order_mask: u8,
}

impl SecretBundle {
    /// Conceal `values`
    pub fn conceal(values: &[u8], rng: &mut ObfuscationRng) -> Self {
        let perm = rng.permutation(values.len());
        let mask = rng.bytes(values.len());
        let order_mask = rng.byte();
        let masked = perm.iter().zip(&mask).map(|(&src, m)| values[src] ^ m).collect();
        let order = perm.iter().map(|&src| src as u32 ^ u32::from(order_mask)).collect();
        Self {
            masked,
            mask,
            order,
            order_mask,
        }
    }

    /// Recover the original sequence
    pub fn rebuild(&self) -> CodecResult<Vec<u8>> {
        let n = self.masked.len();
        if self.mask.len() != n || self.order.len() != n {
            return Err(CodecError::corrupt("length mismatch"));
        }
        let mut out = vec![0u8; n];
        let mut seen = vec![false; n];
        for i in 0..n {
            let index = (self.order[i] ^ u32::from(self.order_mask)) as usize;
            if index >= n || seen[index] {
                return Err(CodecError::corrupt("order is not a permutation"));
            }
            seen[index] = true;
            out[index] = self.masked[i] ^ self.mask[i];
        }
        Ok(out)
    }

    /// Number of concealed bytes
    pub fn len(&self) -> usize {
        self.masked.len()
    }

    /// Whether the bundle conceals nothing
    pub fn is_empty(&self) -> bool {
        self.masked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_round_trip() {
        let mut rng = ObfuscationRng::from_seed(1);
        let bundle = SecretBundle::conceal(&[], &mut rng);
        assert!(bundle.is_empty());
        assert_eq!(bundle.rebuild().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_tampered_order_is_rejected() {
        let mut rng = ObfuscationRng::from_seed(2);
        let mut bundle = SecretBundle::conceal(b"secret", &mut rng);
        bundle.order[0] = bundle.order[1];
        assert!(matches!(bundle.rebuild(), Err(CodecError::CorruptSecret(_))));
    }

    proptest! {
        #[test]
        fn test_rebuild_recovers_input(values in prop::collection::vec(any::<u8>(), 0..300), seed in any::<u64>()) {
            let mut rng = ObfuscationRng::from_seed(seed);
            let bundle = SecretBundle::conceal(&values, &mut rng);
            prop_assert_eq!(bundle.rebuild().unwrap(), values);
        }
    }
}
