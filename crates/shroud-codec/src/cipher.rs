//! ChaCha20 keystream layer
//!
//! IETF ChaCha20 (20 rounds, 256-bit key, 96-bit nonce, block counter from
//! zero). The stored nonce is split in two halves and only becomes the real
//! nonce after XOR with a tweak derived from the key.

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use shroud_common::ObfuscationRng;

/// Key length in bytes
pub const KEY_LEN: usize = 32;
/// Length of one stored nonce half
pub const NONCE_HALF_LEN: usize = 6;

/// Key and stored nonce halves for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherKey {
    /// 256-bit key
    pub key: [u8; KEY_LEN],
    /// First stored nonce half
    pub nonce_lo: [u8; NONCE_HALF_LEN],
    /// Second stored nonce half
    pub nonce_hi: [u8; NONCE_HALF_LEN],
}

impl CipherKey {
    /// Draw a fresh key
    pub fn generate(rng: &mut ObfuscationRng) -> Self {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&rng.bytes(KEY_LEN));
        let mut nonce_lo = [0u8; NONCE_HALF_LEN];
        nonce_lo.copy_from_slice(&rng.bytes(NONCE_HALF_LEN));
        let mut nonce_hi = [0u8; NONCE_HALF_LEN];
        nonce_hi.copy_from_slice(&rng.bytes(NONCE_HALF_LEN));
        Self {
            key,
            nonce_lo,
            nonce_hi,
        }
    }

    /// Rebuild from recovered secrets
    pub fn from_parts(key: &[u8], nonce_lo: &[u8], nonce_hi: &[u8]) -> Option<Self> {
        Some(Self {
            key: key.try_into().ok()?,
            nonce_lo: nonce_lo.try_into().ok()?,
            nonce_hi: nonce_hi.try_into().ok()?,
        })
    }

    /// Effective nonce: stored halves XOR `key[i] ^ key[31 - i]`
    pub fn nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        for (i, byte) in nonce.iter_mut().enumerate() {
            let stored = if i < NONCE_HALF_LEN {
                self.nonce_lo[i]
            } else {
                self.nonce_hi[i - NONCE_HALF_LEN]
            };
            *byte = stored ^ self.key[i] ^ self.key[KEY_LEN - 1 - i];
        }
        nonce
    }

    /// XOR the keystream into `data`; applying twice restores it
    pub fn apply(&self, data: &mut [u8]) {
        let mut cipher = ChaCha20::new(&self.key.into(), &self.nonce().into());
        cipher.apply_keystream(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keystream_is_an_involution() {
        let mut rng = ObfuscationRng::from_seed(5);
        let key = CipherKey::generate(&mut rng);
        let plain = b"the quick brown fox jumps over the lazy dog, twice over and again".to_vec();
        let mut data = plain.clone();
        key.apply(&mut data);
        assert_ne!(data, plain);
        key.apply(&mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn test_rfc8439_block_one_keystream() {
        // RFC 8439 section 2.4.2 uses counter 1; skip the first block instead
        let key: Vec<u8> = (0u8..32).collect();
        let nonce = [0, 0, 0, 0, 0, 0, 0, 0x4a, 0, 0, 0, 0];
        let mut lo = [0u8; 6];
        let mut hi = [0u8; 6];
        for i in 0..12 {
            let stored = nonce[i] ^ key[i] ^ key[31 - i];
            if i < 6 {
                lo[i] = stored;
            } else {
                hi[i - 6] = stored;
            }
        }
        let cipher = CipherKey::from_parts(&key, &lo, &hi).unwrap();
        assert_eq!(cipher.nonce(), nonce);
        let mut data = vec![0u8; 80];
        cipher.apply(&mut data);
        // keystream of block 1 starts 0x224f51f3...
        assert_eq!(&data[64..68], &[0x22, 0x4f, 0x51, 0xf3]);
    }
}
