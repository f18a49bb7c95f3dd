//! Randomized 64-symbol text encoding
//!
//! Three bytes pack into four 6-bit values like base64. The symbol for the
//! value `v` at text position `p` is `alphabet[((v + rot + p * step) & 63) ^ xor]`,
//! so equal ciphertext never yields equal text across runs.

use shroud_common::ObfuscationRng;

use crate::error::{CodecError, CodecResult};

/// Symbols the alphabet is drawn from (all valid in identifiers and strings)
pub const SYMBOL_POOL: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_$";

/// Alphabet and index transform of one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: [u8; 64],
    rot: u8,
    xor: u8,
    step: u8,
}

/// Length of the serialized parameter block
pub const PARAMS_LEN: usize = 7;

impl Alphabet {
    /// Draw a shuffled alphabet and transform parameters
    pub fn generate(rng: &mut ObfuscationRng) -> Self {
        let mut symbols = *SYMBOL_POOL;
        rng.shuffle(&mut symbols);
        Self {
            symbols,
            rot: rng.below(64) as u8,
            xor: rng.below(64) as u8,
            step: 1 + rng.below(63) as u8,
        }
    }

    /// Rebuild from the recovered alphabet and parameter block
    pub fn from_parts(symbols: &[u8], params: &[u8]) -> CodecResult<(Self, usize)> {
        let symbols: [u8; 64] = symbols
            .try_into()
            .map_err(|_| CodecError::corrupt("alphabet must hold 64 symbols"))?;
        let mut seen = [false; 256];
        for &s in &symbols {
            if seen[s as usize] {
                return Err(CodecError::corrupt("duplicate alphabet symbol"));
            }
            seen[s as usize] = true;
        }
        if params.len() != PARAMS_LEN {
            return Err(CodecError::corrupt("parameter block length"));
        }
        let byte_len = u32::from_le_bytes([params[3], params[4], params[5], params[6]]) as usize;
        let alphabet = Self {
            symbols,
            rot: params[0] & 63,
            xor: params[1] & 63,
            step: params[2] & 63,
        };
        Ok((alphabet, byte_len))
    }

    /// Symbols in alphabet order
    pub fn symbols(&self) -> &[u8; 64] {
        &self.symbols
    }

    /// Serialized `[rot, xor, step, byte_len (u32 LE)]`
    pub fn params(&self, byte_len: usize) -> Vec<u8> {
        let mut out = vec![self.rot, self.xor, self.step];
        out.extend_from_slice(&(byte_len as u32).to_le_bytes());
        out
    }

    fn symbol_for(&self, value: u8, position: usize) -> u8 {
        let shifted = (value as usize + self.rot as usize + position * self.step as usize) & 63;
        self.symbols[shifted ^ self.xor as usize]
    }

    /// Encode bytes; the output length is always a multiple of four
    pub fn encode(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
        let mut position = 0;
        for chunk in bytes.chunks(3) {
            let b0 = chunk[0];
            let b1 = chunk.get(1).copied().unwrap_or(0);
            let b2 = chunk.get(2).copied().unwrap_or(0);
            let values = [b0 >> 2, (b0 & 3) << 4 | b1 >> 4, (b1 & 15) << 2 | b2 >> 6, b2 & 63];
            for v in values {
                out.push(self.symbol_for(v, position) as char);
                position += 1;
            }
        }
        out
    }

    /// Decode text produced by [`Alphabet::encode`], keeping `byte_len` bytes
    pub fn decode(&self, text: &str, byte_len: usize) -> CodecResult<Vec<u8>> {
        let mut index = [u8::MAX; 256];
        for (i, &s) in self.symbols.iter().enumerate() {
            index[s as usize] = i as u8;
        }
        let mut values = Vec::with_capacity(text.len());
        for (position, c) in text.chars().enumerate() {
            let code = c as u32;
            let slot = if code < 256 { index[code as usize] } else { u8::MAX };
            if slot == u8::MAX {
                return Err(CodecError::InvalidSymbol(c));
            }
            let shifted = (slot ^ self.xor) as usize;
            let v = shifted.wrapping_sub(self.rot as usize).wrapping_sub(position * self.step as usize) & 63;
            values.push(v as u8);
        }
        if values.len() % 4 != 0 {
            return Err(CodecError::malformed("encoded text is not a whole number of groups"));
        }
        let mut out = Vec::with_capacity(values.len() / 4 * 3);
        for group in values.chunks(4) {
            out.push(group[0] << 2 | group[1] >> 4);
            out.push((group[1] & 15) << 4 | group[2] >> 2);
            out.push((group[2] & 3) << 6 | group[3]);
        }
        if byte_len > out.len() {
            return Err(CodecError::malformed("encoded text shorter than recorded length"));
        }
        out.truncate(byte_len);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_bytes_encode_differently_per_alphabet() {
        let data = [0u8; 12];
        let a = Alphabet::generate(&mut ObfuscationRng::from_seed(1)).encode(&data);
        let b = Alphabet::generate(&mut ObfuscationRng::from_seed(2)).encode(&data);
        assert_ne!(a, b);
    }

    #[test]
    fn test_foreign_symbol_is_rejected() {
        let alphabet = Alphabet::generate(&mut ObfuscationRng::from_seed(3));
        assert_eq!(alphabet.decode("AB-C", 3), Err(CodecError::InvalidSymbol('-')));
    }

    #[test]
    fn test_params_round_trip() {
        let alphabet = Alphabet::generate(&mut ObfuscationRng::from_seed(4));
        let (back, len) = Alphabet::from_parts(alphabet.symbols(), &alphabet.params(1234)).unwrap();
        assert_eq!(back, alphabet);
        assert_eq!(len, 1234);
    }

    proptest! {
        #[test]
        fn test_decode_inverts_encode(bytes in prop::collection::vec(any::<u8>(), 0..200), seed in any::<u64>()) {
            let alphabet = Alphabet::generate(&mut ObfuscationRng::from_seed(seed));
            let text = alphabet.encode(&bytes);
            prop_assert_eq!(alphabet.decode(&text, bytes.len()).unwrap(), bytes);
        }
    }
}
