//! Shard splitting
//!
//! Encoded text is cut into runs of 12 to 42 symbols and shuffled. The order
//! needed to reassemble it is kept as bytes: for every original shard, the
//! stored position as a little-endian `u16`.

use shroud_common::ObfuscationRng;

use crate::error::{CodecError, CodecResult};

/// Shortest shard
pub const MIN_SHARD: usize = 12;
/// Longest shard
pub const MAX_SHARD: usize = 42;

/// Shuffled shards and the order bytes that reassemble them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sharded {
    /// Shards in stored order
    pub shards: Vec<String>,
    /// Stored position of each original shard, `u16` little endian
    pub order: Vec<u8>,
}

/// Split and shuffle `text`
pub fn split(text: &str, rng: &mut ObfuscationRng) -> CodecResult<Sharded> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let len = (rng.int_in(MIN_SHARD as i64, MAX_SHARD as i64) as usize).min(rest.len());
        let (head, tail) = rest.split_at(len);
        pieces.push(head.to_string());
        rest = tail;
    }
    if pieces.len() > u16::MAX as usize {
        return Err(CodecError::TooManyShards(pieces.len()));
    }

    // stored[i] = pieces[perm[i]]
    let perm = rng.permutation(pieces.len());
    let mut position = vec![0u16; pieces.len()];
    for (stored, &original) in perm.iter().enumerate() {
        position[original] = stored as u16;
    }
    let mut slots: Vec<Option<String>> = pieces.into_iter().map(Some).collect();
    let shards = perm.iter().filter_map(|&original| slots[original].take()).collect();
    let order = position.iter().flat_map(|p| p.to_le_bytes()).collect();
    Ok(Sharded { shards, order })
}

/// Reassemble the original text
pub fn join(shards: &[String], order: &[u8]) -> CodecResult<String> {
    if order.len() % 2 != 0 || order.len() / 2 != shards.len() {
        return Err(CodecError::corrupt("shard order length"));
    }
    let mut out = String::new();
    for pair in order.chunks(2) {
        let stored = u16::from_le_bytes([pair[0], pair[1]]) as usize;
        let shard = shards
            .get(stored)
            .ok_or_else(|| CodecError::corrupt("shard position out of range"))?;
        out.push_str(shard);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_join() {
        let text: String = std::iter::repeat("abcdefghij").take(40).collect();
        let mut rng = ObfuscationRng::from_seed(9);
        let sharded = split(&text, &mut rng).unwrap();
        assert!(sharded.shards.len() > 1);
        assert!(sharded.shards.iter().all(|s| s.len() <= MAX_SHARD));
        assert_eq!(join(&sharded.shards, &sharded.order).unwrap(), text);
    }

    #[test]
    fn test_empty_text_has_no_shards() {
        let sharded = split("", &mut ObfuscationRng::from_seed(1)).unwrap();
        assert!(sharded.shards.is_empty());
        assert_eq!(join(&sharded.shards, &sharded.order).unwrap(), "");
    }
}
