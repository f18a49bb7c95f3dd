//! Memoized decoding

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::CodecResult;
use crate::payload::Payload;
use crate::wire::{WireBundle, decode};

/// Decoded payloads keyed by artifact id
///
/// Repeated lookups of the same id skip the cipher and alphabet passes.
#[derive(Debug, Default)]
pub struct DecodeCache {
    entries: Mutex<FxHashMap<u32, Arc<Payload>>>,
    misses: Mutex<usize>,
}

impl DecodeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bundle` unless `id` was decoded before
    pub fn get_or_decode(&self, id: u32, bundle: &WireBundle) -> CodecResult<Arc<Payload>> {
        if let Some(hit) = self.entries.lock().get(&id) {
            return Ok(Arc::clone(hit));
        }
        let payload = Arc::new(decode(bundle)?);
        *self.misses.lock() += 1;
        self.entries.lock().insert(id, Arc::clone(&payload));
        Ok(payload)
    }

    /// Number of decodes actually performed
    pub fn misses(&self) -> usize {
        *self.misses.lock()
    }

    /// Number of cached payloads
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been decoded yet
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode;
    use shroud_common::ObfuscationRng;

    #[test]
    fn test_second_lookup_is_a_hit() {
        let mut rng = ObfuscationRng::from_seed(4);
        let bundle = encode(&Payload::Code(vec![9, 8, 7]), &mut rng).unwrap();
        let cache = DecodeCache::new();
        let first = cache.get_or_decode(0, &bundle).unwrap();
        let second = cache.get_or_decode(0, &bundle).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }
}
