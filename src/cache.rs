use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

use crate::normalize::{NormalizedScript, Normalizer};

const DEFAULT_CAPACITY: usize = 32;

/// In-memory memo of normalization results keyed by a hash of the raw
/// source, so re-submitting identical text skips the pipeline.
#[derive(Debug)]
pub struct NormalizationCache {
    capacity: usize,
    entries: HashMap<String, NormalizedScript>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl Default for NormalizationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NormalizationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, source: &str) -> Option<&NormalizedScript> {
        self.entries.get(&Self::compute_hash(source))
    }

    pub fn get_or_normalize(&mut self, normalizer: &Normalizer, source: &str) -> NormalizedScript {
        let hash = Self::compute_hash(source);
        if let Some(script) = self.entries.get(&hash) {
            self.hits += 1;
            return script.clone();
        }

        self.misses += 1;
        let script = normalizer.run(source);
        self.insert(hash, script.clone());
        script
    }

    fn insert(&mut self, hash: String, script: NormalizedScript) {
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(hash.clone());
        self.entries.insert(hash, script);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_source_hits() {
        let normalizer = Normalizer::default();
        let mut cache = NormalizationCache::default();
        let src = "export default function A() { return <p /> }";

        let first = cache.get_or_normalize(&normalizer, src);
        let second = cache.get_or_normalize(&normalizer, src);

        assert_eq!(first, second);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_oldest_entry_evicted() {
        let normalizer = Normalizer::default();
        let mut cache = NormalizationCache::new(2);
        cache.get_or_normalize(&normalizer, "a");
        cache.get_or_normalize(&normalizer, "b");
        cache.get_or_normalize(&normalizer, "c");

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = NormalizationCache::compute_hash("");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
