//! Deterministic, in-process embedding for Cold Store similarity search.
//!
//! spec.md treats embedding generation as a private implementation detail
//! and only requires cache-friendly determinism. Rather than depend on a
//! network embedding service, Kaya hashes whitespace-tokenized, lowercased
//! words into a fixed-width bag-of-words vector and measures similarity
//! with cosine distance — cheap, deterministic, and fully testable offline.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Dimensionality of the hashed bag-of-words embedding.
const DIMENSIONS: usize = 256;

/// Default LRU cache size for repeated queries.
const DEFAULT_CACHE_SIZE: usize = 512;

pub type Embedding = Vec<f32>;

/// Hashes `text` into a deterministic `DIMENSIONS`-wide bag-of-words vector,
/// L2-normalized so cosine similarity reduces to a dot product.
pub fn embed(text: &str) -> Embedding {
    let mut vector = vec![0f32; DIMENSIONS];
    for word in text.split_whitespace() {
        let word = word.to_lowercase();
        let bucket = (fnv1a(&word) as usize) % DIMENSIONS;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for a
/// zero vector on either side rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

/// Memoizes [`embed`] so that warm, repeated queries skip re-hashing —
/// spec.md's "sub-millisecond for ≥70% of warm calls" budget.
pub struct Embedder {
    cache: Mutex<LruCache<String, Embedding>>,
}

impl Embedder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn embed(&self, text: &str) -> Embedding {
        let mut cache = self.cache.lock().unwrap();
        if let Some(cached) = cache.get(text) {
            return cached.clone();
        }
        let vector = embed(text);
        cache.put(text.to_string(), vector.clone());
        vector
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_embeds_identically() {
        assert_eq!(embed("timeout waiting for element"), embed("timeout waiting for element"));
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated_text() {
        let query = embed("flaky login test timeout");
        let similar = embed("login test timed out flaky");
        let unrelated = embed("unrelated changelog entry about css");
        assert!(cosine_similarity(&query, &similar) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn cache_returns_same_vector_as_direct_embed() {
        let embedder = Embedder::new();
        let cached = embedder.embed("retry budget exceeded");
        let direct = embed("retry budget exceeded");
        assert_eq!(cached, direct);
    }

    #[test]
    fn cosine_similarity_of_zero_vector_is_zero() {
        let zero = vec![0f32; DIMENSIONS];
        let other = embed("anything");
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
    }
}
