//! Deterministic bag-of-words embedder.
//!
//! Hashes lowercase alphanumeric tokens into a fixed number of buckets. No model, no
//! network; texts sharing words get similar vectors. Used in tests and offline setups.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::retrieval::RetrievalError;

use super::Embedder;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h = DefaultHasher::new();
            token.to_lowercase().hash(&mut h);
            let bucket = (h.finish() % self.dimension as u64) as usize;
            v[bucket] += 1.0;
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
