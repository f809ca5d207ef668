//! Deterministic feature-hash embedder, used whenever the semantic backend
//! is disabled or unavailable (`spec.md` §4.2).

use super::Embedder;
use crate::error::Result;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};

/// Hashes overlapping word shingles into a fixed-length, L2-normalized
/// vector. Deterministic: the same text always maps to the same vector.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// Build a hash embedder producing `dim`-length vectors.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn hash_token(token: &str, dim: usize) -> (usize, f32) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        let h = hasher.finish();
        let bucket = (h as usize) % dim;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vec = vec![0.0_f32; self.dim];
        let lower = text.to_lowercase();
        for token in lower.split_whitespace() {
            let (bucket, sign) = Self::hash_token(token, self.dim);
            vec[bucket] += sign;
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        Ok(vec)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn backend_name(&self) -> &'static str {
        "hash-fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeds_to_configured_dimension() {
        let e = HashEmbedder::new(64);
        let v = e.embed("fn main() {}").await.unwrap();
        assert_eq!(v.len(), 64);
    }

    #[tokio::test]
    async fn is_deterministic() {
        let e = HashEmbedder::new(64);
        let a = e.embed("same text").await.unwrap();
        let b = e.embed("same text").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn differs_for_different_text() {
        let e = HashEmbedder::new(64);
        let a = e.embed("alpha").await.unwrap();
        let b = e.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }
}
