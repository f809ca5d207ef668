//! # Embedder (C2)
//!
//! Produces a fixed-dimension vector from text. Exposes a semantic backend
//! (a dense sentence encoder) and a deterministic hash fallback, selected
//! once at process start and held for the process lifetime — the
//! "dynamic dispatch between native and fallback" pattern of `spec.md` §9.

mod hash;
#[cfg(feature = "semantic")]
mod semantic;

pub use hash::HashEmbedder;
#[cfg(feature = "semantic")]
pub use semantic::SemanticEmbedder;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Dimension of the hash-fallback backend — deliberately different from the
/// semantic backend's dimension so legacy rows are distinguishable by byte
/// length alone (`spec.md` §4.2).
pub const HASH_FALLBACK_DIM: usize = 64;

/// Converts text into a fixed-length embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`, returning a vector of [`Embedder::dim`] floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The dimension this embedder always produces.
    fn dim(&self) -> usize;

    /// Human-readable backend name for diagnostics.
    fn backend_name(&self) -> &'static str;
}

/// Which backend was selected, and why, for the current process.
pub struct EmbedderHandle {
    /// The live embedder.
    pub embedder: Box<dyn Embedder>,
    /// Set when the semantic backend was requested but failed to
    /// initialize and the hash fallback was installed instead.
    pub degraded: bool,
}

/// Select and initialize the embedder backend for this process
/// (`spec.md` §4.2's gating rule).
///
/// Initialization may block for up to `hook_timeout_ms` on first-time model
/// download; the caller is expected to run this inside the hook's overall
/// timeout budget.
pub async fn select_backend(cfg: &crate::config::Config) -> EmbedderHandle {
    if !cfg.semantic_embeddings || !cfg.onnx_enabled {
        return EmbedderHandle {
            embedder: Box::new(HashEmbedder::new(HASH_FALLBACK_DIM)),
            degraded: false,
        };
    }

    #[cfg(feature = "semantic")]
    {
        match semantic::SemanticEmbedder::load(&cfg.embedding_model, cfg.embedding_dim).await {
            Ok(embedder) => {
                return EmbedderHandle {
                    embedder: Box::new(embedder),
                    degraded: false,
                };
            }
            Err(err) => {
                tracing::warn!(error = %err, "semantic embedder failed to initialize, falling back to hash embedder");
            }
        }
    }

    #[cfg(not(feature = "semantic"))]
    {
        tracing::warn!("semantic feature not compiled in, using hash embedder");
    }

    EmbedderHandle {
        embedder: Box::new(HashEmbedder::new(HASH_FALLBACK_DIM)),
        degraded: true,
    }
}

/// Pack a float vector into little-endian bytes for storage.
#[must_use]
pub fn pack(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for f in embedding {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Unpack little-endian bytes back into a float vector.
#[must_use]
pub fn unpack(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Rewrite a file-edit event's content so clustering treats edits on the
/// same file as nearby regardless of path (`spec.md` §4.2).
#[must_use]
pub fn enrich_edit_content(path: &str) -> String {
    let basename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    format!("{basename}: edited {path}")
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 if
/// either vector is empty or lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let v = vec![0.1_f32, -2.5, 3.75];
        assert_eq!(unpack(&pack(&v)), v);
    }

    #[test]
    fn enrich_content_includes_basename() {
        let content = enrich_edit_content("src/deep/nested/lib.rs");
        assert!(content.contains("lib.rs"));
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
