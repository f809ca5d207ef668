//! # SonaCompressor (C6)
//!
//! Stores compressed pattern blobs keyed by layer, bridging
//! `neural_patterns` into `compressed_patterns` (`spec.md` §4.6). Grounded
//! in the pack's `hnsw_rs` usage (`other_examples/manifests/draco28-PulseDB`)
//! for the native backend and in the teacher's
//! `memory-storage-turso` fallback-table-write idiom for the degraded path.

use crate::embeddings::pack;
use crate::error::Result;
use crate::rl::synth_embedding_bytes;
use crate::store::Store;
use crate::types::{mint_id, now_secs, CompressedPattern};
#[cfg(feature = "native-sona")]
use std::sync::Mutex;
#[cfg(feature = "native-sona")]
use tracing::warn;

/// Rows kept per layer before oldest-first eviction.
pub const DEFAULT_MAX_PATTERNS: usize = 1000;

/// Cap on how many of the most recent persisted trajectories are replayed
/// against the compressor at startup (`spec.md` §4.4).
pub const TRAJECTORY_REPLAY_CAP: usize = 50;

/// Layer compressed trajectory-replay patterns are filed under.
const TRAJECTORY_REPLAY_LAYER: &str = "trajectory";

/// A backend that can accept and recall compressed pattern vectors.
trait CompressionBackend: Send + Sync {
    fn store(&self, layer: &str, embedding: &[f32]) -> bool;
    fn patterns(&self, layer: &str, limit: usize) -> Vec<Vec<f32>>;
}

/// HNSW-backed native backend. Buggy builds are detected once at startup
/// via a three-call self-test and never retried for the process lifetime.
#[cfg(feature = "native-sona")]
struct NativeBackend {
    index: Mutex<hnsw_rs::hnsw::Hnsw<'static, f32, hnsw_rs::dist::DistCosine>>,
    count: Mutex<usize>,
}

#[cfg(feature = "native-sona")]
impl NativeBackend {
    fn new() -> Self {
        let index = hnsw_rs::hnsw::Hnsw::new(16, 10_000, 16, 200, hnsw_rs::dist::DistCosine {});
        Self {
            index: Mutex::new(index),
            count: Mutex::new(0),
        }
    }

    /// Insert the same dummy vector three times and read back the pattern
    /// count; a native build whose count stays at zero is marked buggy.
    fn self_test(&self) -> bool {
        let dummy = vec![1.0_f32; 8];
        for _ in 0..3 {
            self.store("__self_test__", &dummy);
        }
        *self.count.lock().unwrap() > 0
    }
}

#[cfg(feature = "native-sona")]
impl CompressionBackend for NativeBackend {
    fn store(&self, _layer: &str, embedding: &[f32]) -> bool {
        let mut count = self.count.lock().unwrap();
        let id = *count;
        self.index.lock().unwrap().insert((embedding, id));
        *count += 1;
        true
    }

    fn patterns(&self, _layer: &str, _limit: usize) -> Vec<Vec<f32>> {
        // The native index is used for fast nearest-neighbor recall only;
        // the durable record of what was stored lives in `compressed_patterns`.
        Vec::new()
    }
}

/// Pure-Rust fallback: writes straight through to `compressed_patterns`.
struct FallbackBackend;

impl CompressionBackend for FallbackBackend {
    fn store(&self, _layer: &str, _embedding: &[f32]) -> bool {
        true
    }

    fn patterns(&self, _layer: &str, _limit: usize) -> Vec<Vec<f32>> {
        Vec::new()
    }
}

/// Compresses and recalls pattern vectors, dispatching to a native or
/// fallback backend selected once at process start.
pub struct SonaCompressor {
    backend: Box<dyn CompressionBackend>,
    max_patterns: usize,
    degraded: bool,
}

impl SonaCompressor {
    /// Select and initialize the backend for this process.
    #[must_use]
    pub fn new(max_patterns: usize) -> Self {
        #[cfg(feature = "native-sona")]
        {
            let native = NativeBackend::new();
            if native.self_test() {
                return Self {
                    backend: Box::new(native),
                    max_patterns,
                    degraded: false,
                };
            }
            warn!("native sona backend failed its self-test, falling back to the pure backend");
        }

        Self {
            backend: Box::new(FallbackBackend),
            max_patterns,
            degraded: true,
        }
    }

    /// Whether the native backend was requested but rejected at startup.
    #[must_use]
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// Store one pattern embedding under `layer`, persisting to
    /// `compressed_patterns` and evicting the oldest rows past
    /// `max_patterns`.
    #[tracing::instrument(skip(self, store, embedding))]
    pub async fn store_pattern(
        &self,
        store: &Store,
        layer: &str,
        embedding: &[f32],
        metadata: serde_json::Value,
    ) -> Result<bool> {
        if !self.backend.store(layer, embedding) {
            return Ok(false);
        }
        let data_blob = pack(embedding);
        let stored_bytes = data_blob.len().max(1);
        let compression_ratio = (4 * embedding.len()) as f64 / stored_bytes as f64;
        let pattern = CompressedPattern {
            id: mint_id("cp"),
            layer: layer.to_string(),
            data_blob,
            compression_ratio,
            created_at: now_secs(),
            metadata,
        };
        store.save_compressed_pattern(&pattern).await?;
        store.evict_compressed_patterns(layer, self.max_patterns).await?;
        Ok(true)
    }

    /// Read back up to `limit` persisted patterns for `layer`.
    pub async fn get_patterns(&self, store: &Store, layer: &str, limit: usize) -> Result<Vec<CompressedPattern>> {
        store.get_compressed_patterns(layer, limit).await
    }

    /// Idempotent periodic maintenance tick. A no-op beyond the backend's
    /// own bookkeeping; reserved for future native-index compaction.
    pub fn tick(&self) {}

    /// Flush any buffered backend state. A no-op for both backends today.
    pub fn flush(&self) {}

    /// Force an immediate learning pass on the compressor. A no-op for
    /// both backends today; reserved for a future online-learning backend.
    pub fn force_learn(&self) {}

    /// Apply the micro-LoRA adapter to `vector`. Identity until an
    /// adapter is trained.
    #[must_use]
    pub fn apply_micro_lora(&self, vector: Vec<f32>) -> Vec<f32> {
        vector
    }

    /// Apply the base-LoRA adapter to `vector`. Identity until an adapter
    /// is trained.
    #[must_use]
    pub fn apply_base_lora(&self, vector: Vec<f32>) -> Vec<f32> {
        vector
    }

    /// Warm the backend up. A no-op; native-index prefetch is reserved for
    /// a future revision.
    pub fn warmup(&self) {}

    /// Register an elastic-weight-consolidation task. A no-op until EWC
    /// training lands; kept so call sites compile against the full
    /// surface named in `spec.md` §4.6.
    pub fn add_ewc_task(&self, _task_id: &str, _importance: f64) {}

    /// Replay up to [`TRAJECTORY_REPLAY_CAP`] of the most recently persisted
    /// trajectories against the compressor using a synthesized embedding
    /// (per-character char-code fold of each trajectory's state+action JSON
    /// into `dim` floats), so the vector store is warm before the first
    /// real event arrives (`spec.md` §4.4).
    #[tracing::instrument(skip(self, store))]
    pub async fn replay_trajectories(&self, store: &Store, dim: usize) -> Result<usize> {
        let snapshot = store.load_all().await?;
        let mut trajectories = snapshot.trajectories.unwrap_or_default();
        trajectories.sort_by_key(|t| t.timestamp);
        if trajectories.len() > TRAJECTORY_REPLAY_CAP {
            let start = trajectories.len() - TRAJECTORY_REPLAY_CAP;
            trajectories = trajectories[start..].to_vec();
        }

        let mut replayed = 0;
        for trajectory in &trajectories {
            let text = format!("{}{}", trajectory.state, trajectory.action);
            let embedding = crate::rl::synth_embedding_from_text(&text, dim);
            let metadata = serde_json::json!({ "source": "replay_warm_up", "trajectory_id": trajectory.id });
            if self.store_pattern(store, TRAJECTORY_REPLAY_LAYER, &embedding, metadata).await? {
                replayed += 1;
            }
        }
        Ok(replayed)
    }

    /// Bridge event: copy every `neural_pattern` with an embedding into
    /// `compressed_patterns` (`layer = category`); for patterns lacking an
    /// embedding, synthesize one from a content hash.
    #[tracing::instrument(skip(self, store))]
    pub async fn sona_consolidate(&self, store: &Store, dim: usize) -> Result<usize> {
        let patterns = store.list_neural_patterns(None).await?;
        let mut copied = 0;
        for pattern in patterns {
            let embedding_bytes = pattern
                .embedding
                .clone()
                .unwrap_or_else(|| synth_embedding_bytes(&pattern.content, dim));
            let embedding = crate::embeddings::unpack(&embedding_bytes);
            if self
                .store_pattern(store, &pattern.category, &embedding, pattern.metadata.clone())
                .await?
            {
                copied += 1;
            }
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::NeuralPattern;

    async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.root = dir.path().to_path_buf();
        cfg.sqlite_path = dir.path().join("intelligence.db");
        cfg.json_mirror_path = dir.path().join("intelligence.json");
        cfg.kv_path = dir.path().join("kv.json");
        (Store::open(&cfg).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn store_pattern_round_trips_through_compressed_patterns() {
        let (store, _dir) = test_store().await;
        let sona = SonaCompressor::new(DEFAULT_MAX_PATTERNS);
        let embedding = vec![0.5_f32, -0.25, 0.1];
        sona.store_pattern(&store, "edit:rs", &embedding, serde_json::json!({})).await.unwrap();
        let patterns = sona.get_patterns(&store, "edit:rs", 10).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert!((patterns[0].compression_ratio - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn eviction_keeps_only_max_patterns() {
        let (store, _dir) = test_store().await;
        let sona = SonaCompressor::new(2);
        for i in 0..5 {
            sona.store_pattern(&store, "edit:rs", &[i as f32], serde_json::json!({})).await.unwrap();
        }
        let patterns = sona.get_patterns(&store, "edit:rs", 10).await.unwrap();
        assert_eq!(patterns.len(), 2);
    }

    #[tokio::test]
    async fn sona_consolidate_copies_patterns_with_embeddings() {
        let (store, _dir) = test_store().await;
        let now = now_secs();
        let np = NeuralPattern {
            id: "np-1".to_string(),
            content: "edited lib.rs".to_string(),
            category: "edit:rs".to_string(),
            embedding: Some(pack(&[0.1, 0.2, 0.3])),
            confidence: 0.7,
            usage: 3,
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
        };
        store.add_neural_pattern(&np).await.unwrap();

        let sona = SonaCompressor::new(DEFAULT_MAX_PATTERNS);
        let copied = sona.sona_consolidate(&store, 3).await.unwrap();
        assert_eq!(copied, 1);
        let patterns = sona.get_patterns(&store, "edit:rs", 10).await.unwrap();
        assert_eq!(patterns.len(), 1);
    }

    #[tokio::test]
    async fn replay_trajectories_warms_up_the_trajectory_layer() {
        use crate::types::Trajectory;

        let (store, _dir) = test_store().await;
        for i in 0..3 {
            let traj = Trajectory {
                id: format!("traj-{i}"),
                state: format!("[{i}.0]"),
                action: "[]".to_string(),
                outcome: Some("completed".to_string()),
                reward: Some(0.5),
                timestamp: now_secs() + i,
            };
            store.add_trajectory(&traj).await.unwrap();
        }

        let sona = SonaCompressor::new(DEFAULT_MAX_PATTERNS);
        let replayed = sona.replay_trajectories(&store, 8).await.unwrap();
        assert_eq!(replayed, 3);
        let patterns = sona.get_patterns(&store, "trajectory", 10).await.unwrap();
        assert_eq!(patterns.len(), 3);
    }

    #[tokio::test]
    async fn replay_trajectories_caps_at_the_replay_limit() {
        use crate::types::Trajectory;

        let (store, _dir) = test_store().await;
        for i in 0..(TRAJECTORY_REPLAY_CAP + 5) {
            let traj = Trajectory {
                id: format!("traj-{i}"),
                state: format!("[{i}.0]"),
                action: "[]".to_string(),
                outcome: Some("completed".to_string()),
                reward: Some(0.5),
                timestamp: now_secs() + i as i64,
            };
            store.add_trajectory(&traj).await.unwrap();
        }

        let sona = SonaCompressor::new(DEFAULT_MAX_PATTERNS);
        let replayed = sona.replay_trajectories(&store, 8).await.unwrap();
        assert_eq!(replayed, TRAJECTORY_REPLAY_CAP);
    }
}
