//! # Consolidator (C5)
//!
//! Periodic and event-triggered pass that derives `neural_patterns`,
//! `edges`, `agents`, and `stats` from raw memories (`spec.md` §4.5).
//! Grounded in the teacher's `patterns/clustering/clusterer.rs`
//! group-then-merge idiom, adapted from k-means episode clustering to the
//! category-keyed grouping this spec calls for.

use crate::config::Config;
use crate::embeddings::{cosine_similarity, unpack};
use crate::error::Result;
use crate::store::Store;
use crate::types::{now_secs, EdgeKind, NeuralPattern};
use std::collections::HashMap;

/// Default number of most-recent memories scanned per pass.
pub const DEFAULT_WINDOW: usize = 200;
/// Minimum group size before a cluster is synthesized into a pattern.
const MIN_GROUP_SIZE: usize = 3;
/// Memories within this many seconds of each other get a temporal edge.
const TEMPORAL_WINDOW_SECS: i64 = 60;
/// Default cap on semantic-edge emissions per pass.
pub const DEFAULT_MAX_SEMANTIC_EDGES: usize = 50;

/// Summary of one consolidation pass, returned for CLI reporting.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Neural patterns synthesized this pass.
    pub patterns_created: usize,
    /// Temporal edges emitted.
    pub temporal_edges: usize,
    /// Pattern edges emitted.
    pub pattern_edges: usize,
    /// Semantic edges emitted.
    pub semantic_edges: usize,
}

/// Runs the consolidation algorithm of `spec.md` §4.5.
pub struct Consolidator {
    window: usize,
    semantic_threshold: f32,
    max_semantic_edges: usize,
    embedding_dim: usize,
}

impl Consolidator {
    /// Build a consolidator from the resolved configuration.
    #[must_use]
    pub fn new(cfg: &Config) -> Self {
        Self {
            window: DEFAULT_WINDOW,
            semantic_threshold: cfg.semantic_threshold as f32,
            max_semantic_edges: DEFAULT_MAX_SEMANTIC_EDGES,
            embedding_dim: cfg.embedding_dim,
        }
    }

    /// Run one consolidation pass, registering `agent` as the invoker.
    /// The whole pass — pattern synthesis, every edge emission, the agent
    /// heartbeat, and the stats sync — runs inside a single transaction.
    pub async fn consolidate(&self, store: &Store, agent: &str) -> Result<ConsolidationReport> {
        store
            .transaction(move || self.consolidate_inner(store, agent))
            .await
    }

    async fn consolidate_inner(&self, store: &Store, agent: &str) -> Result<ConsolidationReport> {
        let mut snapshot = store.load_all().await?;
        let mut memories = snapshot.memories.take().unwrap_or_default();
        memories.sort_by_key(|m| m.timestamp);
        if memories.len() > self.window {
            let start = memories.len() - self.window;
            memories = memories[start..].to_vec();
        }

        let mut report = ConsolidationReport::default();

        let groups = group_by_category(&memories);
        for (category, members) in &groups {
            if members.len() < MIN_GROUP_SIZE {
                continue;
            }
            let pattern = synthesize_pattern(category, members);
            store.add_neural_pattern(&pattern).await?;
            report.patterns_created += 1;

            for member in members {
                if store
                    .has_edge(&pattern.id, &member.id, EdgeKind::Pattern)
                    .await?
                {
                    continue;
                }
                store
                    .add_edge(&pattern.id, &member.id, EdgeKind::Pattern, pattern.confidence)
                    .await?;
                report.pattern_edges += 1;
            }
        }

        for pair in memories.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if (b.timestamp - a.timestamp).abs() <= TEMPORAL_WINDOW_SECS {
                store.add_edge(&a.id, &b.id, EdgeKind::Temporal, 1.0).await?;
                report.temporal_edges += 1;
            }
        }

        'outer: for (i, a) in memories.iter().enumerate() {
            let Some(a_embed) = a.embedding.as_deref().map(unpack) else {
                continue;
            };
            for b in &memories[i + 1..] {
                if report.semantic_edges >= self.max_semantic_edges {
                    break 'outer;
                }
                let Some(b_embed) = b.embedding.as_deref().map(unpack) else {
                    continue;
                };
                let sim = cosine_similarity(&a_embed, &b_embed);
                if sim < self.semantic_threshold {
                    continue;
                }
                if store.has_edge(&a.id, &b.id, EdgeKind::Semantic).await? {
                    continue;
                }
                store
                    .add_edge(&a.id, &b.id, EdgeKind::Semantic, f64::from(sim))
                    .await?;
                report.semantic_edges += 1;
            }
        }

        store.register_agent(agent, "consolidate").await?;
        self.sync_stats(store, self.embedding_dim).await?;

        Ok(report)
    }

    async fn sync_stats(&self, store: &Store, configured_dim: usize) -> Result<()> {
        let snapshot = store.load_all().await?;
        let total_memories = snapshot.memories.map(|m| m.len()).unwrap_or(0);
        let total_patterns = snapshot.neural_patterns.map(|p| p.len()).unwrap_or(0);
        let total_edges = snapshot.edges.map(|e| e.len()).unwrap_or(0);
        let total_trajectories = snapshot.trajectories.map(|t| t.len()).unwrap_or(0);
        let total_agents = snapshot.agents.map(|a| a.len()).unwrap_or(0);

        store.set_stat("total_memories", &total_memories.to_string()).await?;
        store.set_stat("total_patterns", &total_patterns.to_string()).await?;
        store.set_stat("total_edges", &total_edges.to_string()).await?;
        store.set_stat("total_trajectories", &total_trajectories.to_string()).await?;
        store.set_stat("total_agents", &total_agents.to_string()).await?;
        store.set_stat("embedding_dimension", &configured_dim.to_string()).await?;
        store.set_stat("last_consolidation", &now_secs().to_string()).await?;

        let count: i64 = store
            .get_stat("consolidation_count")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        store
            .set_stat("consolidation_count", &(count + 1).to_string())
            .await?;
        Ok(())
    }
}

fn group_by_category<'a>(memories: &'a [crate::types::Memory]) -> HashMap<String, Vec<&'a crate::types::Memory>> {
    let mut groups: HashMap<String, Vec<&crate::types::Memory>> = HashMap::new();
    for memory in memories {
        let kind = serde_json::to_string(&memory.kind)
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        let ext = memory
            .metadata
            .get("path")
            .and_then(|p| p.as_str())
            .and_then(|p| std::path::Path::new(p).extension())
            .and_then(|e| e.to_str())
            .unwrap_or("none");
        groups.entry(format!("{kind}:{ext}")).or_default().push(memory);
    }
    groups
}

fn synthesize_pattern(category: &str, members: &[&crate::types::Memory]) -> NeuralPattern {
    let content = members
        .iter()
        .map(|m| m.content.chars().take(120).collect::<String>())
        .collect::<Vec<_>>()
        .join(" | ");

    let embedding = centroid(members);
    let confidence = (0.5 + 0.1 * members.len() as f64).min(1.0);
    let now = now_secs();

    NeuralPattern {
        id: format!("np-{category}"),
        content,
        category: category.to_string(),
        embedding,
        confidence,
        usage: members.len() as u64,
        created_at: now,
        updated_at: now,
        metadata: serde_json::json!({ "source": "consolidate" }),
    }
}

fn centroid(members: &[&crate::types::Memory]) -> Option<Vec<u8>> {
    let vectors: Vec<Vec<f32>> = members
        .iter()
        .filter_map(|m| m.embedding.as_deref().map(unpack))
        .collect();
    if vectors.len() != members.len() || vectors.is_empty() {
        // Fallback: hash of concatenated content when any embedding is missing.
        let content: String = members.iter().map(|m| m.content.as_str()).collect();
        let dim = vectors.first().map_or(64, Vec::len);
        return Some(crate::embeddings::pack(&crate::rl::synth_embedding_from_text(&content, dim)));
    }
    let dim = vectors[0].len();
    let mut sum = vec![0.0_f32; dim];
    for v in &vectors {
        for (i, x) in v.iter().enumerate() {
            sum[i] += x;
        }
    }
    for x in &mut sum {
        *x /= vectors.len() as f32;
    }
    Some(crate::embeddings::pack(&sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::pack;
    use crate::types::{Memory, MemoryKind};

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
    async fn consolidate_on_empty_store_creates_no_patterns() {
        let (store, _dir) = test_store().await;
        let cfg = Config::default();
        let consolidator = Consolidator::new(&cfg);
        let report = consolidator.consolidate(&store, "setup-agent").await.unwrap();
        assert_eq!(report.patterns_created, 0);
    }

    #[tokio::test]
    async fn groups_of_three_or_more_synthesize_a_pattern() {
        let (store, _dir) = test_store().await;
        let now = now_secs();
        for i in 0..3 {
            let mem = Memory {
                id: format!("mem-{i}"),
                kind: MemoryKind::Edit,
                content: format!("lib.rs: edited src/lib.rs {i}"),
                embedding: Some(pack(&[1.0, 0.0, 0.0])),
                metadata: serde_json::json!({ "path": "src/lib.rs" }),
                timestamp: now + i,
            };
            store.add_memory(&mem).await.unwrap();
        }
        let cfg = Config::default();
        let consolidator = Consolidator::new(&cfg);
        let report = consolidator.consolidate(&store, "setup-agent").await.unwrap();
        assert_eq!(report.patterns_created, 1);
        assert!(report.temporal_edges >= 2);
    }

    #[tokio::test]
    async fn consolidate_twice_does_not_duplicate_pattern_edges() {
        let (store, _dir) = test_store().await;
        let now = now_secs();
        for i in 0..3 {
            let mem = Memory {
                id: format!("mem-{i}"),
                kind: MemoryKind::Edit,
                content: format!("lib.rs: edited src/lib.rs {i}"),
                embedding: Some(pack(&[1.0, 0.0, 0.0])),
                metadata: serde_json::json!({ "path": "src/lib.rs" }),
                timestamp: now + i,
            };
            store.add_memory(&mem).await.unwrap();
        }
        let cfg = Config::default();
        let consolidator = Consolidator::new(&cfg);
        let first = consolidator.consolidate(&store, "setup-agent").await.unwrap();
        let second = consolidator.consolidate(&store, "setup-agent").await.unwrap();
        assert_eq!(first.patterns_created, 1);
        // The pattern id is derived from its category, so the second pass
        // updates the same row instead of minting a duplicate: edges against
        // "mem-0" must not double.
        assert_eq!(second.patterns_created, 1);
        let patterns = store.list_neural_patterns(None).await.unwrap();
        assert_eq!(patterns.len(), 1);
        let edges = store.edges_of_kind(EdgeKind::Pattern).await.unwrap();
        let mem0_edges = edges.iter().filter(|e| e.source == "mem-0" || e.target == "mem-0").count();
        assert_eq!(mem0_edges, 1);
    }
}
