//! A full (or partial) view of every table, used by `load_all`/`save_all`.

use crate::types::{
    Agent, CompressedPattern, Edge, ErrorRecord, FileSequence, KvEntry, LearningData, Memory,
    NeuralPattern, QEntry, Stat, Trajectory,
};
use serde::{Deserialize, Serialize};

/// A snapshot of all twelve tables. Each field is `None` for "leave this
/// table untouched" and `Some(vec![])` for "this table is empty" — the
/// distinction `save_all` uses to implement the empty-collection guard of
/// `spec.md` §4.1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// `memories` rows.
    pub memories: Option<Vec<Memory>>,
    /// `q_entries` rows.
    pub q_entries: Option<Vec<QEntry>>,
    /// `trajectories` rows.
    pub trajectories: Option<Vec<Trajectory>>,
    /// `learning_data` rows.
    pub learning_data: Option<Vec<LearningData>>,
    /// `neural_patterns` rows.
    pub neural_patterns: Option<Vec<NeuralPattern>>,
    /// `edges` rows.
    pub edges: Option<Vec<Edge>>,
    /// `agents` rows.
    pub agents: Option<Vec<Agent>>,
    /// `compressed_patterns` rows.
    pub compressed_patterns: Option<Vec<CompressedPattern>>,
    /// `file_sequences` rows.
    pub file_sequences: Option<Vec<FileSequence>>,
    /// `errors` rows.
    pub errors: Option<Vec<ErrorRecord>>,
    /// `stats` rows.
    pub stats: Option<Vec<Stat>>,
    /// `kv_store` rows.
    pub kv_store: Option<Vec<KvEntry>>,
}

impl StoreSnapshot {
    /// An entirely empty-but-present snapshot (every field `Some(vec![])`),
    /// the shape `load_all` returns for a freshly created database.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            memories: Some(Vec::new()),
            q_entries: Some(Vec::new()),
            trajectories: Some(Vec::new()),
            learning_data: Some(Vec::new()),
            neural_patterns: Some(Vec::new()),
            edges: Some(Vec::new()),
            agents: Some(Vec::new()),
            compressed_patterns: Some(Vec::new()),
            file_sequences: Some(Vec::new()),
            errors: Some(Vec::new()),
            stats: Some(Vec::new()),
            kv_store: Some(Vec::new()),
        }
    }

    /// Whether every table field is either absent or an empty collection.
    #[must_use]
    pub fn is_fully_empty(&self) -> bool {
        fn empty_or_absent<T>(f: &Option<Vec<T>>) -> bool {
            f.as_ref().is_none_or(Vec::is_empty)
        }
        empty_or_absent(&self.memories)
            && empty_or_absent(&self.q_entries)
            && empty_or_absent(&self.trajectories)
            && empty_or_absent(&self.learning_data)
            && empty_or_absent(&self.neural_patterns)
            && empty_or_absent(&self.edges)
            && empty_or_absent(&self.agents)
            && empty_or_absent(&self.compressed_patterns)
            && empty_or_absent(&self.file_sequences)
            && empty_or_absent(&self.errors)
            && empty_or_absent(&self.stats)
            && empty_or_absent(&self.kv_store)
    }
}
