//! # RLEngine (C4)
//!
//! Nine Q-table algorithms as independent trait-object values in a map
//! (never an inheritance hierarchy, `spec.md` §9), reward-differentiation,
//! and trajectory lifecycle. Grounded in the teacher's
//! `memory-core/src/reward.rs` weighted-calculator idiom and
//! `memory-core/src/learning/{mod,stats}.rs` (stats-struct-beside-queue
//! convention, generalized here to one stats struct per algorithm).

pub mod reward;
pub mod trajectory;

pub use reward::RewardCalculator;
pub use trajectory::{synth_embedding_bytes, synth_embedding_from_text, OpenTrajectory};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{now_secs, QEntry, RL_ALGORITHMS};
use std::collections::HashMap;

/// Per-algorithm update/reward bookkeeping surfaced by `validate`/`diagnose`
/// (ambient addition, grounded in the teacher's `learning/stats.rs`).
#[derive(Debug, Clone, Default)]
pub struct LearningStats {
    /// Number of `learn()` calls observed for this algorithm.
    pub update_count: u64,
    /// Mean reward observed across all calls.
    pub mean_reward: f64,
}

/// Common interface every Q-table algorithm implements (`spec.md` §9).
trait QAlgorithm: Send + Sync {
    fn update(&mut self, state: &str, action: &str, reward: f64, learning_rate: f64, now: i64) -> QEntry;
    fn entry(&self, state: &str, action: &str) -> Option<QEntry>;
    fn snapshot(&self) -> Result<String>;
    fn restore(&mut self, json: &str) -> Result<()>;
}

/// Plain tabular Q-learning update, shared by every algorithm except
/// `double-q`; per `spec.md` §4.4 the nine algorithms differ only in the
/// effective reward signal, which this crate does not simulate beyond the
/// shared update rule (an Open Question resolution, see `DESIGN.md`).
#[derive(Debug, Default)]
struct TabularQAlgorithm {
    table: HashMap<String, QEntry>,
}

impl TabularQAlgorithm {
    fn load_entries(&mut self, entries: Vec<QEntry>) {
        self.table = entries.into_iter().map(|e| (e.key.clone(), e)).collect();
    }
}

impl QAlgorithm for TabularQAlgorithm {
    fn update(&mut self, state: &str, action: &str, reward: f64, learning_rate: f64, now: i64) -> QEntry {
        let key = QEntry::make_key(state, action);
        let entry = self.table.entry(key.clone()).or_insert_with(|| QEntry {
            key: key.clone(),
            state: state.to_string(),
            action: action.to_string(),
            q_value: 0.0,
            visits: 0,
            last_update: now,
        });
        entry.q_value += learning_rate * (reward - entry.q_value);
        entry.visits += 1;
        entry.last_update = now;
        entry.clone()
    }

    fn entry(&self, state: &str, action: &str) -> Option<QEntry> {
        self.table.get(&QEntry::make_key(state, action)).cloned()
    }

    fn snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.table)?)
    }

    fn restore(&mut self, json: &str) -> Result<()> {
        self.table = serde_json::from_str(json)?;
        Ok(())
    }
}

/// `double-q`: two shadow tables alternate which is updated each call; the
/// reported q-value is their mean (`spec.md` §4.4).
#[derive(Debug, Default)]
struct DoubleQAlgorithm {
    table_a: HashMap<String, QEntry>,
    table_b: HashMap<String, QEntry>,
    toggle: bool,
}

impl QAlgorithm for DoubleQAlgorithm {
    fn update(&mut self, state: &str, action: &str, reward: f64, learning_rate: f64, now: i64) -> QEntry {
        let key = QEntry::make_key(state, action);
        let target = if self.toggle { &mut self.table_b } else { &mut self.table_a };
        self.toggle = !self.toggle;

        let entry = target.entry(key.clone()).or_insert_with(|| QEntry {
            key: key.clone(),
            state: state.to_string(),
            action: action.to_string(),
            q_value: 0.0,
            visits: 0,
            last_update: now,
        });
        entry.q_value += learning_rate * (reward - entry.q_value);
        entry.visits += 1;
        entry.last_update = now;

        self.entry(state, action).unwrap_or_else(|| entry.clone())
    }

    fn entry(&self, state: &str, action: &str) -> Option<QEntry> {
        let key = QEntry::make_key(state, action);
        let a = self.table_a.get(&key);
        let b = self.table_b.get(&key);
        match (a, b) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) => Some(QEntry {
                key,
                state: state.to_string(),
                action: action.to_string(),
                q_value: (a.q_value + b.q_value) / 2.0,
                visits: a.visits + b.visits,
                last_update: a.last_update.max(b.last_update),
            }),
        }
    }

    fn snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string(&(&self.table_a, &self.table_b))?)
    }

    fn restore(&mut self, json: &str) -> Result<()> {
        let (a, b) = serde_json::from_str(json)?;
        self.table_a = a;
        self.table_b = b;
        Ok(())
    }
}

fn new_algorithm(name: &str) -> Box<dyn QAlgorithm> {
    if name == "double-q" {
        Box::<DoubleQAlgorithm>::default()
    } else {
        Box::<TabularQAlgorithm>::default()
    }
}

/// Maintains Q-tables for all nine algorithms plus open trajectories
/// (`spec.md` §4.4).
pub struct RLEngine {
    algorithms: HashMap<String, Box<dyn QAlgorithm>>,
    /// The single canonical table that backs the `q_entries` store table
    /// and the concrete numeric examples of `spec.md` §8: a plain tabular
    /// update applied on every `learn()` call regardless of which of the
    /// nine algorithms is configured. `double-q`'s alternating-table
    /// behavior only affects that algorithm's own `learning_data` snapshot
    /// (`spec.md` §9's Open Question on double-q's selection logic;
    /// resolved in `DESIGN.md`).
    primary: TabularQAlgorithm,
    reward_history: HashMap<String, Vec<f64>>,
    rewards: RewardCalculator,
}

/// Reward history is capped at this many entries per algorithm for the
/// `convergence_score` variance computation.
const MAX_REWARD_HISTORY: usize = 500;

/// Size of the trailing window used by `convergence_score`.
const CONVERGENCE_WINDOW: usize = 20;

/// Reserved `learning_data.algorithm` key under which the per-algorithm
/// reward history is persisted, so [`RLEngine::stats`] and
/// [`RLEngine::convergence_score`] stay meaningful across the
/// one-process-per-hook-invocation lifetime instead of resetting on every
/// `load`. Not one of [`RL_ALGORITHMS`], so it cannot collide with a
/// Q-table row.
const REWARD_HISTORY_KEY: &str = "_reward_history";

impl RLEngine {
    /// Build a fresh engine with all nine algorithms initialized to empty
    /// tables.
    #[must_use]
    pub fn new() -> Self {
        let algorithms = RL_ALGORITHMS
            .iter()
            .map(|name| ((*name).to_string(), new_algorithm(name)))
            .collect();
        Self {
            algorithms,
            primary: TabularQAlgorithm::default(),
            reward_history: HashMap::new(),
            rewards: RewardCalculator::new(),
        }
    }

    /// Build an engine and restore every algorithm's table from
    /// `learning_data`, if present (`spec.md` §4.4 "replay warm-up").
    pub async fn load(store: &Store) -> Result<Self> {
        let mut engine = Self::new();
        for name in RL_ALGORITHMS {
            if let Some(json) = store.load_learning_data(name).await? {
                if let Some(algo) = engine.algorithms.get_mut(name) {
                    if let Err(err) = algo.restore(&json) {
                        tracing::warn!(algorithm = name, error = %err, "failed to restore learning_data, starting fresh");
                    }
                }
            }
        }
        engine.primary.load_entries(store.list_q_entries().await?);
        if let Some(json) = store.load_learning_data(REWARD_HISTORY_KEY).await? {
            match serde_json::from_str(&json) {
                Ok(history) => engine.reward_history = history,
                Err(err) => tracing::warn!(error = %err, "failed to restore reward history, starting fresh"),
            }
        }
        Ok(engine)
    }

    /// Reward calculator accessor, used by the router to turn an event
    /// into a reward before calling [`RLEngine::learn`].
    #[must_use]
    pub fn rewards(&self) -> &RewardCalculator {
        &self.rewards
    }

    /// Update `algorithm`'s Q-table for `(state, action)` given `reward`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `algorithm` is not one of the nine
    /// recognized identifiers.
    pub fn learn(&mut self, algorithm: &str, state: &str, action: &str, reward: f64, learning_rate: f64) -> Result<QEntry> {
        if !self.algorithms.contains_key(algorithm) {
            return Err(Error::Config(format!("unknown RL algorithm: {algorithm}")));
        }
        let now = now_secs();
        let entry = self.primary.update(state, action, reward, learning_rate, now);
        if let Some(algo) = self.algorithms.get_mut(algorithm) {
            algo.update(state, action, reward, learning_rate, now);
        }

        let history = self.reward_history.entry(algorithm.to_string()).or_default();
        history.push(reward);
        if history.len() > MAX_REWARD_HISTORY {
            history.remove(0);
        }

        tracing::debug!(algorithm, key = %entry.key, q_value = entry.q_value, "RL update");
        Ok(entry)
    }

    /// The canonical Q-entry for `(state, action)`, as stored in
    /// `q_entries`.
    #[must_use]
    pub fn q_entry(&self, state: &str, action: &str) -> Option<QEntry> {
        self.primary.entry(state, action)
    }

    /// Current Q-entry for `(state, action)` under a specific algorithm's
    /// own internal table (diagnostic surface, may diverge from
    /// [`RLEngine::q_entry`] for `double-q`).
    #[must_use]
    pub fn algorithm_entry(&self, algorithm: &str, state: &str, action: &str) -> Option<QEntry> {
        self.algorithms.get(algorithm).and_then(|a| a.entry(state, action))
    }

    /// `1 - variance(last-N rewards) / variance(all rewards)` for
    /// `algorithm`; `0.0` when fewer than two rewards have been observed
    /// (`spec.md` §4.4).
    #[must_use]
    pub fn convergence_score(&self, algorithm: &str) -> f64 {
        let Some(history) = self.reward_history.get(algorithm) else {
            return 0.0;
        };
        if history.len() < 2 {
            return 0.0;
        }
        let all_var = variance(history);
        if all_var <= f64::EPSILON {
            return 1.0;
        }
        let window_start = history.len().saturating_sub(CONVERGENCE_WINDOW);
        let recent_var = variance(&history[window_start..]);
        (1.0 - recent_var / all_var).clamp(0.0, 1.0)
    }

    /// Per-algorithm update counts and mean rewards (ambient addition for
    /// `validate`/`diagnose`).
    #[must_use]
    pub fn stats(&self) -> HashMap<String, LearningStats> {
        self.reward_history
            .iter()
            .map(|(name, rewards)| {
                let mean = if rewards.is_empty() {
                    0.0
                } else {
                    rewards.iter().sum::<f64>() / rewards.len() as f64
                };
                (
                    name.clone(),
                    LearningStats {
                        update_count: rewards.len() as u64,
                        mean_reward: mean,
                    },
                )
            })
            .collect()
    }

    /// Persist every algorithm's current table to `learning_data`
    /// (`spec.md` §4.4's `force_learn`/`flush` surface).
    pub async fn persist(&self, store: &Store) -> Result<()> {
        for (name, algo) in &self.algorithms {
            let json = algo.snapshot()?;
            store.save_learning_data(name, &json).await?;
        }
        for entry in self.primary.table.values() {
            store.upsert_q_entry(entry).await?;
        }
        let history_json = serde_json::to_string(&self.reward_history)?;
        store.save_learning_data(REWARD_HISTORY_KEY, &history_json).await?;
        Ok(())
    }
}

impl Default for RLEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_one_matches_spec_example() {
        let mut engine = RLEngine::new();
        let entry = engine.learn("double-q", "state", "edit:src/lib.rs", 0.9, 0.1).unwrap();
        assert!((entry.q_value - 0.09).abs() < 1e-9);
    }

    #[test]
    fn scenario_two_matches_spec_example() {
        let mut engine = RLEngine::new();
        engine.learn("double-q", "state", "edit:src/lib.rs", 0.9, 0.1).unwrap();
        let entry = engine.learn("double-q", "state", "edit:src/lib.rs", 0.4, 0.1).unwrap();
        assert!((entry.q_value - 0.121).abs() < 1e-3);
    }

    #[test]
    fn unknown_algorithm_is_config_error() {
        let mut engine = RLEngine::new();
        let result = engine.learn("not-an-algorithm", "s", "a", 1.0, 0.1);
        assert!(result.is_err());
    }

    #[test]
    fn convergence_score_is_one_for_constant_reward() {
        let mut engine = RLEngine::new();
        for _ in 0..30 {
            engine.learn("q-learning", "s", "a", 0.5, 0.1).unwrap();
        }
        assert!((engine.convergence_score("q-learning") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn visits_increment_monotonically() {
        let mut engine = RLEngine::new();
        engine.learn("sarsa", "s", "a", 0.1, 0.1).unwrap();
        let e = engine.learn("sarsa", "s", "a", 0.2, 0.1).unwrap();
        assert_eq!(e.visits, 2);
    }

    #[tokio::test]
    async fn stats_survive_a_persist_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = crate::config::Config::default();
        cfg.root = dir.path().to_path_buf();
        cfg.sqlite_path = dir.path().join("intelligence.db");
        cfg.json_mirror_path = dir.path().join("intelligence.json");
        cfg.kv_path = dir.path().join("kv.json");
        let store = Store::open(&cfg).await.unwrap();

        let mut engine = RLEngine::new();
        engine.learn("q-learning", "s", "a", 0.5, 0.1).unwrap();
        engine.learn("q-learning", "s", "a", 0.7, 0.1).unwrap();
        engine.persist(&store).await.unwrap();

        let reloaded = RLEngine::load(&store).await.unwrap();
        let stats = reloaded.stats();
        let q_learning = stats.get("q-learning").unwrap();
        assert_eq!(q_learning.update_count, 2);
        assert!((q_learning.mean_reward - 0.6).abs() < 1e-9);
    }
}
