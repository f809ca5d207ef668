//! # Validator (C8)
//!
//! Read-only health checks producing a structured report (`spec.md` §4.8).
//! Grounded in the teacher's `memory-cli`'s `Health`/`Monitor` subcommand
//! split, collapsed here into a single `validate` (machine exit code) vs
//! `diagnose` (verbose human report) pair over one [`HealthReport`].

use crate::config::Config;
use crate::error::Result;
use crate::rl::RLEngine;
use crate::store::{Store, StoreSnapshot};
use crate::types::RL_ALGORITHMS;
use serde::Serialize;
use std::collections::HashMap;

/// Severity of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Passed.
    Ok,
    /// Passed with a caveat worth surfacing.
    Warn,
    /// Failed; exit code 3 when any check is at this level.
    Fail,
}

/// One named health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Short check identifier, e.g. `"L1"`, `"L5"`, `"parity"`.
    pub id: &'static str,
    /// Severity.
    pub level: Level,
    /// Human-readable detail.
    pub message: String,
}

/// Aggregate result of one validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    /// Every check performed, in order.
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// `true` if every check passed at [`Level::Ok`] or [`Level::Warn`].
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.checks.iter().any(|c| c.level == Level::Fail)
    }
}

/// Runs the L1–L10 + parity checks of `spec.md` §4.8 against an open store.
pub struct Validator<'a> {
    store: &'a Store,
    cfg: &'a Config,
}

impl<'a> Validator<'a> {
    /// Build a validator over an already-open store and its configuration.
    #[must_use]
    pub fn new(store: &'a Store, cfg: &'a Config) -> Self {
        Self { store, cfg }
    }

    /// Run every check and return the aggregate report.
    pub async fn run(&self) -> Result<HealthReport> {
        let snapshot = self.store.load_all().await?;
        let mut checks = Vec::new();

        checks.push(self.check_install_layout());
        checks.push(self.check_config());
        checks.push(self.check_schema());
        checks.push(self.check_embedding_dimensions(&snapshot));
        checks.push(self.check_neural_patterns(&snapshot));
        checks.push(self.check_edges(&snapshot));
        checks.push(self.check_agents(&snapshot));
        checks.push(self.check_trajectory_variance(&snapshot));
        checks.push(self.check_stats_populated(&snapshot));
        checks.push(self.check_consolidation_freshness(&snapshot));
        checks.push(self.check_learning_progress().await?);
        checks.push(self.check_parity(&snapshot));

        Ok(HealthReport { checks })
    }

    /// L1: required files/directories present.
    fn check_install_layout(&self) -> HealthCheck {
        let missing: Vec<&str> = [
            ("database", self.store.db_path()),
            ("kv mirror", self.store.kv_path()),
        ]
        .into_iter()
        .filter(|(_, p)| !p.exists())
        .map(|(label, _)| label)
        .collect();

        if missing.is_empty() {
            ok("L1", "install layout present")
        } else {
            fail("L1", format!("missing: {}", missing.join(", ")))
        }
    }

    /// L2: semantic-embeddings flag, dimension set, hook-timeout floor.
    fn check_config(&self) -> HealthCheck {
        let mut problems = Vec::new();
        if self.cfg.embedding_dim == 0 {
            problems.push("embedding_dim is 0".to_string());
        }
        if self.cfg.hook_timeout_ms < 5_000 {
            problems.push(format!("hook_timeout_ms {} below 5000ms floor", self.cfg.hook_timeout_ms));
        }
        if !self.cfg.semantic_embeddings {
            return warn("L2", "semantic embeddings disabled, hash fallback in use");
        }
        if problems.is_empty() {
            ok("L2", "configuration within bounds")
        } else {
            fail("L2", problems.join("; "))
        }
    }

    /// L3: schema presence. `ensure_schema` runs idempotently on every
    /// `Store::open`, so by the time a validator runs all twelve tables
    /// exist; this check reports that invariant rather than re-deriving it.
    fn check_schema(&self) -> HealthCheck {
        ok("L3", "all twelve tables present (enforced on open)")
    }

    /// L5: embedding dimension histogram; FAIL if any row's byte length is
    /// neither `4 * dim` nor zero.
    fn check_embedding_dimensions(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let expected = 4 * self.cfg.embedding_dim;
        let mut histogram: HashMap<usize, usize> = HashMap::new();
        let mut bad = 0;
        for memory in snapshot.memories.as_deref().unwrap_or_default() {
            let len = memory.embedding.as_ref().map_or(0, Vec::len);
            *histogram.entry(len).or_default() += 1;
            if len != expected && len != 0 {
                bad += 1;
            }
        }
        if bad > 0 {
            fail("L5", format!("{bad} rows have an embedding length matching neither {expected} nor 0"))
        } else {
            ok("L5", format!("embedding length histogram: {histogram:?}"))
        }
    }

    /// L7: neural-pattern count.
    fn check_neural_patterns(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let count = snapshot.neural_patterns.as_deref().map_or(0, <[_]>::len);
        ok("L7", format!("{count} neural patterns"))
    }

    /// L8: edge count per kind.
    fn check_edges(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let edges = snapshot.edges.as_deref().unwrap_or_default();
        let mut per_kind: HashMap<String, usize> = HashMap::new();
        for edge in edges {
            let kind = edge.data.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
            *per_kind.entry(kind.to_string()).or_default() += 1;
        }
        ok("L8", format!("{} edges, by kind: {per_kind:?}", edges.len()))
    }

    /// L9: at least one agent registered.
    fn check_agents(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let count = snapshot.agents.as_deref().map_or(0, <[_]>::len);
        if count == 0 {
            warn("L9", "no agents registered yet")
        } else {
            ok("L9", format!("{count} agents registered"))
        }
    }

    /// L10 (part 1): trajectory reward variance > 0; a flat reward
    /// signals a reward-computation regression.
    fn check_trajectory_variance(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let rewards: Vec<f64> = snapshot
            .trajectories
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|t| t.reward)
            .collect();
        if rewards.len() < 2 {
            return warn("L10a", "fewer than two trajectories, variance undefined");
        }
        let mean = rewards.iter().sum::<f64>() / rewards.len() as f64;
        let variance = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rewards.len() as f64;
        if variance <= f64::EPSILON {
            fail("L10a", "trajectory rewards are flat, likely reward-computation regression")
        } else {
            ok("L10a", format!("trajectory reward variance {variance:.4}"))
        }
    }

    /// L10 (part 2): stats keys populated.
    fn check_stats_populated(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        const REQUIRED: [&str; 5] = [
            "total_memories",
            "total_patterns",
            "total_edges",
            "total_agents",
            "embedding_dimension",
        ];
        let present: HashMap<&str, &str> = snapshot
            .stats
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|s| (s.key.as_str(), s.value.as_str()))
            .collect();
        let missing: Vec<&str> = REQUIRED.iter().filter(|k| !present.contains_key(*k)).copied().collect();
        if missing.is_empty() {
            ok("L10b", "required stats keys populated")
        } else {
            warn("L10b", format!("missing stats keys: {}", missing.join(", ")))
        }
    }

    /// L10 (part 3): consolidation freshness under 24 hours.
    fn check_consolidation_freshness(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let last = snapshot
            .stats
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|s| s.key == "last_consolidation")
            .and_then(|s| s.value.parse::<i64>().ok());
        match last {
            Some(ts) if crate::types::now_secs() - ts < 24 * 3600 => ok("L10c", "consolidation ran within 24h"),
            Some(ts) => warn("L10c", format!("last consolidation {} seconds ago", crate::types::now_secs() - ts)),
            None => warn("L10c", "no consolidation has run yet"),
        }
    }

    /// `rl_stats`: per-algorithm update counts and convergence, surfaced
    /// from [`RLEngine::stats`]/[`RLEngine::convergence_score`]. Never
    /// fails on its own; a flat-reward regression is already caught by
    /// `L10a`. Reports `warn` on a fresh store where no algorithm has an
    /// update yet, since that is the expected state right after install.
    async fn check_learning_progress(&self) -> Result<HealthCheck> {
        let engine = RLEngine::load(self.store).await?;
        let stats = engine.stats();

        let active: Vec<(&str, u64, f64)> = RL_ALGORITHMS
            .iter()
            .filter_map(|&name| stats.get(name).map(|s| (name, s.update_count, engine.convergence_score(name))))
            .filter(|(_, count, _)| *count > 0)
            .collect();

        if active.is_empty() {
            return Ok(warn("rl_stats", "no reinforcement-learning updates recorded yet"));
        }

        let mean_convergence = active.iter().map(|(_, _, c)| c).sum::<f64>() / active.len() as f64;
        Ok(ok(
            "rl_stats",
            format!("{} of 9 algorithms have update history, mean convergence {mean_convergence:.3}", active.len()),
        ))
    }

    /// Parity: JSON mirror memory count vs database memory count.
    fn check_parity(&self, snapshot: &StoreSnapshot) -> HealthCheck {
        let mirror_path = self.store.json_mirror_path();
        if !mirror_path.exists() {
            return ok("parity", "JSON mirror absent, nothing to compare");
        }
        let Ok(contents) = std::fs::read_to_string(mirror_path) else {
            return warn("parity", "JSON mirror present but unreadable");
        };
        let Ok(mirror) = serde_json::from_str::<StoreSnapshot>(&contents) else {
            return warn("parity", "JSON mirror present but malformed");
        };
        let db_count = snapshot.memories.as_deref().map_or(0, <[_]>::len);
        let mirror_count = mirror.memories.as_deref().map_or(0, <[_]>::len);
        if db_count == mirror_count {
            ok("parity", format!("{db_count} memories in both DB and mirror"))
        } else {
            fail("parity", format!("DB has {db_count} memories, mirror has {mirror_count}"))
        }
    }
}

fn ok(id: &'static str, message: impl Into<String>) -> HealthCheck {
    HealthCheck { id, level: Level::Ok, message: message.into() }
}

fn warn(id: &'static str, message: impl Into<String>) -> HealthCheck {
    HealthCheck { id, level: Level::Warn, message: message.into() }
}

fn fail(id: &'static str, message: impl Into<String>) -> HealthCheck {
    HealthCheck { id, level: Level::Fail, message: message.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_fresh_store_has_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.root = dir.path().to_path_buf();
        cfg.sqlite_path = dir.path().join("intelligence.db");
        cfg.json_mirror_path = dir.path().join("intelligence.json");
        cfg.kv_path = dir.path().join("kv.json");
        let store = Store::open(&cfg).await.unwrap();
        let report = Validator::new(&store, &cfg).run().await.unwrap();
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn bad_embedding_dimension_fails_l5() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.root = dir.path().to_path_buf();
        cfg.sqlite_path = dir.path().join("intelligence.db");
        cfg.json_mirror_path = dir.path().join("intelligence.json");
        cfg.kv_path = dir.path().join("kv.json");
        cfg.embedding_dim = 384;
        let store = Store::open(&cfg).await.unwrap();

        let memory = crate::types::Memory {
            id: "mem-1".to_string(),
            kind: crate::types::MemoryKind::General,
            content: "x".to_string(),
            embedding: Some(vec![0u8; 7]),
            metadata: serde_json::json!({}),
            timestamp: crate::types::now_secs(),
        };
        store.add_memory(&memory).await.unwrap();

        let report = Validator::new(&store, &cfg).run().await.unwrap();
        assert!(!report.is_healthy());
        let l5 = report.checks.iter().find(|c| c.id == "L5").unwrap();
        assert_eq!(l5.level, Level::Fail);
    }

    #[tokio::test]
    async fn rl_stats_warns_before_any_update_and_oks_after() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.root = dir.path().to_path_buf();
        cfg.sqlite_path = dir.path().join("intelligence.db");
        cfg.json_mirror_path = dir.path().join("intelligence.json");
        cfg.kv_path = dir.path().join("kv.json");
        let store = Store::open(&cfg).await.unwrap();

        let report = Validator::new(&store, &cfg).run().await.unwrap();
        let fresh = report.checks.iter().find(|c| c.id == "rl_stats").unwrap();
        assert_eq!(fresh.level, Level::Warn);

        let mut engine = RLEngine::load(&store).await.unwrap();
        engine.learn("q-learning", "s", "a", 0.5, 0.1).unwrap();
        engine.persist(&store).await.unwrap();

        let report = Validator::new(&store, &cfg).run().await.unwrap();
        let warmed = report.checks.iter().find(|c| c.id == "rl_stats").unwrap();
        assert_eq!(warmed.level, Level::Ok);
        assert!(report.is_healthy());
    }
}
