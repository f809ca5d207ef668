//! # HookRouter (C7)
//!
//! Dispatches one named host event into C3–C6 per the table in `spec.md`
//! §4.7. Grounded in the teacher's `memory-cli/src/main.rs` thin
//! dispatch-to-library-function shape: this module holds all the
//! decision logic, `memory-cli`'s subcommand handlers just call
//! [`dispatch`] and print the [`EventOutcome`].

use crate::config::Config;
use crate::consolidate::Consolidator;
use crate::embeddings::{select_backend, unpack};
use crate::error::Result;
use crate::pipeline::MemoryPipeline;
use crate::rl::{OpenTrajectory, RLEngine};
use crate::sona::SonaCompressor;
use crate::store::Store;
use crate::types::{now_secs, HookEvent, MemoryKind};
use serde::Serialize;

/// Outcome of one dispatched event, printed by `memory-cli`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventOutcome {
    /// Human-readable summary line.
    pub summary: String,
    /// Reward assigned, for edit/command events.
    pub reward: Option<f64>,
    /// Q-value after the update, for edit/command events.
    pub q_value: Option<f64>,
    /// Number of neural patterns synthesized, for `consolidate`.
    pub patterns_created: Option<usize>,
    /// Number of memories seeded, for `pretrain`.
    pub memories_seeded: Option<usize>,
    /// Number of rows re-embedded, for `re-embed`.
    pub rows_re_embedded: Option<usize>,
}

/// Dispatch one [`HookEvent`] against an already-open store, completing in
/// a single process and (per event) a single transaction.
#[tracing::instrument(skip(store, cfg, event))]
pub async fn dispatch(store: &Store, cfg: &Config, event: HookEvent) -> Result<EventOutcome> {
    match event {
        HookEvent::SessionStart { agent } => session_start(store, cfg, &agent).await,
        HookEvent::PreCommand { command } => pre_command(store, &command).await,
        HookEvent::PostEdit { path, success } => post_edit(store, cfg, &path, success).await,
        HookEvent::PostCommand { command, success } => post_command(store, cfg, &command, success).await,
        HookEvent::SessionEnd => session_end(store, cfg).await,
        HookEvent::Consolidate => consolidate(store, cfg).await,
        HookEvent::Pretrain { files } => pretrain(store, cfg, &files).await,
        HookEvent::ReEmbed => re_embed(store, cfg).await,
    }
}

async fn session_start(store: &Store, cfg: &Config, agent: &str) -> Result<EventOutcome> {
    store.register_agent(agent, "session-start").await?;
    store.increment_session_count(agent).await?;

    let mut warmed = 0;
    if cfg.sona_enabled {
        let sona = SonaCompressor::new(crate::sona::DEFAULT_MAX_PATTERNS);
        warmed = sona.replay_trajectories(store, cfg.embedding_dim).await?;
    }

    Ok(EventOutcome {
        summary: format!("session started for {agent}, {warmed} trajectories replayed"),
        ..Default::default()
    })
}

async fn pre_command(store: &Store, command: &str) -> Result<EventOutcome> {
    store.set_kv("lastPendingCommand", command).await?;
    store.set_kv("lastPendingCommandTimestamp", &now_secs().to_string()).await?;
    Ok(EventOutcome {
        summary: format!("tracked pending command: {command}"),
        ..Default::default()
    })
}

async fn post_edit(store: &Store, cfg: &Config, path: &str, success: bool) -> Result<EventOutcome> {
    let handle = select_backend(cfg).await;
    let pipeline = MemoryPipeline::new(handle.embedder.as_ref());
    let metadata = serde_json::json!({ "source": "hook", "success": success, "path": path });
    let memory = pipeline.ingest_edit(store, path, metadata).await?;
    let state_embedding = memory.embedding.as_deref().map(unpack).unwrap_or_default();

    let last_any = store.get_kv("lastEditTimestamp").await?;
    let last_same = store.get_kv(&format!("lastEdit:{path}")).await?;
    let now = now_secs();
    let seconds_since_any = last_any.and_then(|v| v.parse::<i64>().ok()).map(|t| now - t);
    let seconds_since_same = last_same.and_then(|v| v.parse::<i64>().ok()).map(|t| now - t);
    store.set_kv(&format!("lastEdit:{path}"), &now.to_string()).await?;

    let mut engine = RLEngine::load(store).await?;
    let reward = engine.rewards().edit_reward(path, success, seconds_since_same, seconds_since_any);
    let entry = engine.learn(&cfg.q_learning_algorithm, "edit", path, reward, cfg.learning_rate)?;
    engine.persist(store).await?;

    let mut trajectory = OpenTrajectory::begin(state_embedding.clone());
    trajectory.step(state_embedding.clone(), state_embedding, reward);
    trajectory.end(store, reward).await?;

    if cfg.sona_enabled {
        SonaCompressor::new(crate::sona::DEFAULT_MAX_PATTERNS).tick();
    }

    Ok(EventOutcome {
        summary: format!("post-edit {path} reward={reward:.3} q={:.3}", entry.q_value),
        reward: Some(reward),
        q_value: Some(entry.q_value),
        ..Default::default()
    })
}

async fn post_command(store: &Store, cfg: &Config, command: &str, success: bool) -> Result<EventOutcome> {
    let handle = select_backend(cfg).await;
    let pipeline = MemoryPipeline::new(handle.embedder.as_ref());
    let metadata = serde_json::json!({ "source": "hook", "success": success });
    let memory = pipeline.ingest_command(store, command, metadata).await?;
    let state_embedding = memory.embedding.as_deref().map(unpack).unwrap_or_default();

    let mut engine = RLEngine::load(store).await?;
    let reward = engine.rewards().command_reward(command, success);
    let entry = engine.learn(&cfg.q_learning_algorithm, "command", command, reward, cfg.learning_rate)?;
    engine.persist(store).await?;

    let mut trajectory = OpenTrajectory::begin(state_embedding.clone());
    trajectory.step(state_embedding.clone(), state_embedding, reward);
    trajectory.end(store, reward).await?;

    Ok(EventOutcome {
        summary: format!("post-command reward={reward:.3} q={:.3}", entry.q_value),
        reward: Some(reward),
        q_value: Some(entry.q_value),
        ..Default::default()
    })
}

async fn session_end(store: &Store, cfg: &Config) -> Result<EventOutcome> {
    let consolidator = Consolidator::new(cfg);
    let report = consolidator.consolidate(store, "setup-agent").await?;

    let sona = SonaCompressor::new(crate::sona::DEFAULT_MAX_PATTERNS);
    if cfg.sona_enabled && cfg.dream_cycle_enabled {
        sona.sona_consolidate(store, cfg.embedding_dim).await?;
    }

    store.increment_total_sessions().await?;

    let mut engine = RLEngine::load(store).await?;
    engine.persist(store).await?;
    sona.force_learn();
    sona.flush();

    Ok(EventOutcome {
        summary: format!("session ended, {} patterns synthesized", report.patterns_created),
        patterns_created: Some(report.patterns_created),
        ..Default::default()
    })
}

async fn consolidate(store: &Store, cfg: &Config) -> Result<EventOutcome> {
    let consolidator = Consolidator::new(cfg);
    let report = consolidator.consolidate(store, "setup-agent").await?;
    Ok(EventOutcome {
        summary: format!(
            "consolidated: {} patterns, {} temporal, {} pattern, {} semantic edges",
            report.patterns_created, report.temporal_edges, report.pattern_edges, report.semantic_edges
        ),
        patterns_created: Some(report.patterns_created),
        ..Default::default()
    })
}

async fn pretrain(store: &Store, cfg: &Config, files: &[String]) -> Result<EventOutcome> {
    if cfg.pretrain_done {
        return Ok(EventOutcome {
            summary: "pretrain skipped, already done".to_string(),
            memories_seeded: Some(0),
            ..Default::default()
        });
    }

    let handle = select_backend(cfg).await;
    let pipeline = MemoryPipeline::new(handle.embedder.as_ref());
    let mut seeded = 0;
    for file in files {
        let content = crate::embeddings::enrich_edit_content(file);
        pipeline
            .ingest(store, MemoryKind::Foundation, &content, serde_json::json!({ "source": "pretrain" }))
            .await?;
        seeded += 1;
    }
    store.set_kv("pretrain_done", "true").await?;

    Ok(EventOutcome {
        summary: format!("pretrain seeded {seeded} files"),
        memories_seeded: Some(seeded),
        ..Default::default()
    })
}

async fn re_embed(store: &Store, cfg: &Config) -> Result<EventOutcome> {
    let handle = select_backend(cfg).await;
    let snapshot = store.load_all().await?;
    let memories = snapshot.memories.unwrap_or_default();
    let expected_bytes = 4 * cfg.embedding_dim;

    let mut re_embedded = 0;
    for memory in memories {
        let needs_reembed = memory
            .embedding
            .as_ref()
            .is_none_or(|bytes| bytes.len() != expected_bytes);
        if !needs_reembed {
            continue;
        }
        let vector = handle.embedder.embed(&memory.content).await?;
        store.update_memory_embedding(&memory.id, &crate::embeddings::pack(&vector)).await?;
        re_embedded += 1;
    }

    Ok(EventOutcome {
        summary: format!("re-embedded {re_embedded} rows"),
        rows_re_embedded: Some(re_embedded),
        ..Default::default()
    })
}
