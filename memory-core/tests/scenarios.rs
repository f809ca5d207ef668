//! End-to-end walk-throughs of the concrete scenarios named in `spec.md`
//! §8, driven through the public [`do_memory_core::dispatch`] surface
//! exactly as `memory-cli` calls it. Grounded in the teacher's
//! `tests/storage_sync.rs`/`tests/learning_cycle.rs` full-roundtrip style:
//! open a store in a tempdir, dispatch a sequence of events, assert on the
//! resulting snapshot rather than on internal module state.

use do_memory_core::validator::{Level, Validator};
use do_memory_core::{dispatch, Config, HookEvent, Store};

/// A store configured the way a host with the optional semantic feature
/// turned off would run it: the hash embedder always produces
/// [`do_memory_core::embeddings::HASH_FALLBACK_DIM`]-wide vectors, so
/// `embedding_dim` is set to match rather than the semantic default.
async fn open_test_store() -> (tempfile::TempDir, Config, Store) {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.root = dir.path().to_path_buf();
    cfg.sqlite_path = dir.path().join("intelligence.db");
    cfg.json_mirror_path = dir.path().join("intelligence.json");
    cfg.kv_path = dir.path().join("kv.json");
    cfg.hnsw_path = dir.path().join("hnsw.db");
    cfg.embedding_dim = 64;
    let store = Store::open(&cfg).await.unwrap();
    (dir, cfg, store)
}

#[tokio::test]
async fn scenario_one_fresh_install_session_start_then_post_edit() {
    let (_dir, cfg, store) = open_test_store().await;

    dispatch(&store, &cfg, HookEvent::SessionStart { agent: "setup-agent".to_string() })
        .await
        .unwrap();
    let outcome = dispatch(
        &store,
        &cfg,
        HookEvent::PostEdit { path: "src/lib.rs".to_string(), success: true },
    )
    .await
    .unwrap();

    let snapshot = store.load_all().await.unwrap();
    let memories = snapshot.memories.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].kind, do_memory_core::types::MemoryKind::Edit);
    assert_eq!(memories[0].embedding.as_ref().unwrap().len(), 4 * cfg.embedding_dim);
    assert!(snapshot.file_sequences.unwrap_or_default().is_empty());

    let session_count = store.get_stat("session_count").await.unwrap();
    assert_eq!(session_count.as_deref(), Some("1"));

    // First edit ever, on a bonus-rewarded extension: reward is 1.0 and the
    // q-value after one update from a zero-initialized entry is `0.1 * 1.0`.
    assert!((outcome.reward.unwrap() - 1.0).abs() < 1e-9);
    assert!((outcome.q_value.unwrap() - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn scenario_two_immediate_repeat_edit_uses_retry_reward() {
    let (_dir, cfg, store) = open_test_store().await;

    dispatch(&store, &cfg, HookEvent::SessionStart { agent: "setup-agent".to_string() }).await.unwrap();
    let first =
        dispatch(&store, &cfg, HookEvent::PostEdit { path: "src/lib.rs".to_string(), success: true })
            .await
            .unwrap();
    let second =
        dispatch(&store, &cfg, HookEvent::PostEdit { path: "src/lib.rs".to_string(), success: true })
            .await
            .unwrap();

    assert!((first.reward.unwrap() - 1.0).abs() < 1e-9);
    assert!((second.reward.unwrap() - 0.4).abs() < 1e-9);

    let snapshot = store.load_all().await.unwrap();
    assert_eq!(snapshot.memories.unwrap().len(), 2);
}

#[tokio::test]
async fn scenario_three_post_command_records_command_memory() {
    let (_dir, cfg, store) = open_test_store().await;

    dispatch(&store, &cfg, HookEvent::SessionStart { agent: "setup-agent".to_string() }).await.unwrap();
    let outcome = dispatch(
        &store,
        &cfg,
        HookEvent::PostCommand { command: "git commit -m test".to_string(), success: true },
    )
    .await
    .unwrap();

    assert!((outcome.reward.unwrap() - 0.6).abs() < 1e-9);
    let snapshot = store.load_all().await.unwrap();
    let commands: Vec<_> = snapshot
        .memories
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.content.contains("git commit"))
        .collect();
    assert_eq!(commands.len(), 1);
}

#[tokio::test]
async fn scenario_four_session_end_consolidates_and_populates_compressed_patterns() {
    let (_dir, cfg, store) = open_test_store().await;

    dispatch(&store, &cfg, HookEvent::SessionStart { agent: "setup-agent".to_string() }).await.unwrap();
    for path in ["src/lib.rs", "src/main.rs", "src/util.rs"] {
        dispatch(&store, &cfg, HookEvent::PostEdit { path: path.to_string(), success: true })
            .await
            .unwrap();
    }
    dispatch(
        &store,
        &cfg,
        HookEvent::PostCommand { command: "cargo test".to_string(), success: true },
    )
    .await
    .unwrap();

    let outcome = dispatch(&store, &cfg, HookEvent::SessionEnd).await.unwrap();
    assert!(outcome.patterns_created.unwrap() >= 1);

    let snapshot = store.load_all().await.unwrap();
    assert!(snapshot.neural_patterns.unwrap_or_default().len() >= 1);
    let temporal = snapshot
        .edges
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.data.get("type").and_then(|v| v.as_str()) == Some("temporal"))
        .count();
    assert!(temporal >= 1);

    let last_consolidation: i64 = store
        .get_stat("last_consolidation")
        .await
        .unwrap()
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(do_memory_core::types::now_secs() - last_consolidation < 5);

    assert!(!store.get_compressed_patterns("edit:rs", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_five_validate_after_activity_reports_healthy() {
    let (_dir, cfg, store) = open_test_store().await;

    dispatch(&store, &cfg, HookEvent::SessionStart { agent: "setup-agent".to_string() }).await.unwrap();
    dispatch(&store, &cfg, HookEvent::PostEdit { path: "src/lib.rs".to_string(), success: true })
        .await
        .unwrap();
    dispatch(&store, &cfg, HookEvent::SessionEnd).await.unwrap();

    let report = Validator::new(&store, &cfg).run().await.unwrap();
    assert!(report.is_healthy(), "unexpected failures: {:?}", report.checks);
    let l5 = report.checks.iter().find(|c| c.id == "L5").unwrap();
    assert_eq!(l5.level, Level::Ok);
    let l9 = report.checks.iter().find(|c| c.id == "L9").unwrap();
    assert_ne!(l9.level, Level::Fail);
    let parity = report.checks.iter().find(|c| c.id == "parity").unwrap();
    assert_eq!(parity.level, Level::Ok);
}

#[tokio::test]
async fn scenario_six_corrupt_json_mirror_aborts_import_without_crashing() {
    let (_dir, cfg, store) = open_test_store().await;

    dispatch(&store, &cfg, HookEvent::SessionStart { agent: "setup-agent".to_string() }).await.unwrap();
    dispatch(&store, &cfg, HookEvent::PostEdit { path: "src/lib.rs".to_string(), success: true })
        .await
        .unwrap();

    let mirror_before = std::fs::read_to_string(&cfg.json_mirror_path).unwrap_or_default();
    let mut corrupted = mirror_before.clone();
    corrupted.push(',');
    std::fs::write(&cfg.json_mirror_path, &corrupted).unwrap();

    // `load_all` (invoked by every subsequent command, including the next
    // `session-start`) must not panic even though the mirror is malformed;
    // the database retains whatever it already had.
    let snapshot = store.load_all().await.unwrap();
    assert_eq!(snapshot.memories.unwrap_or_default().len(), 1);

    let report = Validator::new(&store, &cfg).run().await.unwrap();
    let parity = report.checks.iter().find(|c| c.id == "parity").unwrap();
    assert_ne!(parity.level, Level::Ok);
}
