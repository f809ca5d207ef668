//! # MemoryPipeline (C3)
//!
//! Embeds event content, upserts the memory row, and maintains the
//! recency/file-sequence bookkeeping in `kv_store` (`spec.md` §4.3).

use crate::embeddings::{enrich_edit_content, pack, Embedder};
use crate::error::Result;
use crate::store::Store;
use crate::types::{mint_id, now_secs, Memory, MemoryKind};
use serde_json::Value;

/// Accepts one event at a time and turns it into a persisted [`Memory`]
/// row plus file-sequence/recency bookkeeping.
pub struct MemoryPipeline<'a> {
    embedder: &'a dyn Embedder,
}

impl<'a> MemoryPipeline<'a> {
    /// Build a pipeline over the process's selected embedder.
    #[must_use]
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder }
    }

    /// Ingest a `post-edit` event: embeds the enriched edit content, upserts
    /// the memory row, and updates the file-sequence/recency bookkeeping.
    #[tracing::instrument(skip(self, store))]
    pub async fn ingest_edit(&self, store: &Store, path: &str, metadata: Value) -> Result<Memory> {
        let content = enrich_edit_content(path);
        let memory = self.ingest(store, MemoryKind::Edit, &content, metadata).await?;
        self.update_recency(store, path).await?;
        Ok(memory)
    }

    /// Ingest a `post-command` event: embeds the raw command string and
    /// upserts the memory row. Commands do not participate in the
    /// file-sequence bookkeeping.
    #[tracing::instrument(skip(self, store))]
    pub async fn ingest_command(&self, store: &Store, command: &str, metadata: Value) -> Result<Memory> {
        self.ingest(store, MemoryKind::Command, command, metadata).await
    }

    /// Ingest an arbitrary piece of content under the given `kind`, for
    /// callers outside the edit/command hot path (e.g. pretrain seeding).
    #[tracing::instrument(skip(self, store))]
    pub async fn ingest(&self, store: &Store, kind: MemoryKind, content: &str, metadata: Value) -> Result<Memory> {
        let embedding = self.embedder.embed(content).await?;
        let memory = Memory {
            id: mint_id("mem"),
            kind,
            content: content.to_string(),
            embedding: Some(pack(&embedding)),
            metadata,
            timestamp: now_secs(),
        };
        store.add_memory(&memory).await?;
        Ok(memory)
    }

    async fn update_recency(&self, store: &Store, path: &str) -> Result<()> {
        let prior = store.get_kv("lastEditedFile").await?;
        if let Some(prev) = prior {
            if prev != path {
                store.record_file_sequence(&prev, path).await?;
            }
        }
        store.set_kv("lastEditedFile", path).await?;
        store.set_kv("lastEditTimestamp", &now_secs().to_string()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embeddings::HashEmbedder;

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
    async fn ingest_edit_records_memory_and_recency() {
        let (store, _dir) = test_store().await;
        let embedder = HashEmbedder::new(64);
        let pipeline = MemoryPipeline::new(&embedder);

        pipeline.ingest_edit(&store, "src/lib.rs", Value::Null).await.unwrap();
        assert_eq!(store.get_kv("lastEditedFile").await.unwrap().as_deref(), Some("src/lib.rs"));
        assert!(store.get_kv("lastEditTimestamp").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_distinct_edit_records_file_sequence() {
        let (store, _dir) = test_store().await;
        let embedder = HashEmbedder::new(64);
        let pipeline = MemoryPipeline::new(&embedder);

        pipeline.ingest_edit(&store, "a.rs", Value::Null).await.unwrap();
        pipeline.ingest_edit(&store, "b.rs", Value::Null).await.unwrap();

        let seqs = store.load_all().await.unwrap().file_sequences.unwrap_or_default();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].from_file, "a.rs");
        assert_eq!(seqs[0].to_file, "b.rs");
    }

    #[tokio::test]
    async fn same_file_edit_does_not_record_sequence() {
        let (store, _dir) = test_store().await;
        let embedder = HashEmbedder::new(64);
        let pipeline = MemoryPipeline::new(&embedder);

        pipeline.ingest_edit(&store, "a.rs", Value::Null).await.unwrap();
        pipeline.ingest_edit(&store, "a.rs", Value::Null).await.unwrap();

        let seqs = store.load_all().await.unwrap().file_sequences.unwrap_or_default();
        assert!(seqs.is_empty());
    }
}
