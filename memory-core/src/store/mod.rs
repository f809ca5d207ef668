//! # Store (C1)
//!
//! SQL schema, transactions, upsert/delete reconciliation, and the JSON
//! mirror over a single embedded `libsql` database
//! (`spec.md` §3/§4.1).

mod json_mirror;
pub mod schema;
mod snapshot;

pub use snapshot::StoreSnapshot;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{
    Agent, CompressedPattern, Edge, EdgeKind, ErrorRecord, FileSequence, KvEntry, LearningData,
    Memory, NeuralPattern, QEntry, Stat, Trajectory,
};
use libsql::{params, Builder, Connection, Database};
use std::collections::HashSet;
use std::path::PathBuf;

/// Caps a fresh edge insertion's weight the way every subsequent upsert is
/// capped (`spec.md` §3).
const MAX_EDGE_WEIGHT: f64 = 10.0;

/// Owns the single embedded SQL database, the sibling JSON mirror path, and
/// the KV scratch-file path. All twelve tables' rows are exclusively owned
/// here; other components hold copies, never handles into SQL buffers.
pub struct Store {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    db_path: PathBuf,
    json_mirror_path: PathBuf,
    kv_path: PathBuf,
}

impl Store {
    /// Open (creating if absent) the database at `cfg.sqlite_path`, apply
    /// pragmas, and ensure all twelve tables and their indexes exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the file cannot be opened.
    pub async fn open(cfg: &Config) -> Result<Self> {
        let db_path = cfg.sqlite_path.clone();
        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(Error::Database)?;
        let conn = db.connect().map_err(Error::Database)?;

        conn.execute("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(Error::Database)?;
        conn.execute("PRAGMA synchronous=NORMAL", ())
            .await
            .map_err(Error::Database)?;
        conn.execute("PRAGMA busy_timeout=5000", ())
            .await
            .map_err(Error::Database)?;

        let store = Self {
            db,
            conn,
            db_path,
            json_mirror_path: cfg.json_mirror_path.clone(),
            kv_path: cfg.kv_path.clone(),
        };
        store.ensure_schema(cfg.embedding_dim).await?;
        Ok(store)
    }

    /// Create or migrate the schema. Re-runnable: every statement is
    /// `CREATE TABLE/INDEX IF NOT EXISTS`, plus the `neural_patterns`
    /// column-add migration named in `spec.md` §4.1.
    async fn ensure_schema(&self, _configured_dim: usize) -> Result<()> {
        for ddl in schema::CREATE_TABLES {
            self.conn.execute(ddl, ()).await.map_err(Error::Database)?;
        }
        for ddl in schema::CREATE_INDEXES {
            self.conn.execute(ddl, ()).await.map_err(Error::Database)?;
        }

        // Schema-evolution: add `embedding` to `neural_patterns` if an
        // older database lacks it.
        let mut has_embedding_col = false;
        let mut rows = self
            .conn
            .query("PRAGMA table_info(neural_patterns)", ())
            .await
            .map_err(Error::Database)?;
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let name: String = row.get(1).map_err(Error::Database)?;
            if name == "embedding" {
                has_embedding_col = true;
                break;
            }
        }
        if !has_embedding_col {
            self.conn
                .execute("ALTER TABLE neural_patterns ADD COLUMN embedding BLOB", ())
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Path to the sibling JSON mirror, for callers outside this module
    /// that need to inspect it directly (the Validator's parity check).
    #[must_use]
    pub fn json_mirror_path(&self) -> &std::path::Path {
        &self.json_mirror_path
    }

    /// Path to the SQL database file backing this store.
    #[must_use]
    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    /// Path to the KV scratch-file mirror.
    #[must_use]
    pub fn kv_path(&self) -> &std::path::Path {
        &self.kv_path
    }

    /// Load a full snapshot of every table. If the JSON mirror exists and
    /// is newer than the database by more than a second, import it first
    /// (`spec.md` §4.1).
    pub async fn load_all(&self) -> Result<StoreSnapshot> {
        if json_mirror::is_json_newer(&self.json_mirror_path, &self.db_path) {
            if let Some(mirror) = json_mirror::read_mirror(&self.json_mirror_path)? {
                self.save_all(&mirror).await?;
            }
        } else if !self.db_path.exists() || self.is_db_empty().await? {
            if let Some(mirror) = json_mirror::read_mirror(&self.json_mirror_path)? {
                if !mirror.is_fully_empty() {
                    self.save_all(&mirror).await?;
                }
            }
        }

        Ok(StoreSnapshot {
            memories: Some(self.all_memories().await?),
            q_entries: Some(self.all_q_entries().await?),
            trajectories: Some(self.all_trajectories().await?),
            learning_data: Some(self.all_learning_data().await?),
            neural_patterns: Some(self.all_neural_patterns().await?),
            edges: Some(self.all_edges().await?),
            agents: Some(self.all_agents().await?),
            compressed_patterns: Some(self.all_compressed_patterns(None, None).await?),
            file_sequences: Some(self.all_file_sequences().await?),
            errors: Some(self.all_errors().await?),
            stats: Some(self.all_stats().await?),
            kv_store: Some(self.all_kv().await?),
        })
    }

    async fn is_db_empty(&self) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM memories", ())
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            let count: i64 = row.get(0).map_err(Error::Database)?;
            return Ok(count == 0);
        }
        Ok(true)
    }

    /// Upsert every table named in `snapshot` inside one transaction.
    /// `None` fields leave their table untouched; `Some(vec![])` leaves the
    /// table untouched if the database already holds rows for it — this is
    /// the guard against a concurrent late-loading writer wiping rows
    /// (`spec.md` §4.1).
    pub async fn save_all(&self, snapshot: &StoreSnapshot) -> Result<()> {
        self.conn.execute("BEGIN", ()).await.map_err(Error::Database)?;

        let result = self.save_all_inner(snapshot).await;

        match result {
            Ok(()) => {
                self.conn.execute("COMMIT", ()).await.map_err(Error::Database)?;
            }
            Err(err) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                return Err(err);
            }
        }

        // Mirror write-through, non-fatal on failure.
        let full = self.load_all_no_mirror_check().await?;
        json_mirror::write_mirror(&self.json_mirror_path, &full);
        self.write_kv_mirror(&full).await;

        Ok(())
    }

    async fn load_all_no_mirror_check(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            memories: Some(self.all_memories().await?),
            q_entries: Some(self.all_q_entries().await?),
            trajectories: Some(self.all_trajectories().await?),
            learning_data: Some(self.all_learning_data().await?),
            neural_patterns: Some(self.all_neural_patterns().await?),
            edges: Some(self.all_edges().await?),
            agents: Some(self.all_agents().await?),
            compressed_patterns: Some(self.all_compressed_patterns(None, None).await?),
            file_sequences: Some(self.all_file_sequences().await?),
            errors: Some(self.all_errors().await?),
            stats: Some(self.all_stats().await?),
            kv_store: Some(self.all_kv().await?),
        })
    }

    async fn write_kv_mirror(&self, snapshot: &StoreSnapshot) {
        if let Some(kv) = &snapshot.kv_store {
            let map: std::collections::HashMap<&str, &str> = kv
                .iter()
                .map(|e| (e.key.as_str(), e.value.as_str()))
                .collect();
            if let Ok(json) = serde_json::to_string_pretty(&map) {
                if let Err(err) = std::fs::write(&self.kv_path, json) {
                    tracing::warn!(error = %err, "failed to write kv.json mirror");
                }
            }
        }
    }

    async fn save_all_inner(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(rows) = non_wiping(&snapshot.memories, self.all_memories().await?.len()) {
            self.reconcile_memories(rows).await?;
        }
        if let Some(rows) = non_wiping(&snapshot.q_entries, self.all_q_entries().await?.len()) {
            self.reconcile_keyed(
                "q_entries",
                "key",
                rows,
                |r| r.key.clone(),
                |conn, r| async move {
                    conn.execute(
                        "INSERT INTO q_entries (key, state, action, q_value, visits, last_update) \
                         VALUES (?,?,?,?,?,?) \
                         ON CONFLICT(key) DO UPDATE SET state=excluded.state, action=excluded.action, \
                         q_value=excluded.q_value, visits=excluded.visits, last_update=excluded.last_update",
                        params![r.key.clone(), r.state.clone(), r.action.clone(), r.q_value, r.visits as i64, r.last_update],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) =
            non_wiping(&snapshot.trajectories, self.all_trajectories().await?.len())
        {
            self.reconcile_keyed(
                "trajectories",
                "id",
                rows,
                |r| r.id.clone(),
                |conn, r| async move {
                    conn.execute(
                        "INSERT INTO trajectories (id, state, action, outcome, reward, timestamp) \
                         VALUES (?,?,?,?,?,?) \
                         ON CONFLICT(id) DO UPDATE SET state=excluded.state, action=excluded.action, \
                         outcome=excluded.outcome, reward=excluded.reward, timestamp=excluded.timestamp",
                        params![r.id.clone(), r.state.clone(), r.action.clone(), r.outcome.clone(), r.reward, r.timestamp],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) =
            non_wiping(&snapshot.learning_data, self.all_learning_data().await?.len())
        {
            self.reconcile_keyed(
                "learning_data",
                "algorithm",
                rows,
                |r| r.algorithm.clone(),
                |conn, r| async move {
                    conn.execute(
                        "INSERT INTO learning_data (algorithm, q_table_json) VALUES (?,?) \
                         ON CONFLICT(algorithm) DO UPDATE SET q_table_json=excluded.q_table_json",
                        params![r.algorithm.clone(), r.q_table_json.clone()],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) = non_wiping(
            &snapshot.neural_patterns,
            self.all_neural_patterns().await?.len(),
        ) {
            self.reconcile_keyed(
                "neural_patterns",
                "id",
                rows,
                |r| r.id.clone(),
                |conn, r| async move {
                    let metadata = serde_json::to_string(&r.metadata)?;
                    conn.execute(
                        "INSERT INTO neural_patterns (id, content, category, embedding, confidence, usage, created_at, updated_at, metadata) \
                         VALUES (?,?,?,?,?,?,?,?,?) \
                         ON CONFLICT(id) DO UPDATE SET content=excluded.content, category=excluded.category, \
                         embedding=excluded.embedding, confidence=excluded.confidence, usage=excluded.usage, \
                         updated_at=excluded.updated_at, metadata=excluded.metadata",
                        params![r.id.clone(), r.content.clone(), r.category.clone(), r.embedding.clone(), r.confidence, r.usage as i64, r.created_at, r.updated_at, metadata],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) = non_wiping(&snapshot.edges, self.all_edges().await?.len()) {
            // Edges use DELETE-all + bulk INSERT: the primary key is
            // auto-generated, so per-row reconciliation does not apply
            // (`spec.md` §4.1).
            self.conn
                .execute("DELETE FROM edges", ())
                .await
                .map_err(Error::Database)?;
            for e in rows {
                let data = serde_json::to_string(&e.data)?;
                self.conn
                    .execute(
                        "INSERT INTO edges (source, target, weight, data) VALUES (?,?,?,?)",
                        params![e.source.clone(), e.target.clone(), e.weight, data],
                    )
                    .await
                    .map_err(Error::Database)?;
            }
        }
        if let Some(rows) = non_wiping(&snapshot.agents, self.all_agents().await?.len()) {
            self.reconcile_keyed(
                "agents",
                "name",
                rows,
                |r| r.name.clone(),
                |conn, r| async move {
                    let data = serde_json::to_string(&r.data)?;
                    conn.execute(
                        "INSERT INTO agents (name, data_json) VALUES (?,?) \
                         ON CONFLICT(name) DO UPDATE SET data_json=excluded.data_json",
                        params![r.name.clone(), data],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) = non_wiping(
            &snapshot.compressed_patterns,
            self.all_compressed_patterns(None, None).await?.len(),
        ) {
            self.reconcile_keyed(
                "compressed_patterns",
                "id",
                rows,
                |r| r.id.clone(),
                |conn, r| async move {
                    let metadata = serde_json::to_string(&r.metadata)?;
                    conn.execute(
                        "INSERT INTO compressed_patterns (id, layer, data_blob, compression_ratio, created_at, metadata) \
                         VALUES (?,?,?,?,?,?) \
                         ON CONFLICT(id) DO UPDATE SET layer=excluded.layer, data_blob=excluded.data_blob, \
                         compression_ratio=excluded.compression_ratio, metadata=excluded.metadata",
                        params![r.id.clone(), r.layer.clone(), r.data_blob.clone(), r.compression_ratio, r.created_at, metadata],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) = non_wiping(
            &snapshot.file_sequences,
            self.all_file_sequences().await?.len(),
        ) {
            let existing: HashSet<(String, String)> = self
                .all_file_sequences()
                .await?
                .into_iter()
                .map(|f| (f.from_file, f.to_file))
                .collect();
            let mut touched = HashSet::new();
            for r in rows {
                touched.insert((r.from_file.clone(), r.to_file.clone()));
                self.conn
                    .execute(
                        "INSERT INTO file_sequences (from_file, to_file, count) VALUES (?,?,?) \
                         ON CONFLICT(from_file, to_file) DO UPDATE SET count=excluded.count",
                        params![r.from_file.clone(), r.to_file.clone(), r.count as i64],
                    )
                    .await
                    .map_err(Error::Database)?;
            }
            for (from_file, to_file) in existing.difference(&touched) {
                self.conn
                    .execute(
                        "DELETE FROM file_sequences WHERE from_file = ? AND to_file = ?",
                        params![from_file.clone(), to_file.clone()],
                    )
                    .await
                    .map_err(Error::Database)?;
            }
        }
        if let Some(rows) = non_wiping(&snapshot.errors, self.all_errors().await?.len()) {
            self.reconcile_keyed(
                "errors",
                "key",
                rows,
                |r| r.key.clone(),
                |conn, r| async move {
                    let data = serde_json::to_string(&r.data)?;
                    conn.execute(
                        "INSERT INTO errors (key, data_json) VALUES (?,?) \
                         ON CONFLICT(key) DO UPDATE SET data_json=excluded.data_json",
                        params![r.key.clone(), data],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) = non_wiping(&snapshot.stats, self.all_stats().await?.len()) {
            self.reconcile_keyed(
                "stats",
                "key",
                rows,
                |r| r.key.clone(),
                |conn, r| async move {
                    conn.execute(
                        "INSERT INTO stats (key, value_text) VALUES (?,?) \
                         ON CONFLICT(key) DO UPDATE SET value_text=excluded.value_text",
                        params![r.key.clone(), r.value.clone()],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        if let Some(rows) = non_wiping(&snapshot.kv_store, self.all_kv().await?.len()) {
            self.reconcile_keyed(
                "kv_store",
                "key",
                rows,
                |r| r.key.clone(),
                |conn, r| async move {
                    conn.execute(
                        "INSERT INTO kv_store (key, value_text) VALUES (?,?) \
                         ON CONFLICT(key) DO UPDATE SET value_text=excluded.value_text",
                        params![r.key.clone(), r.value.clone()],
                    )
                    .await
                    .map_err(Error::Database)
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn reconcile_memories(&self, rows: &[Memory]) -> Result<()> {
        let existing: HashSet<String> =
            self.all_memories().await?.into_iter().map(|m| m.id).collect();
        let mut touched = HashSet::new();
        for m in rows {
            touched.insert(m.id.clone());
            let metadata = serde_json::to_string(&m.metadata)?;
            let kind = serde_json::to_string(&m.kind)?;
            let kind = kind.trim_matches('"');
            self.conn
                .execute(
                    "INSERT INTO memories (id, kind, content, embedding, metadata, timestamp) \
                     VALUES (?,?,?,?,?,?) \
                     ON CONFLICT(id) DO UPDATE SET kind=excluded.kind, content=excluded.content, \
                     embedding=excluded.embedding, metadata=excluded.metadata, timestamp=excluded.timestamp",
                    params![m.id.clone(), kind.to_string(), m.content.clone(), m.embedding.clone(), metadata, m.timestamp],
                )
                .await
                .map_err(Error::Database)?;
        }
        for stale in existing.difference(&touched) {
            self.conn
                .execute("DELETE FROM memories WHERE id = ?", params![stale.clone()])
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Generic stale-row reconciliation for tables keyed by a single
    /// string primary key (`spec.md` §4.1).
    async fn reconcile_keyed<T, K, F, Fut>(
        &self,
        table: &str,
        pk_col: &str,
        rows: &[T],
        key_of: K,
        upsert: F,
    ) -> Result<()>
    where
        K: Fn(&T) -> String,
        F: Fn(&Connection, &T) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let existing: HashSet<String> = self.existing_keys(table, pk_col).await?;
        let mut touched = HashSet::new();
        for r in rows {
            let key = key_of(r);
            touched.insert(key);
            upsert(&self.conn, r).await?;
        }
        for stale in existing.difference(&touched) {
            let sql = format!("DELETE FROM {table} WHERE {pk_col} = ?");
            self.conn
                .execute(&sql, params![stale.clone()])
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    async fn existing_keys(&self, table: &str, pk_col: &str) -> Result<HashSet<String>> {
        let sql = format!("SELECT {pk_col} FROM {table}");
        let mut rows = self.conn.query(&sql, ()).await.map_err(Error::Database)?;
        let mut out = HashSet::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let key: String = row.get(0).map_err(Error::Database)?;
            out.insert(key);
        }
        Ok(out)
    }

    // ---- full-table readers ----

    async fn all_memories(&self) -> Result<Vec<Memory>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, content, embedding, metadata, timestamp FROM memories",
                (),
            )
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let id: String = row.get(0).map_err(Error::Database)?;
            let kind_str: String = row.get(1).map_err(Error::Database)?;
            let Ok(kind) = serde_json::from_str(&format!("\"{kind_str}\"")) else {
                tracing::debug!(id = %id, kind = %kind_str, "skipping memory row with malformed kind");
                continue;
            };
            let content: String = row.get(2).map_err(Error::Database)?;
            let embedding: Option<Vec<u8>> = row.get(3).ok();
            let metadata_text: String = row.get(4).map_err(Error::Database)?;
            let Ok(metadata) = serde_json::from_str(&metadata_text) else {
                tracing::debug!(id = %id, "skipping memory row with malformed metadata");
                continue;
            };
            let timestamp: i64 = row.get(5).map_err(Error::Database)?;
            out.push(Memory {
                id,
                kind,
                content,
                embedding,
                metadata,
                timestamp,
            });
        }
        Ok(out)
    }

    async fn all_q_entries(&self) -> Result<Vec<QEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, state, action, q_value, visits, last_update FROM q_entries",
                (),
            )
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            out.push(QEntry {
                key: row.get(0).map_err(Error::Database)?,
                state: row.get(1).map_err(Error::Database)?,
                action: row.get(2).map_err(Error::Database)?,
                q_value: row.get(3).map_err(Error::Database)?,
                visits: {
                    let v: i64 = row.get(4).map_err(Error::Database)?;
                    v.max(0) as u64
                },
                last_update: row.get(5).map_err(Error::Database)?,
            });
        }
        Ok(out)
    }

    async fn all_trajectories(&self) -> Result<Vec<Trajectory>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, state, action, outcome, reward, timestamp FROM trajectories ORDER BY timestamp DESC",
                (),
            )
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            out.push(Trajectory {
                id: row.get(0).map_err(Error::Database)?,
                state: row.get(1).map_err(Error::Database)?,
                action: row.get(2).map_err(Error::Database)?,
                outcome: row.get(3).ok(),
                reward: row.get(4).ok(),
                timestamp: row.get(5).map_err(Error::Database)?,
            });
        }
        Ok(out)
    }

    async fn all_learning_data(&self) -> Result<Vec<LearningData>> {
        let mut rows = self
            .conn
            .query("SELECT algorithm, q_table_json FROM learning_data", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            out.push(LearningData {
                algorithm: row.get(0).map_err(Error::Database)?,
                q_table_json: row.get(1).map_err(Error::Database)?,
            });
        }
        Ok(out)
    }

    async fn all_neural_patterns(&self) -> Result<Vec<NeuralPattern>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content, category, embedding, confidence, usage, created_at, updated_at, metadata FROM neural_patterns",
                (),
            )
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let metadata_text: String = row.get(8).map_err(Error::Database)?;
            out.push(NeuralPattern {
                id: row.get(0).map_err(Error::Database)?,
                content: row.get(1).map_err(Error::Database)?,
                category: row.get(2).map_err(Error::Database)?,
                embedding: row.get(3).ok(),
                confidence: row.get(4).map_err(Error::Database)?,
                usage: {
                    let v: i64 = row.get(5).map_err(Error::Database)?;
                    v.max(0) as u64
                },
                created_at: row.get(6).map_err(Error::Database)?,
                updated_at: row.get(7).map_err(Error::Database)?,
                metadata: serde_json::from_str(&metadata_text).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(out)
    }

    async fn all_edges(&self) -> Result<Vec<Edge>> {
        let mut rows = self
            .conn
            .query("SELECT id, source, target, weight, data FROM edges", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let data_text: String = row.get(4).map_err(Error::Database)?;
            out.push(Edge {
                id: Some(row.get(0).map_err(Error::Database)?),
                source: row.get(1).map_err(Error::Database)?,
                target: row.get(2).map_err(Error::Database)?,
                weight: row.get(3).map_err(Error::Database)?,
                data: serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(out)
    }

    async fn all_agents(&self) -> Result<Vec<Agent>> {
        let mut rows = self
            .conn
            .query("SELECT name, data_json FROM agents", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let data_text: String = row.get(1).map_err(Error::Database)?;
            out.push(Agent {
                name: row.get(0).map_err(Error::Database)?,
                data: serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(out)
    }

    async fn all_compressed_patterns(
        &self,
        layer: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CompressedPattern>> {
        let sql = match layer {
            Some(_) => {
                "SELECT id, layer, data_blob, compression_ratio, created_at, metadata FROM compressed_patterns WHERE layer = ? ORDER BY created_at DESC"
            }
            None => {
                "SELECT id, layer, data_blob, compression_ratio, created_at, metadata FROM compressed_patterns ORDER BY created_at DESC"
            }
        };
        let mut rows = match layer {
            Some(l) => self.conn.query(sql, params![l.to_string()]).await,
            None => self.conn.query(sql, ()).await,
        }
        .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
            let metadata_text: String = row.get(5).map_err(Error::Database)?;
            out.push(CompressedPattern {
                id: row.get(0).map_err(Error::Database)?,
                layer: row.get(1).map_err(Error::Database)?,
                data_blob: row.get(2).map_err(Error::Database)?,
                compression_ratio: row.get(3).map_err(Error::Database)?,
                created_at: row.get(4).map_err(Error::Database)?,
                metadata: serde_json::from_str(&metadata_text).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(out)
    }

    async fn all_file_sequences(&self) -> Result<Vec<FileSequence>> {
        let mut rows = self
            .conn
            .query("SELECT from_file, to_file, count FROM file_sequences", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            out.push(FileSequence {
                from_file: row.get(0).map_err(Error::Database)?,
                to_file: row.get(1).map_err(Error::Database)?,
                count: {
                    let v: i64 = row.get(2).map_err(Error::Database)?;
                    v.max(0) as u64
                },
            });
        }
        Ok(out)
    }

    async fn all_errors(&self) -> Result<Vec<ErrorRecord>> {
        let mut rows = self
            .conn
            .query("SELECT key, data_json FROM errors", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let data_text: String = row.get(1).map_err(Error::Database)?;
            out.push(ErrorRecord {
                key: row.get(0).map_err(Error::Database)?,
                data: serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(out)
    }

    async fn all_stats(&self) -> Result<Vec<Stat>> {
        let mut rows = self
            .conn
            .query("SELECT key, value_text FROM stats", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            out.push(Stat {
                key: row.get(0).map_err(Error::Database)?,
                value: row.get(1).map_err(Error::Database)?,
            });
        }
        Ok(out)
    }

    async fn all_kv(&self) -> Result<Vec<KvEntry>> {
        let mut rows = self
            .conn
            .query("SELECT key, value_text FROM kv_store", ())
            .await
            .map_err(Error::Database)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            out.push(KvEntry {
                key: row.get(0).map_err(Error::Database)?,
                value: row.get(1).map_err(Error::Database)?,
            });
        }
        Ok(out)
    }

    // ---- atomic single-statement mutators (`spec.md` §4.1) ----

    /// Insert or replace a memory row.
    #[tracing::instrument(skip(self, memory), fields(id = %memory.id))]
    pub async fn add_memory(&self, memory: &Memory) -> Result<()> {
        let metadata = serde_json::to_string(&memory.metadata)?;
        let kind = serde_json::to_string(&memory.kind)?;
        let kind = kind.trim_matches('"');
        self.conn
            .execute(
                "INSERT INTO memories (id, kind, content, embedding, metadata, timestamp) \
                 VALUES (?,?,?,?,?,?) \
                 ON CONFLICT(id) DO UPDATE SET kind=excluded.kind, content=excluded.content, \
                 embedding=excluded.embedding, metadata=excluded.metadata, timestamp=excluded.timestamp",
                params![memory.id.clone(), kind.to_string(), memory.content.clone(), memory.embedding.clone(), metadata, memory.timestamp],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Back-fill a memory's embedding without touching other fields
    /// (the re-embed path, `spec.md` §4.2).
    #[tracing::instrument(skip(self, embedding))]
    pub async fn update_memory_embedding(&self, id: &str, embedding: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "UPDATE memories SET embedding = ? WHERE id = ?",
                params![embedding.to_vec(), id.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Append one trajectory step/terminal row.
    #[tracing::instrument(skip(self, trajectory))]
    pub async fn add_trajectory(&self, trajectory: &Trajectory) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO trajectories (id, state, action, outcome, reward, timestamp) \
                 VALUES (?,?,?,?,?,?) \
                 ON CONFLICT(id) DO UPDATE SET state=excluded.state, action=excluded.action, \
                 outcome=excluded.outcome, reward=excluded.reward, timestamp=excluded.timestamp",
                params![trajectory.id.clone(), trajectory.state.clone(), trajectory.action.clone(), trajectory.outcome.clone(), trajectory.reward, trajectory.timestamp],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Upsert `(from_file, to_file)`, incrementing `count`.
    #[tracing::instrument(skip(self))]
    pub async fn record_file_sequence(&self, from_file: &str, to_file: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO file_sequences (from_file, to_file, count) VALUES (?,?,1) \
                 ON CONFLICT(from_file, to_file) DO UPDATE SET count = count + 1",
                params![from_file.to_string(), to_file.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Record or bump a learned failure pattern.
    #[tracing::instrument(skip(self, data))]
    pub async fn add_error(&self, key: &str, data: &serde_json::Value) -> Result<()> {
        let data_json = serde_json::to_string(data)?;
        self.conn
            .execute(
                "INSERT INTO errors (key, data_json) VALUES (?,?) \
                 ON CONFLICT(key) DO UPDATE SET data_json=excluded.data_json",
                params![key.to_string(), data_json],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Write a KV scratchpad entry.
    #[tracing::instrument(skip(self, value))]
    pub async fn set_kv(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value_text) VALUES (?,?) \
                 ON CONFLICT(key) DO UPDATE SET value_text=excluded.value_text",
                params![key.to_string(), value.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Read a KV scratchpad entry.
    pub async fn get_kv(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_text FROM kv_store WHERE key = ?",
                params![key.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            Ok(Some(row.get(0).map_err(Error::Database)?))
        } else {
            Ok(None)
        }
    }

    /// Write a stat entry.
    pub async fn set_stat(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO stats (key, value_text) VALUES (?,?) \
                 ON CONFLICT(key) DO UPDATE SET value_text=excluded.value_text",
                params![key.to_string(), value.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Read a stat entry.
    pub async fn get_stat(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_text FROM stats WHERE key = ?",
                params![key.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            Ok(Some(row.get(0).map_err(Error::Database)?))
        } else {
            Ok(None)
        }
    }

    /// Persist a per-algorithm Q-table snapshot.
    pub async fn save_learning_data(&self, algorithm: &str, q_table_json: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO learning_data (algorithm, q_table_json) VALUES (?,?) \
                 ON CONFLICT(algorithm) DO UPDATE SET q_table_json=excluded.q_table_json",
                params![algorithm.to_string(), q_table_json.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Load a per-algorithm Q-table snapshot, if present.
    pub async fn load_learning_data(&self, algorithm: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT q_table_json FROM learning_data WHERE algorithm = ?",
                params![algorithm.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            Ok(Some(row.get(0).map_err(Error::Database)?))
        } else {
            Ok(None)
        }
    }

    /// Upsert a Q-value entry.
    pub async fn upsert_q_entry(&self, entry: &QEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO q_entries (key, state, action, q_value, visits, last_update) \
                 VALUES (?,?,?,?,?,?) \
                 ON CONFLICT(key) DO UPDATE SET q_value=excluded.q_value, visits=excluded.visits, last_update=excluded.last_update",
                params![entry.key.clone(), entry.state.clone(), entry.action.clone(), entry.q_value, entry.visits as i64, entry.last_update],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// All Q-entries currently stored, used to warm the RL engine's
    /// canonical table on load.
    pub async fn list_q_entries(&self) -> Result<Vec<QEntry>> {
        self.all_q_entries().await
    }

    /// Fetch a single Q-entry by key, if present.
    pub async fn get_q_entry(&self, key: &str) -> Result<Option<QEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, state, action, q_value, visits, last_update FROM q_entries WHERE key = ?",
                params![key.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            Ok(Some(QEntry {
                key: row.get(0).map_err(Error::Database)?,
                state: row.get(1).map_err(Error::Database)?,
                action: row.get(2).map_err(Error::Database)?,
                q_value: row.get(3).map_err(Error::Database)?,
                visits: {
                    let v: i64 = row.get(4).map_err(Error::Database)?;
                    v.max(0) as u64
                },
                last_update: row.get(5).map_err(Error::Database)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Insert or bump (by 0.1, capped, with usage++) a neural pattern
    /// (`spec.md` §4.1).
    pub async fn add_neural_pattern(&self, pattern: &NeuralPattern) -> Result<()> {
        if let Some(mut existing) = self.get_neural_pattern(&pattern.id).await? {
            existing.nudge(crate::types::now_secs());
            let metadata = serde_json::to_string(&existing.metadata)?;
            self.conn
                .execute(
                    "UPDATE neural_patterns SET confidence=?, usage=?, updated_at=?, metadata=? WHERE id=?",
                    params![existing.confidence, existing.usage as i64, existing.updated_at, metadata, existing.id.clone()],
                )
                .await
                .map_err(Error::Database)?;
        } else {
            let metadata = serde_json::to_string(&pattern.metadata)?;
            self.conn
                .execute(
                    "INSERT INTO neural_patterns (id, content, category, embedding, confidence, usage, created_at, updated_at, metadata) \
                     VALUES (?,?,?,?,?,?,?,?,?)",
                    params![pattern.id.clone(), pattern.content.clone(), pattern.category.clone(), pattern.embedding.clone(), pattern.confidence, pattern.usage as i64, pattern.created_at, pattern.updated_at, metadata],
                )
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    async fn get_neural_pattern(&self, id: &str) -> Result<Option<NeuralPattern>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content, category, embedding, confidence, usage, created_at, updated_at, metadata FROM neural_patterns WHERE id = ?",
                params![id.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            let metadata_text: String = row.get(8).map_err(Error::Database)?;
            Ok(Some(NeuralPattern {
                id: row.get(0).map_err(Error::Database)?,
                content: row.get(1).map_err(Error::Database)?,
                category: row.get(2).map_err(Error::Database)?,
                embedding: row.get(3).ok(),
                confidence: row.get(4).map_err(Error::Database)?,
                usage: {
                    let v: i64 = row.get(5).map_err(Error::Database)?;
                    v.max(0) as u64
                },
                created_at: row.get(6).map_err(Error::Database)?,
                updated_at: row.get(7).map_err(Error::Database)?,
                metadata: serde_json::from_str(&metadata_text).unwrap_or(serde_json::Value::Null),
            }))
        } else {
            Ok(None)
        }
    }

    /// All neural patterns, most recently updated first.
    pub async fn list_neural_patterns(&self, limit: Option<usize>) -> Result<Vec<NeuralPattern>> {
        let mut all = self.all_neural_patterns().await?;
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = limit {
            all.truncate(limit);
        }
        Ok(all)
    }

    /// Upsert an edge: if a row with the same `(source, target)` and
    /// `data.type` exists, its weight becomes `min(old + new, 10.0)` and its
    /// data is replaced; otherwise insert fresh (`spec.md` §4.1/§3).
    pub async fn add_edge(&self, source: &str, target: &str, kind: EdgeKind, weight: f64) -> Result<()> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, weight, data FROM edges WHERE source = ? AND target = ?",
                params![source.to_string(), target.to_string()],
            )
            .await
            .map_err(Error::Database)?;

        let mut existing_id: Option<i64> = None;
        let mut existing_weight = 0.0;
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let data_text: String = row.get(2).map_err(Error::Database)?;
            let data: serde_json::Value =
                serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null);
            if data.get("type").and_then(|t| t.as_str()) == Some(kind.as_str()) {
                existing_id = Some(row.get(0).map_err(Error::Database)?);
                existing_weight = row.get::<f64>(1).map_err(Error::Database)?;
                break;
            }
        }

        let data = serde_json::json!({ "type": kind.as_str() });
        let data_json = serde_json::to_string(&data)?;

        if let Some(id) = existing_id {
            let new_weight = (existing_weight + weight).min(MAX_EDGE_WEIGHT);
            self.conn
                .execute(
                    "UPDATE edges SET weight = ?, data = ? WHERE id = ?",
                    params![new_weight, data_json, id],
                )
                .await
                .map_err(Error::Database)?;
        } else {
            let capped = weight.min(MAX_EDGE_WEIGHT);
            self.conn
                .execute(
                    "INSERT INTO edges (source, target, weight, data) VALUES (?,?,?,?)",
                    params![source.to_string(), target.to_string(), capped, data_json],
                )
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// All edges of a given kind.
    pub async fn edges_of_kind(&self, kind: EdgeKind) -> Result<Vec<Edge>> {
        Ok(self
            .all_edges()
            .await?
            .into_iter()
            .filter(|e| e.data.get("type").and_then(|t| t.as_str()) == Some(kind.as_str()))
            .collect())
    }

    /// Whether a `(source, target)` pair already has an edge of `kind`.
    pub async fn has_edge(&self, source: &str, target: &str, kind: EdgeKind) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT data FROM edges WHERE (source = ? AND target = ?) OR (source = ? AND target = ?)",
                params![source.to_string(), target.to_string(), target.to_string(), source.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        while let Some(row) = rows.next().await.map_err(Error::Database)? {
            let data_text: String = row.get(0).map_err(Error::Database)?;
            let data: serde_json::Value =
                serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null);
            if data.get("type").and_then(|t| t.as_str()) == Some(kind.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Upsert an agent, merging `last_seen`, incrementing
    /// `session_count`, and recording `last_session` (`spec.md` §4.1).
    pub async fn register_agent(&self, name: &str, session_label: &str) -> Result<()> {
        let now = crate::types::now_secs();
        let existing = self.get_agent(name).await?;
        let data = if let Some(existing) = existing {
            let session_count = existing
                .data
                .get("session_count")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0)
                + 1;
            let first_seen = existing
                .data
                .get("first_seen")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(now);
            serde_json::json!({
                "first_seen": first_seen,
                "last_seen": now,
                "last_session": session_label,
                "session_count": session_count,
            })
        } else {
            serde_json::json!({
                "first_seen": now,
                "last_seen": now,
                "last_session": session_label,
                "session_count": 1,
            })
        };
        let data_json = serde_json::to_string(&data)?;
        self.conn
            .execute(
                "INSERT INTO agents (name, data_json) VALUES (?,?) \
                 ON CONFLICT(name) DO UPDATE SET data_json=excluded.data_json",
                params![name.to_string(), data_json],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn get_agent(&self, name: &str) -> Result<Option<Agent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, data_json FROM agents WHERE name = ?",
                params![name.to_string()],
            )
            .await
            .map_err(Error::Database)?;
        if let Some(row) = rows.next().await.map_err(Error::Database)? {
            let data_text: String = row.get(1).map_err(Error::Database)?;
            Ok(Some(Agent {
                name: row.get(0).map_err(Error::Database)?,
                data: serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null),
            }))
        } else {
            Ok(None)
        }
    }

    /// Insert or replace a compressed pattern by id; mints a fresh uuid
    /// when the pattern has none.
    pub async fn save_compressed_pattern(&self, pattern: &CompressedPattern) -> Result<()> {
        let metadata = serde_json::to_string(&pattern.metadata)?;
        self.conn
            .execute(
                "INSERT INTO compressed_patterns (id, layer, data_blob, compression_ratio, created_at, metadata) \
                 VALUES (?,?,?,?,?,?) \
                 ON CONFLICT(id) DO UPDATE SET layer=excluded.layer, data_blob=excluded.data_blob, \
                 compression_ratio=excluded.compression_ratio, metadata=excluded.metadata",
                params![pattern.id.clone(), pattern.layer.clone(), pattern.data_blob.clone(), pattern.compression_ratio, pattern.created_at, metadata],
            )
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Evict the oldest compressed patterns in `layer` beyond `max_patterns`.
    pub async fn evict_compressed_patterns(&self, layer: &str, max_patterns: usize) -> Result<()> {
        let all = self.all_compressed_patterns(Some(layer), None).await?;
        if all.len() <= max_patterns {
            return Ok(());
        }
        for stale in &all[max_patterns..] {
            self.conn
                .execute(
                    "DELETE FROM compressed_patterns WHERE id = ?",
                    params![stale.id.clone()],
                )
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Compressed patterns for `layer`, most recent first, capped at `limit`.
    pub async fn get_compressed_patterns(
        &self,
        layer: &str,
        limit: usize,
    ) -> Result<Vec<CompressedPattern>> {
        self.all_compressed_patterns(Some(layer), Some(limit)).await
    }

    /// Increment `stats.session_count` and record `last_session`/`last_agent`.
    pub async fn increment_session_count(&self, agent: &str) -> Result<()> {
        let now = crate::types::now_secs();
        let current: i64 = self
            .get_stat("session_count")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        self.set_stat("session_count", &(current + 1).to_string()).await?;
        self.set_stat("last_session", &now.to_string()).await?;
        self.set_stat("last_agent", agent).await?;
        Ok(())
    }

    /// Increment `stats.total_sessions` and record `last_session_end`.
    pub async fn increment_total_sessions(&self) -> Result<()> {
        let now = crate::types::now_secs();
        let current: i64 = self
            .get_stat("total_sessions")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        self.set_stat("total_sessions", &(current + 1).to_string()).await?;
        self.set_stat("last_session_end", &now.to_string()).await?;
        Ok(())
    }

    /// Run `f` inside one `BEGIN`/`COMMIT` bracket, rolling back on error —
    /// used by the Consolidator to make all of its emissions one
    /// transaction (`spec.md` §4.5).
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.conn.execute("BEGIN", ()).await.map_err(Error::Database)?;
        match f().await {
            Ok(value) => {
                self.conn.execute("COMMIT", ()).await.map_err(Error::Database)?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }
}

/// Apply the "empty-collection guard" from `spec.md` §4.1: an empty
/// incoming collection leaves the table untouched if the database already
/// has rows for it.
fn non_wiping<T>(field: &Option<Vec<T>>, existing_count: usize) -> Option<&[T]> {
    match field {
        None => None,
        Some(rows) if rows.is_empty() && existing_count > 0 => None,
        Some(rows) => Some(rows.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn empty_database_loads_all_empty() {
        let (store, _dir) = test_store().await;
        let snapshot = store.load_all().await.unwrap();
        assert!(snapshot.memories.unwrap().is_empty());
        assert!(snapshot.edges.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_memory_then_load_round_trips() {
        let (store, _dir) = test_store().await;
        let mem = Memory {
            id: "mem-1".to_string(),
            kind: MemoryKind::Edit,
            content: "lib.rs: edited src/lib.rs".to_string(),
            embedding: Some(vec![0u8; 4 * 384]),
            metadata: serde_json::json!({}),
            timestamp: 1000,
        };
        store.add_memory(&mem).await.unwrap();
        let snapshot = store.load_all().await.unwrap();
        let rows = snapshot.memories.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "mem-1");
    }

    #[tokio::test]
    async fn add_edge_accumulates_weight_capped_at_ten() {
        let (store, _dir) = test_store().await;
        store.add_edge("a", "b", EdgeKind::Semantic, 6.0).await.unwrap();
        store.add_edge("a", "b", EdgeKind::Semantic, 8.0).await.unwrap();
        let edges = store.edges_of_kind(EdgeKind::Semantic).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert!((edges[0].weight - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn add_neural_pattern_nudges_confidence_and_usage() {
        let (store, _dir) = test_store().await;
        let now = crate::types::now_secs();
        let pattern = NeuralPattern {
            id: "np-1".to_string(),
            content: "c".to_string(),
            category: "edit".to_string(),
            embedding: None,
            confidence: 0.5,
            usage: 1,
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
        };
        store.add_neural_pattern(&pattern).await.unwrap();
        store.add_neural_pattern(&pattern).await.unwrap();
        let patterns = store.list_neural_patterns(None).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert!((patterns[0].confidence - 0.6).abs() < 1e-9);
        assert_eq!(patterns[0].usage, 2);
    }

    #[tokio::test]
    async fn record_file_sequence_upserts_count() {
        let (store, _dir) = test_store().await;
        store.record_file_sequence("a.rs", "b.rs").await.unwrap();
        store.record_file_sequence("a.rs", "b.rs").await.unwrap();
        let seqs = store.all_file_sequences().await.unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].count, 2);
    }

    #[tokio::test]
    async fn save_all_with_empty_collection_does_not_wipe_existing_rows() {
        let (store, _dir) = test_store().await;
        let mem = Memory {
            id: "mem-1".to_string(),
            kind: MemoryKind::General,
            content: "x".to_string(),
            embedding: None,
            metadata: serde_json::json!({}),
            timestamp: 1,
        };
        store.add_memory(&mem).await.unwrap();

        let mut partial = StoreSnapshot::default();
        partial.memories = Some(Vec::new());
        store.save_all(&partial).await.unwrap();

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.memories.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_save_load_is_a_fixed_point() {
        let (store, _dir) = test_store().await;
        let mem = Memory {
            id: "mem-1".to_string(),
            kind: MemoryKind::General,
            content: "x".to_string(),
            embedding: None,
            metadata: serde_json::json!({}),
            timestamp: 1,
        };
        store.add_memory(&mem).await.unwrap();

        let first = store.load_all().await.unwrap();
        store.save_all(&first).await.unwrap();
        let second = store.load_all().await.unwrap();
        assert_eq!(
            first.memories.unwrap().len(),
            second.memories.unwrap().len()
        );
    }
}
