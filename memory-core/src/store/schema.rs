//! DDL for the twelve persisted tables, grounded in the teacher's
//! `memory-storage-turso/src/schema.rs` constants-as-SQL idiom.

/// All `CREATE TABLE IF NOT EXISTS` statements, applied in order on every
/// open.
pub const CREATE_TABLES: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB,
    metadata TEXT NOT NULL,
    timestamp INTEGER NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS q_entries (
    key TEXT PRIMARY KEY NOT NULL,
    state TEXT NOT NULL,
    action TEXT NOT NULL,
    q_value REAL NOT NULL,
    visits INTEGER NOT NULL DEFAULT 0,
    last_update INTEGER NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS trajectories (
    id TEXT PRIMARY KEY NOT NULL,
    state TEXT NOT NULL,
    action TEXT NOT NULL,
    outcome TEXT,
    reward REAL,
    timestamp INTEGER NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS learning_data (
    algorithm TEXT PRIMARY KEY NOT NULL,
    q_table_json TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS neural_patterns (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    embedding BLOB,
    confidence REAL NOT NULL,
    usage INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    metadata TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    weight REAL NOT NULL,
    data TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS agents (
    name TEXT PRIMARY KEY NOT NULL,
    data_json TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS compressed_patterns (
    id TEXT PRIMARY KEY NOT NULL,
    layer TEXT NOT NULL,
    data_blob BLOB NOT NULL,
    compression_ratio REAL NOT NULL,
    created_at INTEGER NOT NULL,
    metadata TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS file_sequences (
    from_file TEXT NOT NULL,
    to_file TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (from_file, to_file)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS errors (
    key TEXT PRIMARY KEY NOT NULL,
    data_json TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS stats (
    key TEXT PRIMARY KEY NOT NULL,
    value_text TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value_text TEXT NOT NULL
)
"#,
];

/// Indexes created alongside the tables above.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind)",
    "CREATE INDEX IF NOT EXISTS idx_trajectories_timestamp ON trajectories(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_neural_patterns_category ON neural_patterns(category)",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source)",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target)",
    "CREATE INDEX IF NOT EXISTS idx_compressed_patterns_layer ON compressed_patterns(layer, created_at DESC)",
];

/// Names of every upsertable table, used by stale-row reconciliation
/// (`spec.md` §4.1).
pub const TABLE_NAMES: &[&str] = &[
    "memories",
    "q_entries",
    "trajectories",
    "learning_data",
    "neural_patterns",
    "edges",
    "agents",
    "compressed_patterns",
    "file_sequences",
    "errors",
    "stats",
    "kv_store",
];
