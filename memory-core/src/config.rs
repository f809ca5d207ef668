//! Environment-driven configuration (`spec.md` §6).

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Resolved configuration for a single hook invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project-root directory all other paths are resolved against.
    pub root: PathBuf,
    /// Path to the authoritative SQL database file.
    pub sqlite_path: PathBuf,
    /// Path to the JSON mirror.
    pub json_mirror_path: PathBuf,
    /// Path to the KV scratchpad mirror.
    pub kv_path: PathBuf,
    /// Path to the native HNSW vector index, when enabled.
    pub hnsw_path: PathBuf,
    /// Semantic model identifier.
    pub embedding_model: String,
    /// Enforced embedding dimension.
    pub embedding_dim: usize,
    /// Cosine cutoff for semantic edges.
    pub semantic_threshold: f64,
    /// Whether to attempt the semantic backend at all.
    pub onnx_enabled: bool,
    /// If false, force the hash fallback embedder.
    pub semantic_embeddings: bool,
    /// Master on/off switch.
    pub intelligence_enabled: bool,
    /// RL on/off switch.
    pub learning_enabled: bool,
    /// Learning rate (alpha) for Q updates.
    pub learning_rate: f64,
    /// Default Q-learning algorithm.
    pub q_learning_algorithm: String,
    /// SonaCompressor on/off switch.
    pub sona_enabled: bool,
    /// Prefer the native vector backend when available.
    pub hnsw_enabled: bool,
    /// Reserved for forward compatibility.
    pub attention_enabled: bool,
    /// Run the SonaCompressor bridge on `session-end`.
    pub dream_cycle_enabled: bool,
    /// Per-event budget in milliseconds.
    pub hook_timeout_ms: u64,
    /// Host-set pretrain-done flag.
    pub pretrain_done: bool,
    /// Debug logging toggle.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let root = PathBuf::from(".");
        Self {
            sqlite_path: root.join("intelligence.db"),
            json_mirror_path: root.join("intelligence.json"),
            kv_path: root.join("kv.json"),
            hnsw_path: root.join("hnsw.db"),
            root,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            semantic_threshold: 0.55,
            onnx_enabled: true,
            semantic_embeddings: true,
            intelligence_enabled: true,
            learning_enabled: true,
            learning_rate: 0.1,
            q_learning_algorithm: "double-q".to_string(),
            sona_enabled: true,
            hnsw_enabled: true,
            attention_enabled: true,
            dream_cycle_enabled: true,
            hook_timeout_ms: 10_000,
            pretrain_done: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for any key that is unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a key is set but fails to parse as
    /// its expected type.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(root) = std::env::var("MEMORY_ROOT") {
            cfg.root = PathBuf::from(root);
        }
        cfg.sqlite_path = env_path("SQLITE_PATH", &cfg.root, "intelligence.db");
        cfg.json_mirror_path = env_path("MEMORY_JSON_MIRROR", &cfg.root, "intelligence.json");
        cfg.kv_path = env_path("MEMORY_KV_PATH", &cfg.root, "kv.json");
        cfg.hnsw_path = env_path("MEMORY_HNSW_PATH", &cfg.root, "hnsw.db");

        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            cfg.embedding_model = v;
        }
        cfg.embedding_dim = env_parse("EMBEDDING_DIM", cfg.embedding_dim)?;
        cfg.semantic_threshold = env_parse("SEMANTIC_THRESHOLD", cfg.semantic_threshold)?;
        cfg.onnx_enabled = env_parse("ONNX_ENABLED", cfg.onnx_enabled)?;
        cfg.semantic_embeddings = env_parse("SEMANTIC_EMBEDDINGS", cfg.semantic_embeddings)?;
        cfg.intelligence_enabled = env_parse("INTELLIGENCE_ENABLED", cfg.intelligence_enabled)?;
        cfg.learning_enabled = env_parse("LEARNING_ENABLED", cfg.learning_enabled)?;
        cfg.learning_rate = env_parse("LEARNING_RATE", cfg.learning_rate)?;
        if let Ok(v) = std::env::var("Q_LEARNING_ALGORITHM") {
            cfg.q_learning_algorithm = v;
        }
        cfg.sona_enabled = env_parse("SONA_ENABLED", cfg.sona_enabled)?;
        cfg.hnsw_enabled = env_parse("HNSW_ENABLED", cfg.hnsw_enabled)?;
        cfg.attention_enabled = env_parse("ATTENTION_ENABLED", cfg.attention_enabled)?;
        cfg.dream_cycle_enabled = env_parse("DREAM_CYCLE_ENABLED", cfg.dream_cycle_enabled)?;
        cfg.hook_timeout_ms = env_parse("HOOK_TIMEOUT", cfg.hook_timeout_ms)?;
        cfg.pretrain_done = env_parse("PRETRAIN_DONE", cfg.pretrain_done)?;
        cfg.verbose = env_parse("VERBOSE", cfg.verbose)?;

        if cfg.embedding_dim == 0 {
            return Err(Error::Config("embedding_dim must be > 0".to_string()));
        }
        if cfg.hook_timeout_ms < 5_000 {
            tracing::warn!(
                hook_timeout_ms = cfg.hook_timeout_ms,
                "hook_timeout below the 5000ms floor used by the Validator's L2 check"
            );
        }
        Ok(cfg)
    }
}

fn env_path(key: &str, root: &std::path::Path, default_name: &str) -> PathBuf {
    std::env::var(key).map_or_else(|_| root.join(default_name), PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {v}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: &[&str] = &[
        "MEMORY_ROOT",
        "EMBEDDING_DIM",
        "SEMANTIC_THRESHOLD",
        "Q_LEARNING_ALGORITHM",
        "HOOK_TIMEOUT",
        "VERBOSE",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn from_env_with_nothing_set_matches_defaults() {
        clear_env();
        let cfg = Config::from_env().unwrap();
        let default = Config::default();
        assert_eq!(cfg.embedding_dim, default.embedding_dim);
        assert_eq!(cfg.semantic_threshold, default.semantic_threshold);
        assert_eq!(cfg.q_learning_algorithm, default.q_learning_algorithm);
        assert_eq!(cfg.hook_timeout_ms, default.hook_timeout_ms);
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_overrides_typed_values() {
        clear_env();
        std::env::set_var("EMBEDDING_DIM", "128");
        std::env::set_var("SEMANTIC_THRESHOLD", "0.7");
        std::env::set_var("Q_LEARNING_ALGORITHM", "sarsa");
        std::env::set_var("HOOK_TIMEOUT", "20000");
        std::env::set_var("VERBOSE", "true");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.embedding_dim, 128);
        assert!((cfg.semantic_threshold - 0.7).abs() < 1e-9);
        assert_eq!(cfg.q_learning_algorithm, "sarsa");
        assert_eq!(cfg.hook_timeout_ms, 20_000);
        assert!(cfg.verbose);

        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_rejects_zero_embedding_dim() {
        clear_env();
        std::env::set_var("EMBEDDING_DIM", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_rejects_unparseable_value() {
        clear_env();
        std::env::set_var("EMBEDDING_DIM", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_reads_root_and_derives_paths() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MEMORY_ROOT", dir.path());
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.root, dir.path());
        assert_eq!(cfg.sqlite_path, dir.path().join("intelligence.db"));
        clear_env();
    }
}
