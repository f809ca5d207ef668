//! Error types for the self-learning memory engine.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the store, embedder, RL engine, and consolidation
/// pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unparseable or contradictory configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The semantic embedder or the native vector backend failed to
    /// initialize. Recovered locally by falling back to the degraded path.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An embedding's byte length disagrees with the configured dimension.
    #[error("embedding dimension mismatch: expected {expected} bytes, got {actual}")]
    DimensionMismatch {
        /// Expected byte length (`4 * configured_dim`).
        expected: usize,
        /// Actual byte length found on the row.
        actual: usize,
    },

    /// The SQL write lock timed out past `busy_timeout`.
    #[error("store busy")]
    StoreBusy,

    /// A schema or index invariant was violated. Non-recoverable.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A file-mirror write failed. Logged and swallowed by callers.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// An unknown event name was passed by the host.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Catch-all storage error (query failures, constraint violations that
    /// cannot be attributed to corruption).
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying libsql failure.
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
}

impl Error {
    /// Whether the hook router should retry this event once before
    /// surfacing a failure to the host (`spec.md` §5/§7).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StoreBusy | Error::TransientIo(_) | Error::BackendUnavailable(_)
        )
    }

    /// Process exit code this error maps to on the command surface
    /// (`spec.md` §6).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::InvalidEvent(_) => 2,
            Error::Corruption(_) => 3,
            Error::StoreBusy | Error::TransientIo(_) | Error::BackendUnavailable(_) => 1,
            _ => 1,
        }
    }
}
