//! Row types for the twelve persisted tables (`spec.md` §3).

use serde::{Deserialize, Serialize};

#[cfg(feature = "proptest-arbitrary")]
use proptest::prelude::{prop_oneof, Arbitrary, BoxedStrategy, Just, Strategy};

/// Kind of a [`Memory`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Unclassified memory.
    General,
    /// Recorded in response to a `post-edit` event.
    Edit,
    /// Recorded in response to a `post-command` event.
    Command,
    /// A persisted trajectory step.
    Trajectory,
    /// Synthesized by the consolidator.
    Pattern,
    /// Seeded during `pretrain`.
    Foundation,
}

#[cfg(feature = "proptest-arbitrary")]
impl Arbitrary for MemoryKind {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(Self::General),
            Just(Self::Edit),
            Just(Self::Command),
            Just(Self::Trajectory),
            Just(Self::Pattern),
            Just(Self::Foundation),
        ]
        .boxed()
    }
}

/// A single semantic memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique id, `mem-<uuid>`.
    pub id: String,
    /// Classification of this memory.
    pub kind: MemoryKind,
    /// Raw text content (already enriched, see `embeddings::enrich_content`).
    pub content: String,
    /// Packed little-endian f32 vector, `4 * configured_dim` bytes when present.
    pub embedding: Option<Vec<u8>>,
    /// Opaque JSON metadata.
    pub metadata: serde_json::Value,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl Memory {
    /// Byte length an embedding for `dim` dimensions must have.
    #[must_use]
    pub fn expected_embedding_len(dim: usize) -> usize {
        4 * dim
    }

    /// Whether this row's embedding (if any) is "legacy" — i.e. its byte
    /// length does not match the configured dimension and it must be
    /// re-embedded (`spec.md` §4.2).
    #[must_use]
    pub fn is_legacy(&self, configured_dim: usize) -> bool {
        match &self.embedding {
            Some(bytes) => bytes.len() != Self::expected_embedding_len(configured_dim),
            None => false,
        }
    }
}

/// One Q-value table entry, keyed by `state ":" action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QEntry {
    /// `state ":" action`.
    pub key: String,
    /// State component of the key.
    pub state: String,
    /// Action component of the key.
    pub action: String,
    /// Current estimated value.
    pub q_value: f64,
    /// Number of updates observed.
    pub visits: u64,
    /// Seconds since the Unix epoch of the last update.
    pub last_update: i64,
}

impl QEntry {
    /// Build the `state ":" action` key.
    #[must_use]
    pub fn make_key(state: &str, action: &str) -> String {
        format!("{state}:{action}")
    }
}

/// One step recorded against an open trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryStep {
    /// Embedding of the state observed at this step.
    pub state_embedding: Vec<f32>,
    /// Embedding of the action taken at this step.
    pub action_embedding: Vec<f32>,
    /// Reward observed for this step.
    pub reward: f64,
}

/// An append-only ordered sequence representing one event or session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique trajectory id.
    pub id: String,
    /// JSON-encoded initial query embedding.
    pub state: String,
    /// JSON-encoded steps (bounded to the last 50, see `spec.md` §4.4).
    pub action: String,
    /// Final outcome label, if the trajectory has ended.
    pub outcome: Option<String>,
    /// Final reward, if the trajectory has ended.
    pub reward: Option<f64>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

/// Per-algorithm dense snapshot of a Q-table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningData {
    /// One of the nine algorithm identifiers.
    pub algorithm: String,
    /// JSON-encoded `HashMap<String, QEntry>`.
    pub q_table_json: String,
}

/// A synthesized cluster summary extracted from memories during
/// consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralPattern {
    /// Unique id: `np-<uuid>` when minted ad hoc, `np-<category>` when
    /// synthesized by the consolidator so repeat passes update the row.
    pub id: String,
    /// Concatenation of the first 120 characters of each member.
    pub content: String,
    /// Group key the pattern was synthesized from.
    pub category: String,
    /// Packed little-endian f32 centroid vector.
    pub embedding: Option<Vec<u8>>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Number of times this pattern has been re-observed.
    pub usage: u64,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
    /// Seconds since the Unix epoch of the last update.
    pub updated_at: i64,
    /// Opaque JSON metadata.
    pub metadata: serde_json::Value,
}

impl NeuralPattern {
    /// Apply the re-observation nudge from `spec.md` §4.1: confidence up by
    /// 0.1 capped at 1.0, usage incremented by one.
    pub fn nudge(&mut self, now: i64) {
        self.confidence = (self.confidence + 0.1).min(1.0);
        self.usage += 1;
        self.updated_at = now;
    }
}

/// A weighted, typed relation between two entity ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Auto-generated primary key; `None` before insertion.
    pub id: Option<i64>,
    /// Source entity id.
    pub source: String,
    /// Target entity id.
    pub target: String,
    /// Accumulated weight, capped at 10.0.
    pub weight: f64,
    /// Opaque JSON identifying the edge kind, e.g. `{"type": "temporal"}`.
    pub data: serde_json::Value,
}

/// Edge kinds the core engine emits. External tools may insert the
/// remaining kinds named in `spec.md` §6's wire protocol unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Between consecutive memories within 60s of each other.
    Temporal,
    /// From a neural pattern to its member memories.
    Pattern,
    /// Between memories whose cosine similarity exceeds the threshold.
    Semantic,
    /// From a session to the agent that ran it.
    Agent,
}

impl EdgeKind {
    /// String tag stored in `data.type`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Temporal => "temporal",
            EdgeKind::Pattern => "pattern",
            EdgeKind::Semantic => "semantic",
            EdgeKind::Agent => "agent",
        }
    }
}

/// A named agent, upserted on `session-start` and `session-end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Agent name, e.g. `setup-agent`.
    pub name: String,
    /// `{first_seen, last_seen, last_session, session_count}`.
    pub data: serde_json::Value,
}

/// A compact, compressed artifact in the pattern-compression layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedPattern {
    /// Unique id; minted as a fresh uuid if absent.
    pub id: String,
    /// Symbolic layer name, usually a neural-pattern category.
    pub layer: String,
    /// Packed float vector or compressed derivative thereof.
    pub data_blob: Vec<u8>,
    /// `4 * D / stored_bytes`.
    pub compression_ratio: f64,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
    /// Opaque JSON metadata.
    pub metadata: serde_json::Value,
}

/// A co-edit relationship between two files, keyed on the composite
/// `(from_file, to_file)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSequence {
    /// Previously edited file.
    pub from_file: String,
    /// Newly edited file.
    pub to_file: String,
    /// Number of times this sequence has been observed.
    pub count: u64,
}

/// A learned failure pattern, keyed by an opaque identifying key (e.g. the
/// command string that keeps failing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Key identifying the recurring failure.
    pub key: String,
    /// Opaque JSON payload (repeat count, last error text, ...).
    pub data: serde_json::Value,
}

/// A key-value summary row maintained by the consolidator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    /// Stat name, e.g. `total_memories`.
    pub key: String,
    /// Stringified value.
    pub value: String,
}

/// A general scratchpad row (`lastEditedFile`, `pretrain_done`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvEntry {
    /// Key.
    pub key: String,
    /// Stringified value.
    pub value: String,
}

/// Names of the nine reinforcement-learning algorithms (`spec.md` §3/§4.4).
pub const RL_ALGORITHMS: [&str; 9] = [
    "double-q",
    "q-learning",
    "sarsa",
    "actor-critic",
    "ppo",
    "decision-transformer",
    "monte-carlo",
    "td-lambda",
    "dqn",
];

/// Events dispatched by the host (`spec.md` §4.7/§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// `session-start`
    SessionStart {
        /// Agent name invoking the session, defaults to `setup-agent`.
        agent: String,
    },
    /// `pre-command`
    PreCommand {
        /// The command about to be executed.
        command: String,
    },
    /// `post-edit <path>`
    PostEdit {
        /// File path that was edited.
        path: String,
        /// Whether the edit succeeded.
        success: bool,
    },
    /// `post-command <command-string> [--success|--failed]`
    PostCommand {
        /// The command that was executed.
        command: String,
        /// Whether the command succeeded.
        success: bool,
    },
    /// `session-end`
    SessionEnd,
    /// `consolidate`
    Consolidate,
    /// `pretrain`
    Pretrain {
        /// Host-provided listing of codebase file paths.
        files: Vec<String>,
    },
    /// `re-embed`
    ReEmbed,
}

impl HookEvent {
    /// Parse an event name plus its host-provided payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidEvent`] for an unknown event name.
    pub fn parse(name: &str, args: &[String]) -> crate::Result<Self> {
        match name {
            "session-start" => Ok(HookEvent::SessionStart {
                agent: args
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "setup-agent".to_string()),
            }),
            "pre-command" => Ok(HookEvent::PreCommand {
                command: args.first().cloned().unwrap_or_default(),
            }),
            "post-edit" => Ok(HookEvent::PostEdit {
                path: args
                    .first()
                    .cloned()
                    .ok_or_else(|| crate::Error::InvalidEvent("post-edit requires a path".into()))?,
                success: !args.iter().any(|a| a == "--failed"),
            }),
            "post-command" => Ok(HookEvent::PostCommand {
                command: args
                    .first()
                    .cloned()
                    .ok_or_else(|| crate::Error::InvalidEvent("post-command requires a command".into()))?,
                success: !args.iter().any(|a| a == "--failed"),
            }),
            "session-end" => Ok(HookEvent::SessionEnd),
            "consolidate" => Ok(HookEvent::Consolidate),
            "pretrain" => Ok(HookEvent::Pretrain {
                files: args.to_vec(),
            }),
            "re-embed" => Ok(HookEvent::ReEmbed),
            other => Err(crate::Error::InvalidEvent(other.to_string())),
        }
    }
}

/// Current time in seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(all(test, feature = "proptest-arbitrary"))]
mod proptest_tests {
    use super::MemoryKind;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn memory_kind_round_trips_through_json(kind: MemoryKind) {
            let encoded = serde_json::to_string(&kind).unwrap();
            let decoded: MemoryKind = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(decoded, kind);
        }
    }
}

/// Mint an id of the form `<prefix>-<uuid-v4>`.
#[must_use]
pub fn mint_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}
