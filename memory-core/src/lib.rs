//! Embedded, single-writer memory and reinforcement-learning store invoked
//! by short-lived coding-assistant hook processes.
//!
//! A host process dispatches one named event (`post-edit`, `session-end`,
//! ...) through [`router::dispatch`], which drives embedding, memory
//! upsert, RL updates, consolidation, and pattern compression against one
//! embedded SQL database, committing at most one transaction before the
//! process exits.

pub mod config;
pub mod consolidate;
pub mod embeddings;
pub mod error;
pub mod pipeline;
pub mod rl;
pub mod router;
pub mod sona;
pub mod store;
pub mod types;
pub mod validator;

pub use config::Config;
pub use error::{Error, Result};
pub use router::{dispatch, EventOutcome};
pub use store::Store;
pub use types::HookEvent;
