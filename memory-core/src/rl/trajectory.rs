//! Trajectory lifecycle: `begin` / `step` / `end`, replay warm-up on load
//! (`spec.md` §4.4).

use crate::embeddings::pack;
use crate::error::Result;
use crate::store::Store;
use crate::types::{mint_id, now_secs, Trajectory};
use serde::{Deserialize, Serialize};

/// Steps buffered past this many are dropped oldest-first.
pub const MAX_BUFFERED_STEPS: usize = 50;

/// One buffered step of an in-flight trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// State embedding observed at this step.
    pub state_embedding: Vec<f32>,
    /// Action embedding taken at this step.
    pub action_embedding: Vec<f32>,
    /// Reward observed for this step.
    pub reward: f64,
}

/// An open, in-memory trajectory accumulating steps before `end()`.
#[derive(Debug, Clone)]
pub struct OpenTrajectory {
    id: String,
    query_embedding: Vec<f32>,
    steps: Vec<Step>,
    started_at: i64,
}

impl OpenTrajectory {
    /// Begin a new trajectory from a query embedding (`spec.md` §4.4).
    #[must_use]
    pub fn begin(query_embedding: Vec<f32>) -> Self {
        Self {
            id: mint_id("traj"),
            query_embedding,
            steps: Vec::new(),
            started_at: now_secs(),
        }
    }

    /// This trajectory's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a step, dropping the oldest if the buffer exceeds
    /// [`MAX_BUFFERED_STEPS`].
    pub fn step(&mut self, state_embedding: Vec<f32>, action_embedding: Vec<f32>, reward: f64) {
        self.steps.push(Step {
            state_embedding,
            action_embedding,
            reward,
        });
        if self.steps.len() > MAX_BUFFERED_STEPS {
            self.steps.remove(0);
        }
    }

    /// Finalize the trajectory: persist its (at most 50) steps through the
    /// store and return the persisted row.
    pub async fn end(self, store: &Store, final_reward: f64) -> Result<Trajectory> {
        let state = serde_json::to_string(&self.query_embedding)?;
        let action = serde_json::to_string(&self.steps)?;
        let row = Trajectory {
            id: self.id,
            state,
            action,
            outcome: Some("completed".to_string()),
            reward: Some(final_reward),
            timestamp: self.started_at,
        };
        store.add_trajectory(&row).await?;
        Ok(row)
    }
}

/// Fold a string into a `dim`-length embedding by summing character codes
/// into buckets — the "synthesized embedding" used to warm up the pattern
/// compressor from persisted trajectories at startup (`spec.md` §4.4).
#[must_use]
pub fn synth_embedding_from_text(text: &str, dim: usize) -> Vec<f32> {
    let mut out = vec![0.0_f32; dim.max(1)];
    for (i, c) in text.chars().enumerate() {
        out[i % out.len()] += c as u32 as f32;
    }
    let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut out {
            *v /= norm;
        }
    }
    out
}

/// Pack a synthesized embedding the same way a real one is packed, for
/// feeding into the compressor's `store_pattern`.
#[must_use]
pub fn synth_embedding_bytes(text: &str, dim: usize) -> Vec<u8> {
    pack(&synth_embedding_from_text(text, dim))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_buffer_drops_oldest_past_fifty() {
        let mut traj = OpenTrajectory::begin(vec![0.0]);
        for i in 0..75 {
            traj.step(vec![i as f32], vec![i as f32], 0.1);
        }
        assert_eq!(traj.steps.len(), MAX_BUFFERED_STEPS);
        assert_eq!(traj.steps.first().unwrap().reward, 0.1);
        assert_eq!(traj.steps[0].state_embedding[0], 25.0);
    }

    #[test]
    fn synth_embedding_is_deterministic_and_normalized() {
        let a = synth_embedding_from_text("git commit", 8);
        let b = synth_embedding_from_text("git commit", 8);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
