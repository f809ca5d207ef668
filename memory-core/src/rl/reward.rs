//! # Reward Calculator
//!
//! Assigns distinct numeric rewards to event outcomes instead of a flat
//! +1/-1 ("reward-differentiation", `spec.md` §4.4), grounded in the
//! teacher's weighted-multiplier `RewardCalculator` idiom
//! (`memory-core/src/reward.rs`).

use tracing::debug;

/// Extensions that earn the edit-reward language bonus.
const BONUS_EXTENSIONS: [&str; 5] = ["ts", "tsx", "rs", "go", "java"];

/// Read-only shell builtins classified as low-value commands.
const READ_ONLY_BUILTINS: [&str; 10] =
    ["ls", "cd", "pwd", "echo", "cat", "head", "tail", "wc", "date", "whoami"];

/// Development tools classified as mid-value commands.
const DEV_TOOLS: [&str; 7] = ["git", "npm", "npx", "node", "python", "cargo", "make"];

/// Context carried between consecutive `post-edit` events, used to
/// distinguish a retry from a fresh edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditContext {
    /// Path of the previously edited file, if any.
    pub prior_path: Option<&'static str>,
    /// Seconds since the prior edit on any file, if any.
    pub seconds_since_any_edit: Option<i64>,
    /// Seconds since the prior edit on the same file, if any.
    pub seconds_since_same_file: Option<i64>,
}

/// Computes the reward-differentiation policy of `spec.md` §4.4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardCalculator;

impl RewardCalculator {
    /// Build a calculator. Stateless today; kept as a type so call sites
    /// read the same way the RL update and Q-table lookups do.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reward for a `post-edit` event.
    pub fn edit_reward(
        &self,
        path: &str,
        success: bool,
        seconds_since_same_file: Option<i64>,
        seconds_since_any_edit: Option<i64>,
    ) -> f64 {
        if !success {
            debug!(path, "edit failed, reward -0.5");
            return -0.5;
        }

        let mut reward = match seconds_since_same_file {
            Some(s) if s <= 30 => 0.4,
            _ => match seconds_since_any_edit {
                Some(s) if s <= 5 => 0.5,
                _ => 0.9,
            },
        };

        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if BONUS_EXTENSIONS.contains(&ext) {
            reward = (reward + 0.1_f64).min(1.0);
        }

        debug!(path, reward, "computed edit reward");
        reward
    }

    /// Reward for a `post-command` event.
    pub fn command_reward(&self, command: &str, success: bool) -> f64 {
        if !success {
            debug!(command, "command failed, reward -0.3");
            return -0.3;
        }

        let leading = command.split_whitespace().next().unwrap_or("");
        let reward = if command.contains("$(") {
            0.9
        } else if command.contains("&&") {
            0.8
        } else if command.contains('|') {
            0.85
        } else if READ_ONLY_BUILTINS.contains(&leading) {
            0.3
        } else if DEV_TOOLS.contains(&leading) {
            0.6
        } else {
            0.6
        };

        debug!(command, reward, "computed command reward");
        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_retry_within_30s_uses_point_four() {
        let calc = RewardCalculator::new();
        let reward = calc.edit_reward("src/lib.rs", true, Some(5), None);
        assert!((reward - 0.4).abs() < 1e-9);
    }

    #[test]
    fn edit_fresh_rust_file_gets_bonus() {
        let calc = RewardCalculator::new();
        let reward = calc.edit_reward("src/lib.rs", true, None, None);
        assert!((reward - 1.0).abs() < 1e-9);
    }

    #[test]
    fn edit_fresh_non_bonus_extension_stays_at_point_nine() {
        let calc = RewardCalculator::new();
        let reward = calc.edit_reward("README.md", true, None, None);
        assert!((reward - 0.9).abs() < 1e-9);
    }

    #[test]
    fn edit_within_five_seconds_any_file_is_point_five() {
        let calc = RewardCalculator::new();
        let reward = calc.edit_reward("README.md", true, None, Some(3));
        assert!((reward - 0.5).abs() < 1e-9);
    }

    #[test]
    fn edit_failure_is_negative() {
        let calc = RewardCalculator::new();
        let reward = calc.edit_reward("src/lib.rs", false, None, None);
        assert!((reward + 0.5).abs() < 1e-9);
    }

    #[test]
    fn command_pipeline_beats_dev_tool() {
        let calc = RewardCalculator::new();
        assert!((calc.command_reward("cat foo | grep bar", true) - 0.85).abs() < 1e-9);
        assert!((calc.command_reward("git commit -m test", true) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn command_read_only_builtin_is_low_value() {
        let calc = RewardCalculator::new();
        assert!((calc.command_reward("ls -la", true) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn command_failure_is_negative() {
        let calc = RewardCalculator::new();
        assert!((calc.command_reward("cargo build", false) + 0.3).abs() < 1e-9);
    }
}
