//! Core environment trait definitions.

use crate::spaces::DynSpace;
use crate::Result;
use ndarray::ArrayD;

/// Player index of the learning agent.
pub const EGO: usize = 0;
/// Player index of the registered partner.
pub const PARTNER: usize = 1;

/// Information returned from environment steps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvInfo {
    /// Episode return (if done)
    pub episode_return: Option<f32>,
    /// Episode length (if done)
    pub episode_length: Option<f32>,
    /// Custom metrics (kept minimal for performance)
    pub extra: smallvec::SmallVec<[(&'static str, f32); 4]>,
}

impl EnvInfo {
    /// Create empty info
    pub fn new() -> Self {
        Self::default()
    }

    /// Add episode stats
    pub fn with_episode_stats(mut self, ret: f32, len: u32) -> Self {
        self.episode_return = Some(ret);
        self.episode_length = Some(len as f32);
        self
    }

    /// Add a custom metric
    pub fn with_extra(mut self, key: &'static str, value: f32) -> Self {
        self.extra.push((key, value));
        self
    }

    /// Get a value by key (including defaults)
    pub fn get(&self, key: &str) -> Option<f32> {
        match key {
            "episode_return" => self.episode_return,
            "episode_length" => self.episode_length,
            _ => self.extra.iter().find(|(k, _)| k == &key).map(|(_, v)| *v),
        }
    }
}

/// Result from a single joint step of every player
#[derive(Clone, Debug)]
pub struct MultiStepResult {
    /// Next observation for each player, indexed by player
    pub observations: Vec<ArrayD<f32>>,
    /// Reward for each player, indexed by player
    pub rewards: Vec<f32>,
    /// Whether the shared episode terminated
    pub terminated: bool,
    /// Whether the shared episode hit its time limit
    pub truncated: bool,
    /// Additional info
    pub info: EnvInfo,
}

impl MultiStepResult {
    /// Check if episode is done (terminated or truncated)
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A single cooperative environment stepped jointly by all players.
///
/// Episodes are shared: every player sees the same done flag. Player
/// [`EGO`] is the learner, player [`PARTNER`] the registered partner.
///
/// # Example
///
/// ```rust,ignore
/// impl MultiAgentEnv for Coin {
///     fn observation_space(&self) -> DynSpace {
///         DynSpace::Box(BoxSpace::uniform(&[1], -1.0, 1.0))
///     }
///
///     fn action_space(&self) -> DynSpace {
///         DynSpace::Discrete(Discrete::new(2))
///     }
///
///     fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<ArrayD<f32>>, EnvInfo)> {
///         // ...
///     }
///
///     fn step(&mut self, actions: &[ArrayD<f32>]) -> Result<MultiStepResult> {
///         // ...
///     }
/// }
/// ```
pub trait MultiAgentEnv: Send {
    /// Per-player observation space
    fn observation_space(&self) -> DynSpace;

    /// Per-player action space
    fn action_space(&self) -> DynSpace;

    /// Number of players acting each step
    fn num_players(&self) -> usize {
        2
    }

    /// Reset the episode, optionally reseeding, and return one observation per player
    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<ArrayD<f32>>, EnvInfo)>;

    /// Apply one action per player
    fn step(&mut self, actions: &[ArrayD<f32>]) -> Result<MultiStepResult>;

    /// Render the environment (optional)
    fn render(&self) -> Option<String> {
        None
    }

    /// Close the environment and release resources
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_info_lookup() {
        let info = EnvInfo::new()
            .with_episode_stats(12.0, 12)
            .with_extra("tilt", 0.25);
        assert_eq!(info.get("episode_return"), Some(12.0));
        assert_eq!(info.get("episode_length"), Some(12.0));
        assert_eq!(info.get("tilt"), Some(0.25));
        assert_eq!(info.get("missing"), None);
    }

    #[test]
    fn test_step_result_done() {
        let mut result = MultiStepResult {
            observations: vec![],
            rewards: vec![0.0, 0.0],
            terminated: false,
            truncated: false,
            info: EnvInfo::new(),
        };
        assert!(!result.done());
        result.truncated = true;
        assert!(result.done());
    }
}
