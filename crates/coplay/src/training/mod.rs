//! Training system for self-play PPO.
//!
//! Provides:
//! - `RolloutBuffer` - Fixed-horizon storage for one agent's rollout
//! - `compute_gae` - Advantage and return estimation
//! - `PPOAgent` - Collects rollouts and runs the clipped PPO update
//! - `run_training` - Drives an ego agent against a vectorized environment

mod agent;
pub mod buffer;
mod config;
mod driver;
pub mod gae;
pub mod ppo;

pub use agent::{AgentPhase, PPOAgent, UpdateReport};
pub use buffer::{minibatch_indices, Batch, Minibatch, RolloutBuffer};
pub use config::{EnvBackend, TrainConfig};
pub use driver::{progress_bar, run_training, RunSummary};
pub use gae::{compute_gae, normalize_advantages};
