//! # coplay
//!
//! Two-agent self-play reinforcement learning in Rust.
//!
//! ## Overview
//!
//! coplay provides:
//! - A vectorized multi-agent environment abstraction (`VectorizedEnv`) with
//!   a synchronous `Serial` backend and a fused `Batched` backend
//! - A registered "partner" agent whose actions are merged into every step
//! - A fixed-horizon `RolloutBuffer` and GAE advantage estimation
//! - `PPOAgent`, the clipped-surrogate learner driven by the training loop
//! - Neural network policies backed by libtorch - requires `torch` feature
//!
//! ## Features
//!
//! - `default` - Environments, buffers, PPO loop and the analytic `SoftmaxPolicy`
//! - `torch` - MLP policy/value networks trained with tch (requires libtorch)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coplay::prelude::*;
//! use coplay_envs::BalanceLine;
//!
//! let config = TrainConfig::default().with_num_envs(8).with_num_steps(32);
//! let mut env = VecEnv::new(Serial::new(BalanceLine::new, 8)?, Some(config.seed));
//! env.add_partner_agent(Box::new(RandomAgent::new(env.action_space(), RandomState::new(7))))?;
//!
//! let network = SoftmaxPolicy::new(4, config.learning_rate);
//! let mut ego = PPOAgent::new("ego", network, &config, 4, 1, RandomState::new(1))?;
//! run_training(&mut env, &mut ego, config.total_ticks(), None)?;
//! ```

pub mod agent;
pub mod env;
pub mod log;
pub mod policy;
pub mod rng;
pub mod spaces;
pub mod training;
pub mod utils;
pub mod vector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{Agent, Frozen, RandomAgent};
    pub use crate::env::{EnvInfo, MultiAgentEnv, MultiStepResult, EGO, PARTNER};
    pub use crate::log::{ConsoleLogger, MetricLogger, NoOpLogger};
    pub use crate::policy::{LossConfig, OptimStats, PolicyStep, PolicyValueNetwork, SoftmaxPolicy};
    pub use crate::rng::RandomState;
    pub use crate::spaces::*;
    pub use crate::training::{
        run_training, AgentPhase, EnvBackend, PPOAgent, RolloutBuffer, RunSummary, TrainConfig,
        UpdateReport,
    };
    pub use crate::vector::{
        ActionBatch, BatchSimulator, Batched, ObservationBatch, Serial, VecEnv, VecEnvBackend,
        VecStep, VectorizedEnv,
    };

    #[cfg(feature = "torch")]
    pub use crate::policy::{HasVarStore, MlpConfig, MlpPolicy, Policy, TorchNetwork};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum CoplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Env(String),

    #[error("Numerical error during {stage}: {detail}")]
    Numerical { stage: &'static str, detail: String },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Rollout buffer error: {0}")]
    Buffer(String),

    #[error("Array shape error: {0}")]
    Array(#[from] ndarray::ShapeError),

    #[cfg(feature = "torch")]
    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),
}

pub type Result<T> = core::result::Result<T, CoplayError>;
