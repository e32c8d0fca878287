//! Training configuration.

use crate::policy::LossConfig;
use crate::{CoplayError, Result};
use serde::{Deserialize, Serialize};

/// Which vectorization backend drives the sub-environments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvBackend {
    /// One sub-environment stepped at a time
    Serial,
    /// All sub-environments stepped in one fused simulator call
    #[default]
    Batched,
}

impl EnvBackend {
    /// Label used in run names
    pub fn run_label(&self) -> &'static str {
        match self {
            EnvBackend::Serial => "serial",
            EnvBackend::Batched => "madrona",
        }
    }
}

/// Configuration for a self-play PPO run.
///
/// Built once, validated once, then shared read-only by the agents and the
/// driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // Run
    /// Seed for every derived random stream
    pub seed: u64,
    /// Ask torch for deterministic kernels
    pub torch_deterministic: bool,
    /// Require an accelerator
    pub cuda: bool,
    /// Environment backend
    pub backend: EnvBackend,

    // Rollout
    /// Total environment steps across all envs
    pub total_timesteps: u64,
    /// Number of parallel environments
    pub num_envs: usize,
    /// Steps per environment per rollout
    pub num_steps: usize,

    // PPO hyperparameters
    /// Learning rate
    pub learning_rate: f64,
    /// Whether to anneal learning rate
    pub anneal_lr: bool,
    /// Discount factor
    pub gamma: f64,
    /// GAE lambda
    pub gae_lambda: f64,
    /// Number of minibatches per update
    pub num_minibatches: usize,
    /// Number of epochs per batch
    pub update_epochs: usize,
    /// Normalize advantages over the flattened batch
    pub norm_adv: bool,
    /// PPO clipping coefficient
    pub clip_coef: f64,
    /// Clip the value loss around the old values
    pub clip_vloss: bool,
    /// Entropy coefficient
    pub ent_coef: f64,
    /// Value function coefficient
    pub vf_coef: f64,
    /// Maximum gradient norm
    pub max_grad_norm: f64,
    /// Target KL divergence for early stopping
    pub target_kl: Option<f64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            torch_deterministic: true,
            cuda: true,
            backend: EnvBackend::Batched,

            total_timesteps: 5_000_000,
            num_envs: 120,
            num_steps: 60,

            learning_rate: 2.5e-4,
            anneal_lr: true,
            gamma: 0.99,
            gae_lambda: 0.95,
            num_minibatches: 1,
            update_epochs: 4,
            norm_adv: true,
            clip_coef: 0.2,
            clip_vloss: true,
            ent_coef: 0.01,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            target_kl: None,
        }
    }
}

impl TrainConfig {
    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set total timesteps
    pub fn with_timesteps(mut self, timesteps: u64) -> Self {
        self.total_timesteps = timesteps;
        self
    }

    /// Set number of environments
    pub fn with_num_envs(mut self, num_envs: usize) -> Self {
        self.num_envs = num_envs;
        self
    }

    /// Set rollout horizon
    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    /// Set learning rate
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the KL early-stop target
    pub fn with_target_kl(mut self, target_kl: Option<f64>) -> Self {
        self.target_kl = target_kl;
        self
    }

    /// Set the environment backend
    pub fn with_backend(mut self, backend: EnvBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Steps collected per update (`num_envs * num_steps`)
    pub fn batch_size(&self) -> usize {
        self.num_envs * self.num_steps
    }

    /// Compute minibatch size
    pub fn minibatch_size(&self) -> usize {
        self.batch_size() / self.num_minibatches.max(1)
    }

    /// Planned optimization cycles
    pub fn num_updates(&self) -> u64 {
        match self.batch_size() {
            0 => 0,
            batch => self.total_timesteps / batch as u64,
        }
    }

    /// Environment ticks the driver runs
    pub fn total_ticks(&self) -> u64 {
        self.num_updates() * self.num_steps as u64
    }

    /// Loss coefficients handed to the network
    pub fn loss_config(&self) -> LossConfig {
        LossConfig {
            clip_coef: self.clip_coef,
            clip_vloss: self.clip_vloss,
            ent_coef: self.ent_coef,
            vf_coef: self.vf_coef,
            max_grad_norm: self.max_grad_norm,
        }
    }

    /// `Balance_Train__{seed}__{unix_time}__{num_envs}_{backend}`
    pub fn run_name(&self, unix_time: u64) -> String {
        format!(
            "Balance_Train__{}__{}__{}_{}",
            self.seed,
            unix_time,
            self.num_envs,
            self.backend.run_label()
        )
    }

    /// Reject invalid or contradictory settings
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(CoplayError::Config(msg));

        if self.num_envs == 0 {
            return fail("num_envs must be > 0".into());
        }
        if self.num_steps == 0 {
            return fail("num_steps must be > 0".into());
        }
        if self.num_minibatches == 0 {
            return fail("num_minibatches must be > 0".into());
        }
        if self.update_epochs == 0 {
            return fail("update_epochs must be > 0".into());
        }
        if self.batch_size() % self.num_minibatches != 0 {
            return fail(format!(
                "batch size {} is not divisible by num_minibatches {}",
                self.batch_size(),
                self.num_minibatches
            ));
        }
        if self.num_updates() == 0 {
            return fail(format!(
                "total_timesteps {} is smaller than one rollout of {} steps",
                self.total_timesteps,
                self.batch_size()
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return fail(format!("learning_rate must be > 0, got {}", self.learning_rate));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return fail(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return fail(format!("gae_lambda must be in [0, 1], got {}", self.gae_lambda));
        }
        if !(self.clip_coef.is_finite() && self.clip_coef > 0.0) {
            return fail(format!("clip_coef must be > 0, got {}", self.clip_coef));
        }
        if !(self.ent_coef.is_finite() && self.ent_coef >= 0.0) {
            return fail(format!("ent_coef must be >= 0, got {}", self.ent_coef));
        }
        if !(self.vf_coef.is_finite() && self.vf_coef >= 0.0) {
            return fail(format!("vf_coef must be >= 0, got {}", self.vf_coef));
        }
        if !(self.max_grad_norm.is_finite() && self.max_grad_norm > 0.0) {
            return fail(format!("max_grad_norm must be > 0, got {}", self.max_grad_norm));
        }
        if let Some(kl) = self.target_kl {
            if !(kl.is_finite() && kl > 0.0) {
                return fail(format!("target_kl must be > 0, got {}", kl));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> TrainConfig {
        TrainConfig::default()
            .with_num_envs(4)
            .with_num_steps(8)
            .with_timesteps(320)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size(), 7200);
        assert_eq!(config.num_updates(), 694);
        assert_eq!(config.total_ticks(), 694 * 60);
        assert_eq!(config.minibatch_size(), 7200);
    }

    #[test]
    fn test_run_name() {
        let config = small().with_seed(3);
        assert_eq!(config.run_name(1700000000), "Balance_Train__3__1700000000__4_madrona");
        let serial = config.with_backend(EnvBackend::Serial);
        assert_eq!(serial.run_name(5), "Balance_Train__3__5__4_serial");
    }

    #[test]
    fn test_rejects_invalid() {
        let cases: Vec<Box<dyn Fn(&mut TrainConfig)>> = vec![
            Box::new(|c| c.num_envs = 0),
            Box::new(|c| c.num_steps = 0),
            Box::new(|c| c.num_minibatches = 0),
            Box::new(|c| c.num_minibatches = 3),
            Box::new(|c| c.update_epochs = 0),
            Box::new(|c| c.total_timesteps = 31),
            Box::new(|c| c.learning_rate = 0.0),
            Box::new(|c| c.learning_rate = f64::NAN),
            Box::new(|c| c.gamma = 1.5),
            Box::new(|c| c.gae_lambda = -0.1),
            Box::new(|c| c.clip_coef = 0.0),
            Box::new(|c| c.max_grad_norm = -1.0),
            Box::new(|c| c.target_kl = Some(0.0)),
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = small();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(CoplayError::Config(_))),
                "case {} should be rejected",
                i
            );
        }
    }

    #[test]
    fn test_serde_fills_defaults() {
        let config: TrainConfig = serde_json::from_str(r#"{"num_envs": 2, "backend": "serial"}"#).unwrap();
        assert_eq!(config.num_envs, 2);
        assert_eq!(config.backend, EnvBackend::Serial);
        assert_eq!(config.num_steps, 60);
        assert_eq!(config.target_kl, None);
    }
}
