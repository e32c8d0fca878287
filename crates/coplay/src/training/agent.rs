//! The PPO learner.

use super::buffer::{minibatch_indices, RolloutBuffer};
use super::config::TrainConfig;
use super::gae::{compute_gae, normalize_advantages};
use crate::agent::Agent;
use crate::log::{MetricLogger, NoOpLogger};
use crate::policy::{OptimStats, PolicyValueNetwork};
use crate::rng::RandomState;
use crate::vector::{ActionBatch, ObservationBatch};
use crate::{CoplayError, Result};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Where the agent is in its collect/update cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentPhase {
    /// Filling the rollout buffer
    Collecting,
    /// Buffer is full; the update runs once the bootstrap observation arrives
    Updating,
}

/// Outcome of one optimization cycle
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateReport {
    /// Cycles completed, including this one
    pub iteration: u64,
    pub global_step: u64,
    /// Epochs actually run; fewer than configured after a KL early stop
    pub epochs_run: usize,
    pub early_stopped: bool,
    /// Mean over every minibatch step of the cycle
    pub stats: OptimStats,
    /// `None` when the returns have zero variance
    pub explained_variance: Option<f64>,
    /// Learning rate used for this cycle
    pub learning_rate: f64,
}

/// PPO agent owning its network, optimizer state, buffer and schedule.
///
/// Recorded [`get_action`](Agent::get_action) calls append rows;
/// [`update`](Agent::update) completes them. When the last row of the
/// horizon is completed the agent switches to [`AgentPhase::Updating`], and
/// the optimization runs at the next recorded `get_action` (whose
/// observations bootstrap the final value) or at an explicit
/// [`finish_rollout`](Self::finish_rollout).
pub struct PPOAgent<N: PolicyValueNetwork> {
    name: String,
    config: TrainConfig,
    network: N,
    buffer: RolloutBuffer,
    rng: RandomState,
    phase: AgentPhase,
    iteration: u64,
    num_updates: u64,
    global_step: u64,
    initial_lr: f64,
    logger: Box<dyn MetricLogger>,
    last_report: Option<UpdateReport>,
}

impl<N: PolicyValueNetwork> PPOAgent<N> {
    /// Create a new agent.
    ///
    /// `rng` drives action sampling and minibatch shuffling.
    pub fn new(
        name: impl Into<String>,
        mut network: N,
        config: &TrainConfig,
        obs_size: usize,
        action_size: usize,
        rng: RandomState,
    ) -> Result<Self> {
        config.validate()?;
        network.set_learning_rate(config.learning_rate);
        Ok(Self {
            name: name.into(),
            config: config.clone(),
            network,
            buffer: RolloutBuffer::new(config.num_steps, config.num_envs, obs_size, action_size),
            rng,
            phase: AgentPhase::Collecting,
            iteration: 0,
            num_updates: config.num_updates(),
            global_step: 0,
            initial_lr: config.learning_rate,
            logger: Box::new(NoOpLogger),
            last_report: None,
        })
    }

    /// Report per-update metrics to `logger`
    pub fn with_logger(mut self, logger: Box<dyn MetricLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Completed optimization cycles
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Environment steps seen across all envs
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn buffer(&self) -> &RolloutBuffer {
        &self.buffer
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn learning_rate(&self) -> f64 {
        self.network.learning_rate()
    }

    pub fn last_report(&self) -> Option<&UpdateReport> {
        self.last_report.as_ref()
    }

    /// GAE advantages and returns for the full buffer, bootstrapped from
    /// the value of `next_observations`
    pub fn compute_advantages(
        &self,
        next_observations: &ObservationBatch,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let last_value = self.network.value(next_observations)?;
        compute_gae(
            self.buffer.rewards(),
            self.buffer.values(),
            self.buffer.dones(),
            last_value.view(),
            self.config.gamma,
            self.config.gae_lambda,
        )
    }

    /// Run the optimization phase on the full buffer and start a new cycle
    pub fn finish_rollout(&mut self, next_observations: &ObservationBatch) -> Result<UpdateReport> {
        if !self.buffer.is_full() {
            return Err(CoplayError::Buffer(format!(
                "update requested with {} of {} rows",
                self.buffer.cursor(),
                self.buffer.num_steps()
            )));
        }

        let (advantages, returns) = self.compute_advantages(next_observations)?;
        let report = self.optimize(&advantages, &returns)?;

        self.buffer.reset();
        self.phase = AgentPhase::Collecting;
        if self.config.anneal_lr {
            let frac = 1.0 - self.iteration as f64 / self.num_updates.max(1) as f64;
            self.network.set_learning_rate(self.initial_lr * frac.max(0.0));
        }

        self.log_report(&report);
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn optimize(&mut self, advantages: &Array2<f32>, returns: &Array2<f32>) -> Result<UpdateReport> {
        let mut batch = self.buffer.flatten(advantages, returns)?;
        if self.config.norm_adv {
            batch.advantages = normalize_advantages(&batch.advantages);
        }
        let explained_variance = explained_variance(&batch.values, &batch.returns);

        let loss = self.config.loss_config();
        let learning_rate = self.network.learning_rate();
        let mut all_stats = Vec::with_capacity(self.config.update_epochs * self.config.num_minibatches);
        let mut epochs_run = 0;
        let mut early_stopped = false;

        for epoch in 0..self.config.update_epochs {
            let mut epoch_stats = Vec::with_capacity(self.config.num_minibatches);
            for indices in minibatch_indices(batch.len(), self.config.num_minibatches, &mut self.rng) {
                let minibatch = batch.select(&indices);
                let stats = self.network.optimize(&minibatch, &loss)?;
                if let Some(field) = stats.non_finite_field() {
                    return Err(CoplayError::Numerical {
                        stage: "optimization",
                        detail: format!("{} is not finite in epoch {}", field, epoch),
                    });
                }
                epoch_stats.push(stats);
            }
            epochs_run += 1;

            let mean_kl = OptimStats::mean(&epoch_stats).approx_kl;
            all_stats.extend(epoch_stats);
            if let Some(target) = self.config.target_kl {
                if mean_kl > target {
                    tracing::info!(
                        agent = %self.name,
                        epoch,
                        kl = mean_kl,
                        target,
                        "Early stopping due to high KL divergence"
                    );
                    early_stopped = true;
                    break;
                }
            }
        }

        self.iteration += 1;
        Ok(UpdateReport {
            iteration: self.iteration,
            global_step: self.global_step,
            epochs_run,
            early_stopped,
            stats: OptimStats::mean(&all_stats),
            explained_variance,
            learning_rate,
        })
    }

    fn log_report(&self, report: &UpdateReport) {
        let s = &report.stats;
        tracing::info!(
            agent = %self.name,
            iteration = report.iteration,
            global_step = report.global_step,
            policy_loss = s.policy_loss,
            value_loss = s.value_loss,
            entropy = s.entropy,
            approx_kl = s.approx_kl,
            epochs = report.epochs_run,
            lr = report.learning_rate,
            "PPO update"
        );

        let mut metrics = HashMap::new();
        let prefix = &self.name;
        for (key, value) in [
            ("policy_loss", s.policy_loss),
            ("value_loss", s.value_loss),
            ("entropy", s.entropy),
            ("approx_kl", s.approx_kl),
            ("clip_fraction", s.clip_fraction),
            ("grad_norm", s.grad_norm),
            ("learning_rate", report.learning_rate),
            ("epochs_run", report.epochs_run as f64),
        ] {
            metrics.insert(format!("{}/{}", prefix, key), value);
        }
        if let Some(ev) = report.explained_variance {
            metrics.insert(format!("{}/explained_variance", prefix), ev);
        }
        self.logger.log_metrics(&metrics, report.global_step);
    }
}

/// `1 - Var(returns - values) / Var(returns)`
fn explained_variance(values: &Array1<f32>, returns: &Array1<f32>) -> Option<f64> {
    let var = |xs: &Array1<f32>| {
        let n = xs.len().max(1) as f64;
        let mean = xs.iter().map(|&x| x as f64).sum::<f64>() / n;
        xs.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n
    };
    let var_returns = var(returns);
    if var_returns == 0.0 {
        return None;
    }
    Some(1.0 - var(&(returns - values)) / var_returns)
}

impl<N: PolicyValueNetwork> Agent for PPOAgent<N> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_action(&mut self, observations: &ObservationBatch, record: bool) -> Result<ActionBatch> {
        if record && self.phase == AgentPhase::Updating {
            self.finish_rollout(observations)?;
        }

        let step = self.network.act(observations, &mut self.rng)?;
        if record {
            self.buffer
                .push(observations, &step.actions, &step.log_probs, &step.values)?;
        }
        Ok(step.actions)
    }

    fn update(&mut self, rewards: &[f32], dones: &[bool]) -> Result<()> {
        self.buffer.complete(rewards, dones)?;
        self.global_step += rewards.len() as u64;
        if self.buffer.is_full() {
            self.phase = AgentPhase::Updating;
            tracing::debug!(agent = %self.name, global_step = self.global_step, "rollout complete");
        }
        Ok(())
    }

    fn flush(&mut self, observations: &ObservationBatch) -> Result<()> {
        if self.phase == AgentPhase::Updating {
            self.finish_rollout(observations)?;
        }
        Ok(())
    }
}
