//! Vectorized environment abstraction.

use crate::agent::Agent;
use crate::env::{EnvInfo, EGO, PARTNER};
use crate::spaces::DynSpace;
use crate::{CoplayError, Result};
use ndarray::Array2;

/// Stacked observations, one row per environment slot
pub type ObservationBatch = Array2<f32>;

/// Stacked actions, one row per environment slot
pub type ActionBatch = Array2<f32>;

/// Result of stepping every player in every sub-environment
#[derive(Clone, Debug)]
pub struct BackendStep {
    /// Next observations, indexed by player
    pub observations: Vec<ObservationBatch>,
    /// Rewards, indexed by player then env
    pub rewards: Vec<Vec<f32>>,
    /// Terminated flags
    pub terminated: Vec<bool>,
    /// Truncated flags
    pub truncated: Vec<bool>,
    /// Info records
    pub infos: Vec<EnvInfo>,
}

impl BackendStep {
    /// Check which environments are done
    pub fn dones(&self) -> Vec<bool> {
        self.terminated
            .iter()
            .zip(self.truncated.iter())
            .map(|(&t, &tr)| t || tr)
            .collect()
    }
}

/// Trait for vectorized environment backends.
///
/// Implementations auto-reset done slots inside `step`: the observation
/// returned for a done slot is already the first observation of the next
/// episode.
pub trait VecEnvBackend: Send {
    /// Get the observation space (single env, single player)
    fn observation_space(&self) -> DynSpace;

    /// Get the action space (single env, single player)
    fn action_space(&self) -> DynSpace;

    /// Get the number of environments
    fn num_envs(&self) -> usize;

    /// Players acting in every environment
    fn num_players(&self) -> usize;

    /// Backend name used in run identifiers
    fn name(&self) -> &'static str;

    /// Reset all environments, returning one batch per player
    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<ObservationBatch>>;

    /// Step all environments with one action batch per player
    fn step(&mut self, actions: &[ActionBatch]) -> Result<BackendStep>;

    /// Close all environments
    fn close(&mut self);
}

/// Ego-side view of one environment tick
#[derive(Clone, Debug)]
pub struct VecStep {
    pub observations: ObservationBatch,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub infos: Vec<EnvInfo>,
}

/// The interface a training driver steps against.
pub trait VectorizedEnv {
    fn num_envs(&self) -> usize;

    fn observation_space(&self) -> DynSpace;

    fn action_space(&self) -> DynSpace;

    /// Reset every sub-environment and return the ego observations.
    fn reset(&mut self) -> Result<ObservationBatch>;

    /// Step with the ego's actions; the partner's actions are merged in.
    fn step(&mut self, actions: &ActionBatch) -> Result<VecStep>;

    /// Register the co-acting partner. Only one partner is supported.
    fn add_partner_agent(&mut self, agent: Box<dyn Agent>) -> Result<()>;

    /// Let the partner consume its pending work at the end of a run.
    fn finish(&mut self) -> Result<()>;
}

/// Main vectorized environment struct
pub struct VecEnv<B: VecEnvBackend> {
    backend: B,
    seed: Option<u64>,
    partner: Option<Box<dyn Agent>>,
    partner_obs: Option<ObservationBatch>,
    initialized: bool,
}

impl<B: VecEnvBackend> VecEnv<B> {
    /// Create from a backend; sub-environment `i` is seeded with `seed + i`
    pub fn new(backend: B, seed: Option<u64>) -> Self {
        Self {
            backend,
            seed,
            partner: None,
            partner_obs: None,
            initialized: false,
        }
    }

    /// Name of the wrapped backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Close all environments
    pub fn close(&mut self) {
        self.backend.close();
    }
}

impl<B: VecEnvBackend> VectorizedEnv for VecEnv<B> {
    fn num_envs(&self) -> usize {
        self.backend.num_envs()
    }

    fn observation_space(&self) -> DynSpace {
        self.backend.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.backend.action_space()
    }

    fn reset(&mut self) -> Result<ObservationBatch> {
        if self.initialized {
            return Err(CoplayError::Env(
                "vectorized environment was already reset".into(),
            ));
        }
        let players = self.backend.num_players();
        if players > 2 {
            return Err(CoplayError::Config(format!(
                "{} players per environment; only ego plus one partner is supported",
                players
            )));
        }
        if players > 1 && self.partner.is_none() {
            return Err(CoplayError::Env(format!(
                "{} players per environment but no partner agent registered",
                players
            )));
        }

        let mut observations = self.backend.reset(self.seed)?.into_iter();
        let ego = observations
            .next()
            .ok_or_else(|| CoplayError::Env("backend returned no observations".into()))?;
        if self.partner.is_some() {
            self.partner_obs = Some(observations.next().ok_or_else(|| {
                CoplayError::Env("backend returned no partner observations".into())
            })?);
        }
        self.initialized = true;
        tracing::debug!(
            backend = self.backend.name(),
            num_envs = self.backend.num_envs(),
            players,
            "environment reset"
        );
        Ok(ego)
    }

    fn step(&mut self, actions: &ActionBatch) -> Result<VecStep> {
        if !self.initialized {
            return Err(CoplayError::Env("step called before reset".into()));
        }

        let mut joint = Vec::with_capacity(self.backend.num_players());
        joint.push(actions.clone());
        if let Some(partner) = self.partner.as_mut() {
            let partner_obs = self
                .partner_obs
                .as_ref()
                .ok_or_else(|| CoplayError::Env("partner has no observation".into()))?;
            joint.push(partner.get_action(partner_obs, true)?);
        }

        let step = self.backend.step(&joint)?;
        let dones = step.dones();
        let BackendStep {
            observations,
            mut rewards,
            infos,
            ..
        } = step;

        if let Some(partner) = self.partner.as_mut() {
            let partner_rewards = rewards.get(PARTNER).ok_or_else(|| {
                CoplayError::Env("backend returned no partner rewards".into())
            })?;
            partner.update(partner_rewards, &dones)?;
        }

        let mut observations = observations.into_iter();
        let ego_obs = observations
            .next()
            .ok_or_else(|| CoplayError::Env("backend returned no observations".into()))?;
        if self.partner.is_some() {
            self.partner_obs = observations.next();
        }

        if rewards.len() <= EGO {
            return Err(CoplayError::Env("backend returned no rewards".into()));
        }
        Ok(VecStep {
            observations: ego_obs,
            rewards: rewards.swap_remove(EGO),
            dones,
            infos,
        })
    }

    fn add_partner_agent(&mut self, agent: Box<dyn Agent>) -> Result<()> {
        if self.partner.is_some() {
            return Err(CoplayError::Config(
                "a partner agent is already registered; multiple partners are not supported"
                    .into(),
            ));
        }
        if self.backend.num_players() < 2 {
            return Err(CoplayError::Config(
                "backend has no partner player slot".into(),
            ));
        }
        if self.initialized {
            return Err(CoplayError::Config(
                "partner agents must be registered before reset".into(),
            ));
        }
        tracing::debug!(partner = agent.name(), "partner agent registered");
        self.partner = Some(agent);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let (Some(partner), Some(obs)) = (self.partner.as_mut(), self.partner_obs.as_ref()) {
            partner.flush(obs)?;
        }
        Ok(())
    }
}
