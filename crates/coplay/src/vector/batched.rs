//! Batched vectorization backend.
//!
//! Delegates the whole batch to a [`BatchSimulator`], which advances every
//! world in one fused call. The simulator may parallelize internally; this
//! wrapper only enforces the shape and lifecycle contract so callers cannot
//! tell it apart from [`Serial`](super::Serial).

use super::check_actions;
use super::vecenv::{ActionBatch, BackendStep, ObservationBatch, VecEnvBackend};
use crate::spaces::DynSpace;
use crate::{CoplayError, Result};

/// A simulator that owns all worlds and steps them together.
///
/// `step_all` must auto-reset finished worlds and return the reset
/// observation for them, exactly like the serial backend. World `i` is
/// seeded with `seed + i` on `reset_all`.
pub trait BatchSimulator: Send {
    fn num_worlds(&self) -> usize;

    fn num_players(&self) -> usize {
        2
    }

    fn observation_space(&self) -> DynSpace;

    fn action_space(&self) -> DynSpace;

    fn reset_all(&mut self, seed: Option<u64>) -> Result<Vec<ObservationBatch>>;

    fn step_all(&mut self, actions: &[ActionBatch]) -> Result<BackendStep>;

    fn close(&mut self) {}
}

/// Batched vectorization backend
pub struct Batched<S: BatchSimulator> {
    sim: S,
    obs_dim: usize,
    action_dim: usize,
    ready: bool,
}

impl<S: BatchSimulator> Batched<S> {
    pub fn new(sim: S) -> Result<Self> {
        if sim.num_worlds() == 0 {
            return Err(CoplayError::Config("Number of environments must be > 0".into()));
        }
        let obs_dim = sim.observation_space().flat_dim();
        let action_dim = sim.action_space().flat_dim();
        Ok(Self {
            sim,
            obs_dim,
            action_dim,
            ready: false,
        })
    }

    fn check_observations(&self, observations: &[ObservationBatch]) -> Result<()> {
        if observations.len() != self.sim.num_players() {
            return Err(CoplayError::Env(format!(
                "simulator returned {} observation batches for {} players",
                observations.len(),
                self.sim.num_players()
            )));
        }
        for batch in observations {
            if batch.dim() != (self.sim.num_worlds(), self.obs_dim) {
                return Err(CoplayError::ShapeMismatch {
                    expected: vec![self.sim.num_worlds(), self.obs_dim],
                    actual: batch.shape().to_vec(),
                });
            }
        }
        Ok(())
    }
}

impl<S: BatchSimulator> VecEnvBackend for Batched<S> {
    fn observation_space(&self) -> DynSpace {
        self.sim.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.sim.action_space()
    }

    fn num_envs(&self) -> usize {
        self.sim.num_worlds()
    }

    fn num_players(&self) -> usize {
        self.sim.num_players()
    }

    fn name(&self) -> &'static str {
        "batched"
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<ObservationBatch>> {
        let observations = self.sim.reset_all(seed)?;
        self.check_observations(&observations)?;
        self.ready = true;
        Ok(observations)
    }

    fn step(&mut self, actions: &[ActionBatch]) -> Result<BackendStep> {
        if !self.ready {
            return Err(CoplayError::Env("simulator stepped before reset".into()));
        }
        let num_worlds = self.sim.num_worlds();
        check_actions(actions, self.sim.num_players(), num_worlds, self.action_dim)?;

        let step = self.sim.step_all(actions)?;
        self.check_observations(&step.observations)?;
        let flags_ok = step.terminated.len() == num_worlds
            && step.truncated.len() == num_worlds
            && step.infos.len() == num_worlds;
        let rewards_ok = step.rewards.len() == self.sim.num_players()
            && step.rewards.iter().all(|r| r.len() == num_worlds);
        if !flags_ok || !rewards_ok {
            return Err(CoplayError::Env(
                "simulator returned a step with mismatched batch sizes".into(),
            ));
        }
        Ok(step)
    }

    fn close(&mut self) {
        self.sim.close();
    }
}
