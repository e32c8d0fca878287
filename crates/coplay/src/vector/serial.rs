//! Serial (sequential) vectorization backend.
//!
//! Steps sub-environments one at a time in a single thread and stacks the
//! results.

use super::vecenv::{ActionBatch, BackendStep, ObservationBatch, VecEnvBackend};
use super::{check_actions, stack_rows};
use crate::env::MultiAgentEnv;
use crate::spaces::DynSpace;
use crate::{CoplayError, Result};
use ndarray::ArrayD;

/// Serial vectorization backend
pub struct Serial<E: MultiAgentEnv> {
    envs: Vec<E>,
    obs_space: DynSpace,
    action_space: DynSpace,
    num_players: usize,
    obs_dim: usize,
}

impl<E: MultiAgentEnv> Serial<E> {
    /// Create `num_envs` environments from `env_creator`
    pub fn new<F>(env_creator: F, num_envs: usize) -> Result<Self>
    where
        F: Fn() -> E,
    {
        if num_envs == 0 {
            return Err(CoplayError::Config("Number of environments must be > 0".into()));
        }

        let envs: Vec<E> = (0..num_envs).map(|_| env_creator()).collect();
        let obs_space = envs[0].observation_space();
        let action_space = envs[0].action_space();
        let num_players = envs[0].num_players();
        if envs.iter().any(|e| e.num_players() != num_players) {
            return Err(CoplayError::Config(
                "all sub-environments must have the same number of players".into(),
            ));
        }
        let obs_dim = obs_space.flat_dim();

        Ok(Self {
            envs,
            obs_space,
            action_space,
            num_players,
            obs_dim,
        })
    }

    /// Borrow the sub-environments
    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    fn stack_players(&self, per_env: &[Vec<ArrayD<f32>>]) -> Result<Vec<ObservationBatch>> {
        (0..self.num_players)
            .map(|p| {
                let rows = per_env.iter().map(|obs| &obs[p]);
                stack_rows(rows, per_env.len(), self.obs_dim)
            })
            .collect()
    }

    fn check_player_count(&self, obs: &[ArrayD<f32>]) -> Result<()> {
        if obs.len() != self.num_players {
            return Err(CoplayError::Env(format!(
                "environment returned {} observations for {} players",
                obs.len(),
                self.num_players
            )));
        }
        Ok(())
    }
}

impl<E: MultiAgentEnv> VecEnvBackend for Serial<E> {
    fn observation_space(&self) -> DynSpace {
        self.obs_space.clone()
    }

    fn action_space(&self) -> DynSpace {
        self.action_space.clone()
    }

    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn num_players(&self) -> usize {
        self.num_players
    }

    fn name(&self) -> &'static str {
        "serial"
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<ObservationBatch>> {
        let mut per_env = Vec::with_capacity(self.envs.len());
        for (i, env) in self.envs.iter_mut().enumerate() {
            let env_seed = seed.map(|s| s.wrapping_add(i as u64));
            let (obs, _info) = env.reset(env_seed)?;
            per_env.push(obs);
        }
        for obs in &per_env {
            self.check_player_count(obs)?;
        }
        self.stack_players(&per_env)
    }

    fn step(&mut self, actions: &[ActionBatch]) -> Result<BackendStep> {
        let num_envs = self.envs.len();
        check_actions(
            actions,
            self.num_players,
            num_envs,
            self.action_space.flat_dim(),
        )?;

        let mut per_env = Vec::with_capacity(num_envs);
        let mut rewards = vec![Vec::with_capacity(num_envs); self.num_players];
        let mut terminated = Vec::with_capacity(num_envs);
        let mut truncated = Vec::with_capacity(num_envs);
        let mut infos = Vec::with_capacity(num_envs);

        for (i, env) in self.envs.iter_mut().enumerate() {
            let joint: Vec<ArrayD<f32>> = actions
                .iter()
                .map(|batch| batch.row(i).to_owned().into_dyn())
                .collect();
            let result = env.step(&joint)?;
            if result.rewards.len() != self.num_players {
                return Err(CoplayError::Env(format!(
                    "environment {} returned {} rewards for {} players",
                    i,
                    result.rewards.len(),
                    self.num_players
                )));
            }
            for (p, &r) in result.rewards.iter().enumerate() {
                rewards[p].push(r);
            }

            // Done slots hand back the first observation of the next episode
            let observations = if result.done() {
                env.reset(None)?.0
            } else {
                result.observations
            };
            per_env.push(observations);
            terminated.push(result.terminated);
            truncated.push(result.truncated);
            infos.push(result.info);
        }
        for obs in &per_env {
            self.check_player_count(obs)?;
        }

        Ok(BackendStep {
            observations: self.stack_players(&per_env)?,
            rewards,
            terminated,
            truncated,
            infos,
        })
    }

    fn close(&mut self) {
        for env in &mut self.envs {
            env.close();
        }
    }
}
