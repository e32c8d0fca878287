//! Many beams stepped together.

use crate::beam::{self, BeamParams, BeamState, OBS_SIZE};
use coplay::env::{EnvInfo, EGO, PARTNER};
use coplay::spaces::DynSpace;
use coplay::vector::{ActionBatch, BackendStep, BatchSimulator, ObservationBatch};
use coplay::{CoplayError, Result};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

struct World {
    state: BeamState,
    rng: ChaCha8Rng,
}

impl World {
    fn reset(&mut self, params: &BeamParams, seed: Option<u64>) {
        if let Some(s) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(s);
        }
        self.state = beam::initial_state(params, &mut self.rng);
    }
}

/// Result of one world's tick, gathered before stacking
struct WorldStep {
    reward: f32,
    terminated: bool,
    truncated: bool,
    info: EnvInfo,
}

/// Fused simulator over `num_worlds` independent beams.
///
/// Worlds advance in parallel on the rayon pool. Each world owns its RNG
/// and is seeded exactly like a `BalanceLine` at the same index, so given
/// the same seed and actions both backends produce identical trajectories.
pub struct BalanceBatch {
    params: BeamParams,
    worlds: Vec<World>,
}

impl BalanceBatch {
    pub fn new(num_worlds: usize) -> Self {
        Self::with_params(num_worlds, BeamParams::default())
    }

    pub fn with_params(num_worlds: usize, params: BeamParams) -> Self {
        let worlds = (0..num_worlds)
            .map(|_| World {
                state: BeamState::default(),
                rng: ChaCha8Rng::seed_from_u64(0),
            })
            .collect();
        Self { params, worlds }
    }

    pub fn params(&self) -> &BeamParams {
        &self.params
    }

    /// State of world `index`
    pub fn state(&self, index: usize) -> Option<&BeamState> {
        self.worlds.get(index).map(|w| &w.state)
    }

    fn observe_all(&self) -> Vec<ObservationBatch> {
        [EGO, PARTNER]
            .iter()
            .map(|&player| {
                let mut batch = Array2::zeros((self.worlds.len(), OBS_SIZE));
                for (mut row, world) in batch.outer_iter_mut().zip(&self.worlds) {
                    let obs = beam::observe(&world.state, &self.params, player);
                    row.iter_mut().zip(obs).for_each(|(dst, v)| *dst = v);
                }
                batch
            })
            .collect()
    }

    fn decode_column(batch: &ActionBatch) -> Result<Vec<usize>> {
        batch.column(0).iter().map(|&v| beam::decode_action(v)).collect()
    }
}

impl BatchSimulator for BalanceBatch {
    fn num_worlds(&self) -> usize {
        self.worlds.len()
    }

    fn observation_space(&self) -> DynSpace {
        self.params.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.params.action_space()
    }

    fn reset_all(&mut self, seed: Option<u64>) -> Result<Vec<ObservationBatch>> {
        let params = &self.params;
        self.worlds
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, world)| {
                world.reset(params, seed.map(|s| s.wrapping_add(i as u64)))
            });
        tracing::debug!(worlds = self.worlds.len(), ?seed, "reset balance batch");
        Ok(self.observe_all())
    }

    fn step_all(&mut self, actions: &[ActionBatch]) -> Result<BackendStep> {
        if actions.len() != 2 {
            return Err(CoplayError::InvalidAction(format!(
                "expected 2 action batches, got {}",
                actions.len()
            )));
        }
        let ego = Self::decode_column(&actions[EGO])?;
        let partner = Self::decode_column(&actions[PARTNER])?;
        if ego.len() != self.worlds.len() || partner.len() != self.worlds.len() {
            return Err(CoplayError::ShapeMismatch {
                expected: vec![self.worlds.len(), 1],
                actual: vec![ego.len().min(partner.len()), 1],
            });
        }

        let params = &self.params;
        let steps: Vec<WorldStep> = self
            .worlds
            .par_iter_mut()
            .zip(ego.par_iter().zip(partner.par_iter()))
            .map(|(world, (&a, &b))| {
                let tick = beam::advance(&mut world.state, params, a, b);
                let info = if tick.done() {
                    let info = EnvInfo::new()
                        .with_episode_stats(world.state.episode_return, world.state.steps)
                        .with_extra("final_angle", world.state.angle);
                    world.reset(params, None);
                    info
                } else {
                    EnvInfo::new()
                };
                WorldStep {
                    reward: tick.reward,
                    terminated: tick.terminated,
                    truncated: tick.truncated,
                    info,
                }
            })
            .collect();

        let rewards: Vec<f32> = steps.iter().map(|s| s.reward).collect();
        Ok(BackendStep {
            observations: self.observe_all(),
            rewards: vec![rewards.clone(), rewards],
            terminated: steps.iter().map(|s| s.terminated).collect(),
            truncated: steps.iter().map(|s| s.truncated).collect(),
            infos: steps.into_iter().map(|s| s.info).collect(),
        })
    }
}
