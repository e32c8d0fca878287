//! Single-beam balancing environment.

use crate::beam::{self, BeamParams, BeamState};
use coplay::env::{EnvInfo, MultiAgentEnv, MultiStepResult, EGO, PARTNER};
use coplay::spaces::DynSpace;
use coplay::{CoplayError, Result};
use ndarray::{arr1, ArrayD};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Two players keep one beam level.
///
/// Player 0 pushes the left end and player 1 the right end. Both receive
/// 1.0 for each tick the beam stays inside the angle limit. The episode
/// terminates when it tips over and truncates after `max_steps` ticks.
pub struct BalanceLine {
    params: BeamParams,
    state: BeamState,
    rng: ChaCha8Rng,
}

impl BalanceLine {
    pub fn new() -> Self {
        Self::with_params(BeamParams::default())
    }

    pub fn with_params(params: BeamParams) -> Self {
        Self {
            params,
            state: BeamState::default(),
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    pub fn params(&self) -> &BeamParams {
        &self.params
    }

    pub fn state(&self) -> &BeamState {
        &self.state
    }

    fn observations(&self) -> Vec<ArrayD<f32>> {
        [EGO, PARTNER]
            .iter()
            .map(|&player| {
                arr1(&beam::observe(&self.state, &self.params, player)).into_dyn()
            })
            .collect()
    }

    fn player_action(actions: &[ArrayD<f32>], player: usize) -> Result<usize> {
        let value = actions
            .get(player)
            .and_then(|a| a.iter().next().copied())
            .ok_or_else(|| CoplayError::InvalidAction(format!("missing action for player {}", player)))?;
        beam::decode_action(value)
    }
}

impl Default for BalanceLine {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiAgentEnv for BalanceLine {
    fn observation_space(&self) -> DynSpace {
        self.params.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.params.action_space()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<ArrayD<f32>>, EnvInfo)> {
        if let Some(s) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(s);
        }
        self.state = beam::initial_state(&self.params, &mut self.rng);
        Ok((self.observations(), EnvInfo::new()))
    }

    fn step(&mut self, actions: &[ArrayD<f32>]) -> Result<MultiStepResult> {
        if actions.len() != 2 {
            return Err(CoplayError::InvalidAction(format!(
                "expected 2 actions, got {}",
                actions.len()
            )));
        }
        let ego = Self::player_action(actions, EGO)?;
        let partner = Self::player_action(actions, PARTNER)?;

        let tick = beam::advance(&mut self.state, &self.params, ego, partner);

        let info = if tick.done() {
            EnvInfo::new()
                .with_episode_stats(self.state.episode_return, self.state.steps)
                .with_extra("final_angle", self.state.angle)
        } else {
            EnvInfo::new()
        };

        Ok(MultiStepResult {
            observations: self.observations(),
            rewards: vec![tick.reward, tick.reward],
            terminated: tick.terminated,
            truncated: tick.truncated,
            info,
        })
    }

    fn render(&self) -> Option<String> {
        const WIDTH: usize = 41;
        let half = (WIDTH / 2) as f32;
        let tilt = (self.state.angle / self.params.angle_limit).clamp(-1.0, 1.0);
        let marker = (half + tilt * half).round() as usize;
        let line: String = (0..WIDTH)
            .map(|i| match i {
                i if i == marker => 'O',
                i if i == WIDTH / 2 => '^',
                _ => '-',
            })
            .collect();
        Some(format!(
            "[{}] angle={:+.3} step={}",
            line, self.state.angle, self.state.steps
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::OBS_SIZE;

    fn act(ego: f32, partner: f32) -> Vec<ArrayD<f32>> {
        vec![arr1(&[ego]).into_dyn(), arr1(&[partner]).into_dyn()]
    }

    #[test]
    fn test_reset_is_seeded() {
        let mut a = BalanceLine::new();
        let mut b = BalanceLine::new();
        let (obs_a, _) = a.reset(Some(42)).unwrap();
        let (obs_b, _) = b.reset(Some(42)).unwrap();
        assert_eq!(obs_a, obs_b);
        assert_eq!(obs_a.len(), 2);
        assert_eq!(obs_a[0].shape(), &[OBS_SIZE]);

        let (obs_c, _) = b.reset(Some(43)).unwrap();
        assert_ne!(obs_a[0], obs_c[0]);
    }

    #[test]
    fn test_shared_reward_and_mirrored_views() {
        let mut env = BalanceLine::new();
        env.reset(Some(0)).unwrap();
        let result = env.step(&act(1.0, 2.0)).unwrap();
        assert_eq!(result.rewards, vec![1.0, 1.0]);
        assert_eq!(result.observations[0][0], -result.observations[1][0]);
        assert_eq!(result.observations[0][3], 1.0);
        assert_eq!(result.observations[1][3], -1.0);
    }

    #[test]
    fn test_tipping_terminates_with_stats() {
        let mut env = BalanceLine::new();
        env.reset(Some(0)).unwrap();
        let mut result = env.step(&act(0.0, 3.0)).unwrap();
        while !result.done() {
            result = env.step(&act(0.0, 3.0)).unwrap();
        }
        assert!(result.terminated);
        assert_eq!(result.rewards, vec![0.0, 0.0]);
        assert_eq!(result.info.episode_length, Some(env.state().steps as f32));
        assert_eq!(
            result.info.episode_return,
            Some(env.state().steps as f32 - 1.0)
        );
    }

    #[test]
    fn test_invalid_action_rejected() {
        let mut env = BalanceLine::new();
        env.reset(None).unwrap();
        assert!(matches!(
            env.step(&act(7.0, 0.0)),
            Err(CoplayError::InvalidAction(_))
        ));
        assert!(env.step(&act(0.0, 0.0)[..1]).is_err());
    }

    #[test]
    fn test_render_shows_pivot() {
        let mut env = BalanceLine::new();
        env.reset(Some(1)).unwrap();
        let frame = env.render().unwrap();
        assert!(frame.contains('O'));
        assert!(frame.contains("step=0"));
    }
}
