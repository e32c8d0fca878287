//! Shared beam dynamics.
//!
//! The ego pushes on the left end, the partner on the right end. Each player
//! observes the beam from its own side, so the partner's view is mirrored
//! and one policy can play either seat.

use coplay::spaces::{BoxSpace, Discrete, DynSpace};
use coplay::{CoplayError, Result};
use rand::Rng;

/// Force applied for each discrete action
pub const FORCES: [f32; 4] = [-1.0, -0.25, 0.25, 1.0];

/// Observation width: `[angle, angular_velocity, time_fraction, side]`
pub const OBS_SIZE: usize = 4;

/// Physical constants of the beam
#[derive(Clone, Debug, PartialEq)]
pub struct BeamParams {
    pub gravity: f32,
    pub torque_scale: f32,
    pub damping: f32,
    /// Integration timestep
    pub dt: f32,
    /// Episode terminates once |angle| exceeds this
    pub angle_limit: f32,
    /// Episode truncates after this many ticks
    pub max_steps: u32,
    /// Initial angle and velocity are drawn from `[-init_noise, init_noise]`
    pub init_noise: f32,
}

impl Default for BeamParams {
    fn default() -> Self {
        Self {
            gravity: 3.0,
            torque_scale: 2.0,
            damping: 0.1,
            dt: 0.05,
            angle_limit: 0.5,
            max_steps: 200,
            init_noise: 0.05,
        }
    }
}

impl BeamParams {
    pub fn observation_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::uniform(&[OBS_SIZE], -10.0, 10.0))
    }

    pub fn action_space(&self) -> DynSpace {
        DynSpace::Discrete(Discrete::new(FORCES.len()))
    }
}

/// Beam state for one episode
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeamState {
    pub angle: f32,
    pub angular_velocity: f32,
    pub steps: u32,
    pub episode_return: f32,
}

/// Outcome of one tick
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    /// Shared by both players
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

impl Tick {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Draw the starting state of an episode
pub fn initial_state<R: Rng>(params: &BeamParams, rng: &mut R) -> BeamState {
    let noise = params.init_noise;
    BeamState {
        angle: rng.gen_range(-noise..=noise),
        angular_velocity: rng.gen_range(-noise..=noise),
        steps: 0,
        episode_return: 0.0,
    }
}

/// Decode a float-encoded discrete action
pub fn decode_action(value: f32) -> Result<usize> {
    if value >= 0.0 && value.fract() == 0.0 && (value as usize) < FORCES.len() {
        Ok(value as usize)
    } else {
        Err(CoplayError::InvalidAction(format!(
            "{} is not one of {} beam actions",
            value,
            FORCES.len()
        )))
    }
}

/// Advance the beam by one tick under both players' actions
pub fn advance(state: &mut BeamState, params: &BeamParams, ego: usize, partner: usize) -> Tick {
    let torque = (FORCES[partner] - FORCES[ego]) * params.torque_scale;
    let accel = params.gravity * state.angle.sin() + torque - params.damping * state.angular_velocity;

    state.angular_velocity += params.dt * accel;
    state.angle += params.dt * state.angular_velocity;
    state.steps += 1;

    let terminated = state.angle.abs() > params.angle_limit;
    let truncated = !terminated && state.steps >= params.max_steps;
    let reward = if terminated { 0.0 } else { 1.0 };
    state.episode_return += reward;

    Tick {
        reward,
        terminated,
        truncated,
    }
}

/// Observation of `state` from `player`'s side
pub fn observe(state: &BeamState, params: &BeamParams, player: usize) -> [f32; OBS_SIZE] {
    let side = if player == 0 { 1.0 } else { -1.0 };
    [
        side * state.angle,
        side * state.angular_velocity,
        state.steps as f32 / params.max_steps as f32,
        side,
    ]
}
