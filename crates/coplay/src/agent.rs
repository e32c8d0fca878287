//! Acting agents that can drive a player slot.
//!
//! The ego learner and any registered partner implement the same [`Agent`]
//! trait, so a `PPOAgent` can be dropped into the partner slot for full
//! self-play, or swapped for a [`Frozen`] or [`RandomAgent`] partner.

use crate::rng::RandomState;
use crate::spaces::DynSpace;
use crate::vector::{ActionBatch, ObservationBatch};
use crate::Result;
use ndarray::Array2;

/// A policy acting on a batch of environment slots.
pub trait Agent: Send {
    /// Short name used in logs
    fn name(&self) -> &str {
        "agent"
    }

    /// Select one action row per environment slot.
    ///
    /// With `record`, the agent stores the transition for a later update.
    fn get_action(&mut self, observations: &ObservationBatch, record: bool) -> Result<ActionBatch>;

    /// Complete the most recently recorded transition with its outcome
    fn update(&mut self, rewards: &[f32], dones: &[bool]) -> Result<()>;

    /// Consume any pending work that needs the latest observations.
    ///
    /// Called by the driver once the last tick of a run has been stepped.
    fn flush(&mut self, _observations: &ObservationBatch) -> Result<()> {
        Ok(())
    }
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_action(&mut self, observations: &ObservationBatch, record: bool) -> Result<ActionBatch> {
        (**self).get_action(observations, record)
    }

    fn update(&mut self, rewards: &[f32], dones: &[bool]) -> Result<()> {
        (**self).update(rewards, dones)
    }

    fn flush(&mut self, observations: &ObservationBatch) -> Result<()> {
        (**self).flush(observations)
    }
}

/// Samples uniformly from the action space.
pub struct RandomAgent {
    action_space: DynSpace,
    rng: RandomState,
}

impl RandomAgent {
    pub fn new(action_space: DynSpace, rng: RandomState) -> Self {
        Self { action_space, rng }
    }
}

impl Agent for RandomAgent {
    fn name(&self) -> &str {
        "random"
    }

    fn get_action(&mut self, observations: &ObservationBatch, _record: bool) -> Result<ActionBatch> {
        let num_envs = observations.nrows();
        let dim = self.action_space.flat_dim();
        let mut actions = Array2::zeros((num_envs, dim));
        for mut row in actions.rows_mut() {
            row.assign(&self.action_space.sample_row(&mut self.rng));
        }
        Ok(actions)
    }

    fn update(&mut self, _rewards: &[f32], _dones: &[bool]) -> Result<()> {
        Ok(())
    }
}

/// Wraps an agent so it acts but never records or learns.
pub struct Frozen<A> {
    inner: A,
}

impl<A: Agent> Frozen<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: Agent> Agent for Frozen<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get_action(&mut self, observations: &ObservationBatch, _record: bool) -> Result<ActionBatch> {
        self.inner.get_action(observations, false)
    }

    fn update(&mut self, _rewards: &[f32], _dones: &[bool]) -> Result<()> {
        Ok(())
    }
}
