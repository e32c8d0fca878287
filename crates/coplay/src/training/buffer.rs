//! Rollout buffer for one agent's trajectory.

use crate::rng::RandomState;
use crate::{CoplayError, Result};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};

/// Fixed-horizon storage of `num_steps` rows, one row per tick across all envs.
///
/// A row is appended by [`push`](Self::push) when the agent acts and
/// completed by [`complete`](Self::complete) once the environment reports
/// rewards and dones. Only a buffer whose every row is complete can be
/// flattened for an update.
pub struct RolloutBuffer {
    observations: Array3<f32>,
    actions: Array3<f32>,
    log_probs: Array2<f32>,
    values: Array2<f32>,
    rewards: Array2<f32>,
    dones: Array2<f32>,
    num_steps: usize,
    num_envs: usize,
    /// Rows appended
    cursor: usize,
    /// Rows with rewards recorded
    completed: usize,
}

impl RolloutBuffer {
    pub fn new(num_steps: usize, num_envs: usize, obs_size: usize, action_size: usize) -> Self {
        Self {
            observations: Array3::zeros((num_steps, num_envs, obs_size)),
            actions: Array3::zeros((num_steps, num_envs, action_size)),
            log_probs: Array2::zeros((num_steps, num_envs)),
            values: Array2::zeros((num_steps, num_envs)),
            rewards: Array2::zeros((num_steps, num_envs)),
            dones: Array2::zeros((num_steps, num_envs)),
            num_steps,
            num_envs,
            cursor: 0,
            completed: 0,
        }
    }

    /// Append the acting half of a transition row
    pub fn push(
        &mut self,
        observations: &Array2<f32>,
        actions: &Array2<f32>,
        log_probs: &Array1<f32>,
        values: &Array1<f32>,
    ) -> Result<()> {
        if self.cursor == self.num_steps {
            return Err(CoplayError::Buffer(format!(
                "buffer already holds {} rows",
                self.num_steps
            )));
        }
        if self.completed != self.cursor {
            return Err(CoplayError::Buffer(
                "previous row has no reward recorded yet".into(),
            ));
        }
        check_shape(observations.shape(), &self.observations.shape()[1..])?;
        check_shape(actions.shape(), &self.actions.shape()[1..])?;
        check_shape(log_probs.shape(), &[self.num_envs])?;
        check_shape(values.shape(), &[self.num_envs])?;

        let t = self.cursor;
        self.observations.index_axis_mut(Axis(0), t).assign(observations);
        self.actions.index_axis_mut(Axis(0), t).assign(actions);
        self.log_probs.row_mut(t).assign(log_probs);
        self.values.row_mut(t).assign(values);
        self.cursor += 1;
        Ok(())
    }

    /// Record rewards and dones for the most recent row
    pub fn complete(&mut self, rewards: &[f32], dones: &[bool]) -> Result<()> {
        if self.completed == self.cursor {
            return Err(CoplayError::Buffer(
                "no pending row to record rewards for".into(),
            ));
        }
        check_shape(&[rewards.len()], &[self.num_envs])?;
        check_shape(&[dones.len()], &[self.num_envs])?;

        let t = self.completed;
        for (slot, &r) in self.rewards.row_mut(t).iter_mut().zip(rewards) {
            *slot = r;
        }
        for (slot, &d) in self.dones.row_mut(t).iter_mut().zip(dones) {
            *slot = if d { 1.0 } else { 0.0 };
        }
        self.completed += 1;
        Ok(())
    }

    /// Rows appended so far in this cycle
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// All `num_steps` rows are appended and completed
    pub fn is_full(&self) -> bool {
        self.completed == self.num_steps
    }

    /// A row is waiting for its rewards
    pub fn has_pending(&self) -> bool {
        self.cursor > self.completed
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// `(num_steps, num_envs, obs_size)`
    pub fn observations(&self) -> &Array3<f32> {
        &self.observations
    }

    /// `(num_steps, num_envs, action_size)`
    pub fn actions(&self) -> &Array3<f32> {
        &self.actions
    }

    pub fn rewards(&self) -> ArrayView2<'_, f32> {
        self.rewards.view()
    }

    pub fn values(&self) -> ArrayView2<'_, f32> {
        self.values.view()
    }

    pub fn dones(&self) -> ArrayView2<'_, f32> {
        self.dones.view()
    }

    pub fn log_probs(&self) -> ArrayView2<'_, f32> {
        self.log_probs.view()
    }

    /// Start a new cycle; old rows are overwritten as new ones arrive
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.completed = 0;
    }

    /// Flatten the full buffer into one `(num_steps * num_envs)` batch, step-major
    pub fn flatten(&self, advantages: &Array2<f32>, returns: &Array2<f32>) -> Result<Batch> {
        if !self.is_full() {
            return Err(CoplayError::Buffer(format!(
                "cannot consume a partial buffer ({} of {} rows complete)",
                self.completed, self.num_steps
            )));
        }
        check_shape(advantages.shape(), self.rewards.shape())?;
        check_shape(returns.shape(), self.rewards.shape())?;

        let rows = self.num_steps * self.num_envs;
        let obs_size = self.observations.shape()[2];
        let action_size = self.actions.shape()[2];
        let flat = |a: &Array2<f32>| a.iter().copied().collect::<Array1<f32>>();

        Ok(Batch {
            observations: self
                .observations
                .clone()
                .into_shape_with_order((rows, obs_size))?,
            actions: self.actions.clone().into_shape_with_order((rows, action_size))?,
            log_probs: flat(&self.log_probs),
            values: flat(&self.values),
            advantages: flat(advantages),
            returns: flat(returns),
        })
    }
}

fn check_shape(actual: &[usize], expected: &[usize]) -> Result<()> {
    if actual != expected {
        return Err(CoplayError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// Flattened rollout ready for optimization
#[derive(Clone, Debug)]
pub struct Batch {
    pub observations: Array2<f32>,
    pub actions: Array2<f32>,
    pub log_probs: Array1<f32>,
    pub values: Array1<f32>,
    pub advantages: Array1<f32>,
    pub returns: Array1<f32>,
}

/// A slice of the flattened batch used for one gradient step
pub type Minibatch = Batch;

impl Batch {
    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the given rows
    pub fn select(&self, indices: &[usize]) -> Minibatch {
        Batch {
            observations: self.observations.select(Axis(0), indices),
            actions: self.actions.select(Axis(0), indices),
            log_probs: self.log_probs.select(Axis(0), indices),
            values: self.values.select(Axis(0), indices),
            advantages: self.advantages.select(Axis(0), indices),
            returns: self.returns.select(Axis(0), indices),
        }
    }
}

/// Shuffle `0..batch_size` and split it into `num_minibatches` equal chunks
pub fn minibatch_indices(
    batch_size: usize,
    num_minibatches: usize,
    rng: &mut RandomState,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..batch_size).collect();
    rng.shuffle(&mut indices);
    let chunk = (batch_size / num_minibatches.max(1)).max(1);
    indices.chunks(chunk).map(|c| c.to_vec()).collect()
}
