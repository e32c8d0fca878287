//! Probability distributions for RL policies.
//!
//! Sampling draws from a [`RandomState`] on the host rather than from
//! torch's global generator, so action sequences follow the run seed.

use crate::rng::RandomState;
use crate::{CoplayError, Result};
use rand::distributions::{Distribution as _, WeightedIndex};
use rand_distr::StandardNormal;
use tch::{Device, Kind, Tensor};

/// Enum for different types of probability distributions
pub enum Distribution {
    Categorical { logits: Tensor },
    Gaussian { mean: Tensor, std: Tensor },
}

impl Distribution {
    /// Sample raw actions from the distribution.
    ///
    /// Categorical samples are `[B]` indices (int64), Gaussian samples match `mean`.
    pub fn sample(&self, rng: &mut RandomState) -> Result<Tensor> {
        match self {
            Distribution::Categorical { logits } => {
                let size = logits.size();
                let (rows, k) = (size[0] as usize, size[size.len() - 1] as usize);
                let probs: Vec<f32> = Vec::try_from(
                    logits
                        .softmax(-1, Kind::Float)
                        .to_device(Device::Cpu)
                        .flatten(0, -1),
                )?;
                let mut indices = Vec::with_capacity(rows);
                for row in probs.chunks(k) {
                    let dist = WeightedIndex::new(row).map_err(|e| CoplayError::Numerical {
                        stage: "action sampling",
                        detail: e.to_string(),
                    })?;
                    indices.push(dist.sample(rng) as i64);
                }
                Ok(Tensor::from_slice(&indices).to_device(logits.device()))
            }
            Distribution::Gaussian { mean, std } => {
                let noise: Vec<f32> = (0..mean.numel())
                    .map(|_| StandardNormal.sample(rng))
                    .collect();
                let noise = Tensor::from_slice(&noise)
                    .reshape(mean.size())
                    .to_device(mean.device());
                Ok(mean + noise * std)
            }
        }
    }

    /// Compute log probabilities for given actions
    pub fn log_prob(&self, actions: &Tensor) -> Tensor {
        match self {
            Distribution::Categorical { logits } => {
                let log_probs = logits.log_softmax(-1, Kind::Float);
                let indices = if actions.dim() == log_probs.dim() {
                    actions.to_kind(Kind::Int64)
                } else {
                    actions.unsqueeze(-1).to_kind(Kind::Int64)
                };
                log_probs.gather(-1, &indices, false).squeeze_dim(-1)
            }
            Distribution::Gaussian { mean, std } => {
                let var = std.pow_tensor_scalar(2.0);
                let log_std = std.log();

                let log_2pi = (2.0 * std::f64::consts::PI).ln();
                let sq_diff = (actions - mean).pow_tensor_scalar(2.0);
                let element_wise_log_prob = (sq_diff / (var + 1e-8) + log_std * 2.0 + log_2pi) * -0.5;
                element_wise_log_prob.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            }
        }
    }

    /// Compute entropy of the distribution
    pub fn entropy(&self) -> Tensor {
        match self {
            Self::Categorical { logits } => {
                let probs = logits.softmax(-1, Kind::Float);
                let log_probs = logits.log_softmax(-1, Kind::Float);
                -(probs * log_probs).sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float)
            }
            Self::Gaussian { mean: _, std } => {
                let entropy = std.log() + 0.5 + 0.5 * (2.0 * std::f64::consts::PI).ln();
                entropy.sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float)
            }
        }
    }
}
