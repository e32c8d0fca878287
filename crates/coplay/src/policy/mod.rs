//! Policy/value networks.
//!
//! Every network the PPO agent trains implements [`PolicyValueNetwork`]:
//! - `SoftmaxPolicy` - State-independent categorical policy with a scalar
//!   baseline and closed-form gradients; needs no tensor backend
//! - `TorchNetwork` - Wraps any tch [`Policy`] (such as `MlpPolicy`) with an
//!   Adam optimizer (requires `torch` feature)

mod softmax;

#[cfg(feature = "torch")]
mod distribution;
#[cfg(feature = "torch")]
mod mlp;
#[cfg(feature = "torch")]
mod torch;

pub use softmax::SoftmaxPolicy;

#[cfg(feature = "torch")]
pub use distribution::Distribution;
#[cfg(feature = "torch")]
pub use mlp::{Activation, MlpConfig, MlpPolicy};
#[cfg(feature = "torch")]
pub use torch::{HasVarStore, Policy, TorchNetwork};

use crate::rng::RandomState;
use crate::training::Minibatch;
use crate::Result;
use ndarray::{Array1, Array2};

/// Output of one forward pass over a batch of observations
#[derive(Clone, Debug)]
pub struct PolicyStep {
    /// Sampled actions, one row per observation
    pub actions: Array2<f32>,
    /// Log-probability of each sampled action
    pub log_probs: Array1<f32>,
    /// Value estimate of each observation
    pub values: Array1<f32>,
}

/// Loss coefficients for one gradient step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossConfig {
    pub clip_coef: f64,
    pub clip_vloss: bool,
    pub ent_coef: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
}

/// Diagnostics from one gradient step
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OptimStats {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub approx_kl: f64,
    pub clip_fraction: f64,
    /// Global gradient norm before clipping
    pub grad_norm: f64,
    pub total_loss: f64,
}

impl OptimStats {
    /// Name of the first NaN/Inf field, if any
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("policy_loss", self.policy_loss),
            ("value_loss", self.value_loss),
            ("entropy", self.entropy),
            ("approx_kl", self.approx_kl),
            ("grad_norm", self.grad_norm),
            ("total_loss", self.total_loss),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
    }

    /// Field-wise mean
    pub fn mean(stats: &[OptimStats]) -> OptimStats {
        if stats.is_empty() {
            return OptimStats::default();
        }
        let n = stats.len() as f64;
        let sum = |f: fn(&OptimStats) -> f64| stats.iter().map(f).sum::<f64>() / n;
        OptimStats {
            policy_loss: sum(|s| s.policy_loss),
            value_loss: sum(|s| s.value_loss),
            entropy: sum(|s| s.entropy),
            approx_kl: sum(|s| s.approx_kl),
            clip_fraction: sum(|s| s.clip_fraction),
            grad_norm: sum(|s| s.grad_norm),
            total_loss: sum(|s| s.total_loss),
        }
    }
}

/// Maps observations to an action distribution and a value estimate, and
/// owns the optimizer that updates it.
pub trait PolicyValueNetwork: Send {
    /// Sample actions for a batch of observations
    fn act(&self, observations: &Array2<f32>, rng: &mut RandomState) -> Result<PolicyStep>;

    /// Value estimates only, used to bootstrap the final observation
    fn value(&self, observations: &Array2<f32>) -> Result<Array1<f32>>;

    /// One clipped PPO gradient step on `minibatch`
    fn optimize(&mut self, minibatch: &Minibatch, loss: &LossConfig) -> Result<OptimStats>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    /// Flat copy of every trainable parameter
    fn parameters(&self) -> Result<Vec<f32>>;
}

impl<N: PolicyValueNetwork + ?Sized> PolicyValueNetwork for Box<N> {
    fn act(&self, observations: &Array2<f32>, rng: &mut RandomState) -> Result<PolicyStep> {
        (**self).act(observations, rng)
    }

    fn value(&self, observations: &Array2<f32>) -> Result<Array1<f32>> {
        (**self).value(observations)
    }

    fn optimize(&mut self, minibatch: &Minibatch, loss: &LossConfig) -> Result<OptimStats> {
        (**self).optimize(minibatch, loss)
    }

    fn learning_rate(&self) -> f64 {
        (**self).learning_rate()
    }

    fn set_learning_rate(&mut self, lr: f64) {
        (**self).set_learning_rate(lr)
    }

    fn parameters(&self) -> Result<Vec<f32>> {
        (**self).parameters()
    }
}
