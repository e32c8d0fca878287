//! Analytic categorical policy.

use super::{LossConfig, OptimStats, PolicyStep, PolicyValueNetwork};
use crate::rng::RandomState;
use crate::training::ppo::{approx_kl, clipped_surrogate, value_loss};
use crate::training::Minibatch;
use crate::{CoplayError, Result};
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};

/// Categorical policy over `n` actions with a scalar value baseline.
///
/// Both the action logits and the baseline ignore the observation, so the
/// PPO gradients have a closed form and the network trains with plain SGD.
/// Useful as a fast, backend-free learner for self-play smoke runs and as a
/// reference for the loss plumbing.
#[derive(Clone, Debug)]
pub struct SoftmaxPolicy {
    logits: Array1<f32>,
    baseline: f32,
    learning_rate: f64,
}

impl SoftmaxPolicy {
    /// Uniform policy over `num_actions` with a zero baseline
    pub fn new(num_actions: usize, learning_rate: f64) -> Self {
        Self::with_logits(Array1::zeros(num_actions.max(1)), 0.0, learning_rate)
    }

    pub fn with_logits(logits: Array1<f32>, baseline: f32, learning_rate: f64) -> Self {
        Self {
            logits,
            baseline,
            learning_rate,
        }
    }

    pub fn num_actions(&self) -> usize {
        self.logits.len()
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Numerically stable log-softmax of the logits
    pub fn log_probabilities(&self) -> Array1<f32> {
        let max = self.logits.fold(f32::NEG_INFINITY, |m, &l| m.max(l));
        let log_z = self.logits.iter().map(|l| (l - max).exp()).sum::<f32>().ln() + max;
        self.logits.mapv(|l| l - log_z)
    }

    pub fn probabilities(&self) -> Array1<f32> {
        self.log_probabilities().mapv(f32::exp)
    }

    fn decode(&self, value: f32) -> Result<usize> {
        if value >= 0.0 && value.fract() == 0.0 && (value as usize) < self.num_actions() {
            Ok(value as usize)
        } else {
            Err(CoplayError::InvalidAction(format!(
                "{} is not one of {} discrete actions",
                value,
                self.num_actions()
            )))
        }
    }
}

impl PolicyValueNetwork for SoftmaxPolicy {
    fn act(&self, observations: &Array2<f32>, rng: &mut RandomState) -> Result<PolicyStep> {
        let log_p = self.log_probabilities();
        let dist = WeightedIndex::new(log_p.iter().map(|l| l.exp())).map_err(|e| {
            CoplayError::Numerical {
                stage: "action sampling",
                detail: e.to_string(),
            }
        })?;

        let rows = observations.nrows();
        let mut actions = Array2::zeros((rows, 1));
        let mut log_probs = Array1::zeros(rows);
        for i in 0..rows {
            let a = dist.sample(rng);
            actions[[i, 0]] = a as f32;
            log_probs[i] = log_p[a];
        }
        Ok(PolicyStep {
            actions,
            log_probs,
            values: Array1::from_elem(rows, self.baseline),
        })
    }

    fn value(&self, observations: &Array2<f32>) -> Result<Array1<f32>> {
        Ok(Array1::from_elem(observations.nrows(), self.baseline))
    }

    fn optimize(&mut self, minibatch: &Minibatch, loss: &LossConfig) -> Result<OptimStats> {
        let n = minibatch.len();
        if n == 0 {
            return Err(CoplayError::Buffer("empty minibatch".into()));
        }
        let clip = loss.clip_coef as f32;
        let value_clip = loss.clip_vloss.then_some(clip);

        let log_p = self.log_probabilities();
        let probs = log_p.mapv(f32::exp);
        let entropy = -(&probs * &log_p).sum();

        let mut logit_grad = Array1::<f32>::zeros(self.num_actions());
        let mut baseline_grad = 0.0f32;
        let (mut policy_loss, mut value_loss_sum) = (0.0f32, 0.0f32);
        let (mut kl, mut clipped) = (0.0f32, 0.0f32);

        for i in 0..n {
            let a = self.decode(minibatch.actions[[i, 0]])?;
            let log_ratio = log_p[a] - minibatch.log_probs[i];
            let ratio = log_ratio.exp();

            let (pl, d_logp) = clipped_surrogate(minibatch.advantages[i], ratio, clip);
            policy_loss += pl;
            // d log p[a] / d logits = onehot(a) - p
            logit_grad.scaled_add(-d_logp, &probs);
            logit_grad[a] += d_logp;

            let (vl, d_v) = value_loss(
                self.baseline,
                minibatch.values[i],
                minibatch.returns[i],
                value_clip,
            );
            value_loss_sum += vl;
            baseline_grad += d_v;

            kl += approx_kl(log_ratio);
            if (ratio - 1.0).abs() > clip {
                clipped += 1.0;
            }
        }

        let inv_n = 1.0 / n as f32;
        let ent_coef = loss.ent_coef as f32;
        let vf_coef = loss.vf_coef as f32;
        logit_grad *= inv_n;
        // Entropy bonus: d(-ent_coef * H)/d logits = ent_coef * p * (log p + H)
        logit_grad.zip_mut_with(&(&probs * &log_p.mapv(|l| l + entropy)), |g, &e| {
            *g += ent_coef * e
        });
        baseline_grad *= vf_coef * inv_n;

        let grad_norm = (logit_grad.iter().map(|g| g * g).sum::<f32>()
            + baseline_grad * baseline_grad)
            .sqrt();
        if !(grad_norm.is_finite() && policy_loss.is_finite() && value_loss_sum.is_finite()) {
            return Err(CoplayError::Numerical {
                stage: "optimization",
                detail: format!(
                    "policy loss {}, value loss {}, gradient norm {}",
                    policy_loss, value_loss_sum, grad_norm
                ),
            });
        }
        let max_norm = loss.max_grad_norm as f32;
        let scale = if grad_norm > max_norm {
            max_norm / (grad_norm + 1e-6)
        } else {
            1.0
        };
        let step = self.learning_rate as f32 * scale;
        self.logits.scaled_add(-step, &logit_grad);
        self.baseline -= step * baseline_grad;

        let policy_loss = policy_loss * inv_n;
        let value_loss_mean = value_loss_sum * inv_n;
        Ok(OptimStats {
            policy_loss: policy_loss as f64,
            value_loss: value_loss_mean as f64,
            entropy: entropy as f64,
            approx_kl: (kl * inv_n) as f64,
            clip_fraction: (clipped * inv_n) as f64,
            grad_norm: grad_norm as f64,
            total_loss: (policy_loss - ent_coef * entropy + vf_coef * value_loss_mean) as f64,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn parameters(&self) -> Result<Vec<f32>> {
        let mut params = self.logits.to_vec();
        params.push(self.baseline);
        Ok(params)
    }
}
