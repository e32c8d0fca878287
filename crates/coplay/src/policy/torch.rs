//! tch-backed policy/value networks.

use super::{Distribution, LossConfig, OptimStats, PolicyStep, PolicyValueNetwork};
use crate::rng::RandomState;
use crate::training::ppo::{clip_fraction, kl_divergence, ppo_policy_loss, ppo_value_loss};
use crate::training::Minibatch;
use crate::{CoplayError, Result};
use ndarray::{Array1, Array2};
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};

/// Trait for policies that have a VarStore for optimization
pub trait HasVarStore {
    /// Get mutable reference to the VarStore
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Get reference to the VarStore
    fn var_store(&self) -> &nn::VarStore;
}

/// Trait for feed-forward tch policies
pub trait Policy: Send {
    /// Forward pass returning action distribution and value estimate
    fn forward(&self, observations: &Tensor) -> (Distribution, Tensor);

    /// Device the parameters live on
    fn device(&self) -> Device;
}

/// A tch [`Policy`] trained with Adam.
pub struct TorchNetwork<P: Policy + HasVarStore> {
    policy: P,
    optimizer: nn::Optimizer,
    learning_rate: f64,
}

impl<P: Policy + HasVarStore> TorchNetwork<P> {
    pub fn new(policy: P, learning_rate: f64) -> Result<Self> {
        let optimizer = nn::Adam {
            eps: 1e-5,
            ..Default::default()
        }
        .build(policy.var_store(), learning_rate)?;
        Ok(Self {
            policy,
            optimizer,
            learning_rate,
        })
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn global_grad_norm(&self) -> f64 {
        let mut global_norm = 0.0f64;
        for var in self.policy.var_store().variables().values() {
            let grad = var.grad();
            if grad.defined() {
                global_norm += grad
                    .pow_tensor_scalar(2.0)
                    .sum(Kind::Float)
                    .double_value(&[]);
            }
        }
        global_norm.sqrt()
    }

    fn clip_gradients(&self, global_norm: f64, max_norm: f64) {
        if global_norm > max_norm {
            let clip_coef = max_norm / (global_norm + 1e-6);
            for var in self.policy.var_store().variables().values() {
                let mut grad = var.grad();
                if grad.defined() {
                    let _ = grad.f_mul_scalar_(clip_coef);
                }
            }
        }
    }
}

impl<P: Policy + HasVarStore> PolicyValueNetwork for TorchNetwork<P> {
    fn act(&self, observations: &Array2<f32>, rng: &mut RandomState) -> Result<PolicyStep> {
        let device = self.policy.device();
        let obs = array2_to_tensor(observations, device);
        let (dist, values) = tch::no_grad(|| self.policy.forward(&obs));
        let sample = dist.sample(rng)?;
        let log_probs = tch::no_grad(|| dist.log_prob(&sample));

        let actions = match dist {
            Distribution::Categorical { .. } => sample.to_kind(Kind::Float).unsqueeze(-1),
            Distribution::Gaussian { .. } => sample,
        };
        Ok(PolicyStep {
            actions: tensor_to_array2(&actions)?,
            log_probs: tensor_to_array1(&log_probs)?,
            values: tensor_to_array1(&values)?,
        })
    }

    fn value(&self, observations: &Array2<f32>) -> Result<Array1<f32>> {
        let obs = array2_to_tensor(observations, self.policy.device());
        let (_, values) = tch::no_grad(|| self.policy.forward(&obs));
        tensor_to_array1(&values)
    }

    fn optimize(&mut self, minibatch: &Minibatch, loss: &LossConfig) -> Result<OptimStats> {
        let device = self.policy.device();
        let obs = array2_to_tensor(&minibatch.observations, device);
        let actions = array2_to_tensor(&minibatch.actions, device);
        let old_log_probs = array1_to_tensor(&minibatch.log_probs, device);
        let old_values = array1_to_tensor(&minibatch.values, device);
        let advantages = array1_to_tensor(&minibatch.advantages, device);
        let returns = array1_to_tensor(&minibatch.returns, device);

        let (dist, values) = self.policy.forward(&obs);
        let new_log_probs = dist.log_prob(&actions);
        let entropy = dist.entropy().mean(Kind::Float);

        let policy_loss = ppo_policy_loss(&advantages, &new_log_probs, &old_log_probs, loss.clip_coef);
        let value_loss = ppo_value_loss(
            &values,
            &old_values,
            &returns,
            loss.clip_vloss.then_some(loss.clip_coef),
        );
        let total = &policy_loss - loss.ent_coef * &entropy + loss.vf_coef * &value_loss;

        let (approx_kl, clip_frac) = tch::no_grad(|| {
            (
                kl_divergence(&new_log_probs, &old_log_probs).double_value(&[]),
                clip_fraction(&new_log_probs, &old_log_probs, loss.clip_coef).double_value(&[]),
            )
        });
        let mut stats = OptimStats {
            policy_loss: policy_loss.double_value(&[]),
            value_loss: value_loss.double_value(&[]),
            entropy: entropy.double_value(&[]),
            approx_kl,
            clip_fraction: clip_frac,
            grad_norm: 0.0,
            total_loss: total.double_value(&[]),
        };
        if let Some(field) = stats.non_finite_field() {
            return Err(CoplayError::Numerical {
                stage: "loss computation",
                detail: format!("{} is not finite", field),
            });
        }

        self.optimizer.zero_grad();
        total.backward();

        stats.grad_norm = self.global_grad_norm();
        if !stats.grad_norm.is_finite() {
            return Err(CoplayError::Numerical {
                stage: "backward pass",
                detail: format!("gradient norm is {}", stats.grad_norm),
            });
        }
        self.clip_gradients(stats.grad_norm, loss.max_grad_norm);
        self.optimizer.step();

        Ok(stats)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
        self.optimizer.set_lr(lr);
    }

    fn parameters(&self) -> Result<Vec<f32>> {
        let variables = self.policy.var_store().variables();
        let mut names: Vec<&String> = variables.keys().collect();
        names.sort();
        let mut params = Vec::new();
        for name in names {
            let flat: Vec<f32> = Vec::try_from(
                variables[name]
                    .to_device(Device::Cpu)
                    .to_kind(Kind::Float)
                    .flatten(0, -1),
            )?;
            params.extend(flat);
        }
        Ok(params)
    }
}

fn array2_to_tensor(array: &Array2<f32>, device: Device) -> Tensor {
    let (rows, cols) = array.dim();
    let flat: Vec<f32> = array.iter().copied().collect();
    Tensor::from_slice(&flat)
        .reshape([rows as i64, cols as i64])
        .to_device(device)
}

fn array1_to_tensor(array: &Array1<f32>, device: Device) -> Tensor {
    let flat: Vec<f32> = array.iter().copied().collect();
    Tensor::from_slice(&flat).to_device(device)
}

fn tensor_to_array1(tensor: &Tensor) -> Result<Array1<f32>> {
    let flat: Vec<f32> = Vec::try_from(tensor.to_device(Device::Cpu).to_kind(Kind::Float).flatten(0, -1))?;
    Ok(Array1::from(flat))
}

fn tensor_to_array2(tensor: &Tensor) -> Result<Array2<f32>> {
    let size = tensor.size();
    if size.len() != 2 {
        return Err(CoplayError::ShapeMismatch {
            expected: vec![0, 0],
            actual: size.iter().map(|&s| s as usize).collect(),
        });
    }
    let flat: Vec<f32> = Vec::try_from(tensor.to_device(Device::Cpu).to_kind(Kind::Float).flatten(0, -1))?;
    Ok(Array2::from_shape_vec((size[0] as usize, size[1] as usize), flat)?)
}
