//! Multi-layer perceptron policy.

use super::{Distribution, HasVarStore, Policy};
use crate::rng::RandomState;
use crate::spaces::DynSpace;
use crate::Result;
use rand_distr::{Distribution as _, StandardNormal};
use tch::{nn, nn::Module, Device, Tensor};

/// Configuration for MLP policy
#[derive(Clone, Debug)]
pub struct MlpConfig {
    /// Hidden layer size
    pub hidden_size: i64,
    /// Number of hidden layers
    pub num_layers: usize,
    pub activation: Activation,
}

#[derive(Clone, Debug, Copy)]
pub enum Activation {
    ReLU,
    Tanh,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_layers: 2,
            activation: Activation::Tanh,
        }
    }
}

/// Multi-layer perceptron policy with actor and critic heads
pub struct MlpPolicy {
    /// Variable store for parameters
    vs: nn::VarStore,
    /// Encoder network
    encoder: nn::Sequential,
    /// Actor head (action logits, or mean and log-std)
    actor: nn::Linear,
    /// Critic head (value estimate)
    critic: nn::Linear,
    is_continuous: bool,
    device: Device,
}

impl MlpPolicy {
    /// Create a new MLP policy, drawing initial weights from `rng`
    pub fn new(
        obs_size: i64,
        num_actions: i64,
        is_continuous: bool,
        config: MlpConfig,
        device: Device,
        rng: &mut RandomState,
    ) -> Result<Self> {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let mut encoder = nn::seq();
        let mut in_size = obs_size;

        for i in 0..config.num_layers {
            let layer = nn::linear(
                &root / format!("encoder_{}", i),
                in_size,
                config.hidden_size,
                Default::default(),
            );
            encoder = encoder.add(layer);

            match config.activation {
                Activation::ReLU => encoder = encoder.add_fn(|x| x.relu()),
                Activation::Tanh => encoder = encoder.add_fn(|x| x.tanh()),
            }

            in_size = config.hidden_size;
        }

        let actor_out = if is_continuous {
            num_actions * 2 // Mean and log_std
        } else {
            num_actions
        };

        let actor = nn::linear(&root / "actor", in_size, actor_out, Default::default());
        let critic = nn::linear(&root / "critic", in_size, 1, Default::default());

        Self::init_weights(&vs, rng)?;

        Ok(Self {
            vs,
            encoder,
            actor,
            critic,
            is_continuous,
            device,
        })
    }

    pub fn from_spaces(
        obs_space: &DynSpace,
        action_space: &DynSpace,
        config: MlpConfig,
        device: Device,
        rng: &mut RandomState,
    ) -> Result<Self> {
        Self::new(
            obs_space.flat_dim() as i64,
            action_space.num_logits() as i64,
            action_space.is_continuous(),
            config,
            device,
            rng,
        )
    }

    /// Small normal weights and zero biases, visited in name order
    fn init_weights(vs: &nn::VarStore, rng: &mut RandomState) -> Result<()> {
        let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
        variables.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, mut var) in variables {
            if name.contains("weight") {
                let values: Vec<f32> = (0..var.numel())
                    .map(|_| {
                        let z: f32 = StandardNormal.sample(rng);
                        z * 0.01
                    })
                    .collect();
                let init = Tensor::from_slice(&values)
                    .reshape(var.size())
                    .to_device(var.device());
                tch::no_grad(|| var.f_copy_(&init))?;
            } else if name.contains("bias") {
                tch::no_grad(|| var.f_zero_())?;
            }
        }
        Ok(())
    }

    /// Get the number of parameters
    pub fn num_parameters(&self) -> i64 {
        self.vs.variables().values().map(|v| v.numel() as i64).sum()
    }
}

impl HasVarStore for MlpPolicy {
    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl Policy for MlpPolicy {
    fn forward(&self, observations: &Tensor) -> (Distribution, Tensor) {
        let obs = observations.to_device(self.device);
        let hidden = self.encoder.forward(&obs);
        let actor_out = self.actor.forward(&hidden);
        let value = self.critic.forward(&hidden).squeeze_dim(-1);

        let dist = if self.is_continuous {
            let mean_logstd = actor_out.chunk(2, -1);
            let mean = mean_logstd[0].shallow_clone();
            // log_std clamped for stability
            let log_std = mean_logstd[1].clamp(-20.0, 2.0);
            Distribution::Gaussian {
                mean,
                std: log_std.exp(),
            }
        } else {
            Distribution::Categorical { logits: actor_out }
        };

        (dist, value)
    }

    fn device(&self) -> Device {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn policy(seed: u64) -> MlpPolicy {
        MlpPolicy::new(
            4,
            2,
            false,
            MlpConfig::default(),
            Device::Cpu,
            &mut RandomState::new(seed),
        )
        .unwrap()
    }

    #[test]
    fn test_mlp_forward() {
        let policy = policy(0);
        let obs = Tensor::randn([8, 4], (Kind::Float, Device::Cpu));
        let (dist, value) = policy.forward(&obs);

        match dist {
            Distribution::Categorical { logits } => {
                assert_eq!(logits.size(), [8, 2]);
            }
            _ => panic!("Expected categorical distribution"),
        }
        assert_eq!(value.size(), [8]);
    }

    #[test]
    fn test_init_follows_seed() {
        let a = policy(5);
        let b = policy(5);
        let c = policy(6);
        let first = |p: &MlpPolicy| {
            let vars = p.var_store().variables();
            vars["encoder_0.weight"].shallow_clone()
        };
        assert!(first(&a).equal(&first(&b)));
        assert!(!first(&a).equal(&first(&c)));
    }
}
