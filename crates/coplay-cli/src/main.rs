//! balance-train
//!
//! Self-play PPO on the two-player beam balancing task.

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

use coplay::log::{CompositeLogger, MetricHistory};
use coplay::prelude::*;
use coplay::rng::streams;
use coplay::training::progress_bar;
use coplay::utils::{abbreviate, accelerator_available, check_accelerator};
use coplay_envs::{BalanceBatch, BalanceLine};

#[derive(Parser, Debug)]
#[command(name = "balance-train")]
#[command(version, about = "Two-agent self-play PPO on a shared balancing beam", long_about = None)]
struct Args {
    /// Seed of the experiment
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Ask torch for deterministic kernels
    #[arg(long, default_value = "true", num_args = 0..=1, default_missing_value = "true",
          value_parser = parse_bool, action = ArgAction::Set)]
    torch_deterministic: bool,

    /// Require a CUDA accelerator
    #[arg(long, default_value = "true", num_args = 0..=1, default_missing_value = "true",
          value_parser = parse_bool, action = ArgAction::Set)]
    cuda: bool,

    /// Use the batched simulator instead of stepping environments one by one
    #[arg(long, default_value = "true", num_args = 0..=1, default_missing_value = "true",
          value_parser = parse_bool, action = ArgAction::Set)]
    madrona: bool,

    /// Total timesteps of the experiment
    #[arg(long, default_value_t = 5_000_000)]
    total_timesteps: u64,

    /// Number of parallel environments
    #[arg(long, default_value_t = 120)]
    num_envs: usize,

    /// Learning rate of the optimizer
    #[arg(long, default_value_t = 2.5e-4)]
    learning_rate: f64,

    /// Steps per environment per rollout
    #[arg(long, default_value_t = 60)]
    num_steps: usize,

    /// Anneal the learning rate linearly to zero
    #[arg(long, default_value = "true", num_args = 0..=1, default_missing_value = "true",
          value_parser = parse_bool, action = ArgAction::Set)]
    anneal_lr: bool,

    /// Discount factor
    #[arg(long, default_value_t = 0.99)]
    gamma: f64,

    /// Lambda for generalized advantage estimation
    #[arg(long, default_value_t = 0.95)]
    gae_lambda: f64,

    /// Minibatches per update epoch
    #[arg(long, default_value_t = 1)]
    num_minibatches: usize,

    /// Epochs per update
    #[arg(long, default_value_t = 4)]
    update_epochs: usize,

    /// Normalize advantages
    #[arg(long, default_value = "true", num_args = 0..=1, default_missing_value = "true",
          value_parser = parse_bool, action = ArgAction::Set)]
    norm_adv: bool,

    /// Surrogate clipping coefficient
    #[arg(long, default_value_t = 0.2)]
    clip_coef: f64,

    /// Clip the value loss
    #[arg(long, default_value = "true", num_args = 0..=1, default_missing_value = "true",
          value_parser = parse_bool, action = ArgAction::Set)]
    clip_vloss: bool,

    /// Entropy coefficient
    #[arg(long, default_value_t = 0.01)]
    ent_coef: f64,

    /// Value function coefficient
    #[arg(long, default_value_t = 0.5)]
    vf_coef: f64,

    /// Maximum gradient norm
    #[arg(long, default_value_t = 0.5)]
    max_grad_norm: f64,

    /// Target KL divergence for early stopping
    #[arg(long)]
    target_kl: Option<f64>,

    /// How the partner plays
    #[arg(long, value_enum, default_value_t = PartnerKind::Ppo)]
    partner: PartnerKind,

    /// Network architecture
    #[arg(long, value_enum, default_value_t = PolicyKind::Mlp)]
    policy: PolicyKind,

    /// Hidden layer width of the MLP policy
    #[arg(long, default_value_t = 64)]
    hidden_size: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PartnerKind {
    /// A second learner trained alongside the ego
    Ppo,
    /// A learner that acts but never updates
    Frozen,
    /// Uniformly random actions
    Random,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    /// Torch MLP actor-critic (requires the torch feature)
    Mlp,
    /// Observation-independent softmax with a scalar baseline
    Softmax,
}

/// Loose boolean: `y/yes/t/true/on/1` or `n/no/f/false/off/0`
fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        other => Err(format!("invalid truth value {:?}", other)),
    }
}

impl Args {
    fn train_config(&self) -> TrainConfig {
        TrainConfig {
            seed: self.seed,
            torch_deterministic: self.torch_deterministic,
            cuda: self.cuda,
            backend: if self.madrona {
                EnvBackend::Batched
            } else {
                EnvBackend::Serial
            },
            total_timesteps: self.total_timesteps,
            num_envs: self.num_envs,
            num_steps: self.num_steps,
            learning_rate: self.learning_rate,
            anneal_lr: self.anneal_lr,
            gamma: self.gamma,
            gae_lambda: self.gae_lambda,
            num_minibatches: self.num_minibatches,
            update_epochs: self.update_epochs,
            norm_adv: self.norm_adv,
            clip_coef: self.clip_coef,
            clip_vloss: self.clip_vloss,
            ent_coef: self.ent_coef,
            vf_coef: self.vf_coef,
            max_grad_norm: self.max_grad_norm,
            target_kl: self.target_kl,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let config = args.train_config();
    config.validate()?;
    check_accelerator(config.cuda, accelerator_available())?;
    #[cfg(feature = "torch")]
    coplay::utils::configure_torch(config.seed, config.torch_deterministic);

    let unix_time = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let run_name = config.run_name(unix_time);
    println!("Run saved to: {}", run_name);
    tracing::info!(config = %serde_json::to_string(&config)?, "resolved configuration");

    match config.backend {
        EnvBackend::Serial => {
            let backend = Serial::new(BalanceLine::new, config.num_envs)?;
            train(VecEnv::new(backend, Some(config.seed)), &args, &config, &run_name)
        }
        EnvBackend::Batched => {
            let backend = Batched::new(BalanceBatch::new(config.num_envs))?;
            train(VecEnv::new(backend, Some(config.seed)), &args, &config, &run_name)
        }
    }
}

fn train<B: VecEnvBackend>(
    mut env: VecEnv<B>,
    args: &Args,
    config: &TrainConfig,
    run_name: &str,
) -> Result<()> {
    let root = RandomState::new(config.seed);
    let history = MetricHistory::new();

    let partner: Box<dyn Agent> = match args.partner {
        PartnerKind::Ppo => learner(
            "partner",
            &env,
            args,
            config,
            &root,
            Box::new(history.clone()),
        )?,
        PartnerKind::Frozen => Box::new(Frozen::new(learner(
            "partner",
            &env,
            args,
            config,
            &root,
            Box::new(NoOpLogger),
        )?)),
        PartnerKind::Random => Box::new(RandomAgent::new(
            env.action_space(),
            root.stream(streams::PARTNER),
        )),
    };
    env.add_partner_agent(partner)?;

    let ego_logger = CompositeLogger::new(vec![
        Box::new(ConsoleLogger::named(run_name)),
        Box::new(history.clone()),
    ]);
    let mut ego = learner("ego", &env, args, config, &root, Box::new(ego_logger))?;
    tracing::info!(
        backend = env.backend_name(),
        envs = config.num_envs,
        updates = config.num_updates(),
        partner = ?args.partner,
        policy = ?args.policy,
        "starting self-play"
    );

    let ticks = config.total_ticks();
    let pb = progress_bar(ticks, "Training Agent");
    let summary = run_training(&mut env, &mut ego, ticks, Some(&pb))?;
    env.close();

    tracing::info!(
        run = run_name,
        steps = %abbreviate(summary.ticks * config.num_envs as u64),
        episodes = summary.episodes,
        mean_return = summary.mean_episode_return.unwrap_or(0.0),
        "run complete"
    );
    for (name, value) in history.snapshot() {
        tracing::info!(metric = %name, value, "final");
    }
    Ok(())
}

/// Build a PPO learner for the `"ego"` or `"partner"` seat, each with its
/// own acting and weight-init streams.
fn learner<B: VecEnvBackend>(
    name: &'static str,
    env: &VecEnv<B>,
    args: &Args,
    config: &TrainConfig,
    root: &RandomState,
    logger: Box<dyn MetricLogger>,
) -> Result<Box<dyn Agent>> {
    let (stream, init_stream) = if name == "ego" {
        (streams::EGO, streams::EGO_INIT)
    } else {
        (streams::PARTNER, streams::PARTNER_INIT)
    };
    let obs_size = env.observation_space().flat_dim();
    let action_space = env.action_space();
    let action_size = action_space.flat_dim();
    let rng = root.stream(stream);

    let agent: Box<dyn Agent> = match args.policy {
        PolicyKind::Softmax => {
            let network = SoftmaxPolicy::new(action_space.num_logits(), config.learning_rate);
            Box::new(
                PPOAgent::new(name, network, config, obs_size, action_size, rng)?
                    .with_logger(logger),
            )
        }
        PolicyKind::Mlp => {
            mlp_learner(name, env, args, config, root.stream(init_stream), rng, logger)?
        }
    };
    Ok(agent)
}

#[cfg(feature = "torch")]
fn mlp_learner<B: VecEnvBackend>(
    name: &'static str,
    env: &VecEnv<B>,
    args: &Args,
    config: &TrainConfig,
    mut init_rng: RandomState,
    rng: RandomState,
    logger: Box<dyn MetricLogger>,
) -> Result<Box<dyn Agent>> {
    let device = if config.cuda {
        tch::Device::Cuda(0)
    } else {
        tch::Device::Cpu
    };
    let mlp_config = MlpConfig {
        hidden_size: args.hidden_size,
        ..Default::default()
    };
    let policy = MlpPolicy::from_spaces(
        &env.observation_space(),
        &env.action_space(),
        mlp_config,
        device,
        &mut init_rng,
    )?;
    tracing::info!(
        agent = name,
        params = %abbreviate(policy.num_parameters().max(0) as u64),
        "created MLP policy"
    );

    let network = TorchNetwork::new(policy, config.learning_rate)?;
    let obs_size = env.observation_space().flat_dim();
    let action_size = env.action_space().flat_dim();
    let agent = PPOAgent::new(name, network, config, obs_size, action_size, rng)?;
    Ok(Box::new(agent.with_logger(logger)))
}

#[cfg(not(feature = "torch"))]
fn mlp_learner<B: VecEnvBackend>(
    _name: &'static str,
    _env: &VecEnv<B>,
    _args: &Args,
    _config: &TrainConfig,
    _init_rng: RandomState,
    _rng: RandomState,
    _logger: Box<dyn MetricLogger>,
) -> Result<Box<dyn Agent>> {
    tracing::error!("The MLP policy requires the 'torch' feature. Rebuild with:");
    tracing::error!("  cargo build --features torch");
    anyhow::bail!("--policy mlp is unavailable without the torch feature; use --policy softmax")
}
