use coplay::log::MetricHistory;
use coplay::prelude::*;
use coplay::training::Minibatch;
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Acts with action 0, values every state at `value`, reports a fixed KL.
struct Scripted {
    value: f32,
    approx_kl: f64,
    optimize_calls: Arc<AtomicUsize>,
    seen_advantages: Arc<Mutex<Vec<f32>>>,
    lr: f64,
}

impl Scripted {
    fn new(value: f32, approx_kl: f64) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let net = Self {
            value,
            approx_kl,
            optimize_calls: calls.clone(),
            seen_advantages: Arc::default(),
            lr: 0.0,
        };
        (net, calls)
    }
}

fn sorted(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    values
}

impl PolicyValueNetwork for Scripted {
    fn act(&self, observations: &Array2<f32>, _rng: &mut RandomState) -> coplay::Result<PolicyStep> {
        let n = observations.nrows();
        Ok(PolicyStep {
            actions: Array2::zeros((n, 1)),
            log_probs: Array1::zeros(n),
            values: Array1::from_elem(n, self.value),
        })
    }

    fn value(&self, observations: &Array2<f32>) -> coplay::Result<Array1<f32>> {
        Ok(Array1::from_elem(observations.nrows(), self.value))
    }

    fn optimize(&mut self, minibatch: &Minibatch, _loss: &LossConfig) -> coplay::Result<OptimStats> {
        self.optimize_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_advantages.lock() {
            seen.extend(minibatch.advantages.iter().copied());
        }
        Ok(OptimStats {
            approx_kl: self.approx_kl,
            ..Default::default()
        })
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn parameters(&self) -> coplay::Result<Vec<f32>> {
        Ok(vec![self.value])
    }
}

fn config(num_envs: usize, num_steps: usize, cycles: u64) -> TrainConfig {
    TrainConfig::default()
        .with_num_envs(num_envs)
        .with_num_steps(num_steps)
        .with_timesteps(num_envs as u64 * num_steps as u64 * cycles)
}

fn obs(num_envs: usize) -> Array2<f32> {
    Array2::zeros((num_envs, 3))
}

#[test]
fn buffer_fills_then_next_recorded_action_updates() {
    let cfg = config(2, 3, 2);
    let (net, calls) = Scripted::new(0.0, 0.0);
    let mut agent = PPOAgent::new("ego", net, &cfg, 3, 1, RandomState::new(0)).unwrap();

    for _ in 0..3 {
        agent.get_action(&obs(2), true).unwrap();
        agent.update(&[1.0, 1.0], &[false, false]).unwrap();
    }
    assert!(agent.buffer().is_full());
    assert_eq!(agent.buffer().cursor(), 3);
    assert_eq!(agent.phase(), AgentPhase::Updating);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Unrecorded acting never triggers the update
    agent.get_action(&obs(2), false).unwrap();
    assert_eq!(agent.phase(), AgentPhase::Updating);

    agent.get_action(&obs(2), true).unwrap();
    assert_eq!(agent.phase(), AgentPhase::Collecting);
    assert_eq!(agent.iteration(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), cfg.update_epochs);
    // New cycle holds only the row just pushed
    assert_eq!(agent.buffer().cursor(), 1);
    assert!(agent.buffer().has_pending());
    assert_eq!(agent.global_step(), 6);
}

#[test]
fn returns_respect_done_and_bootstrap() {
    let mut cfg = config(2, 4, 1);
    cfg.norm_adv = false;
    let (net, _) = Scripted::new(0.5, 0.0);
    let mut agent = PPOAgent::new("ego", net, &cfg, 3, 1, RandomState::new(0)).unwrap();

    for t in 0..4 {
        agent.get_action(&obs(2), true).unwrap();
        let done_env0 = t == 3;
        agent.update(&[1.0, 1.0], &[done_env0, false]).unwrap();
    }
    assert_eq!(agent.buffer().observations().shape(), &[4, 2, 3]);
    assert_eq!(agent.buffer().rewards().dim(), (4, 2));

    let (advantages, returns) = agent.compute_advantages(&obs(2)).unwrap();
    assert_eq!(returns.dim(), (4, 2));
    // Env 0 ended: nothing is bootstrapped past its last reward
    assert!((returns[[3, 0]] - 1.0).abs() < 1e-6);
    assert!((advantages[[3, 0]] - 0.5).abs() < 1e-6);
    // Env 1 continues: bootstrapped from the next state's value
    assert!((returns[[3, 1]] - (1.0 + 0.99 * 0.5)).abs() < 1e-6);
    for t in 0..4 {
        for e in 0..2 {
            assert!((returns[[t, e]] - (advantages[[t, e]] + 0.5)).abs() < 1e-6);
        }
    }

    let report = agent.finish_rollout(&obs(2)).unwrap();
    assert_eq!(report.iteration, 1);
    assert_eq!(agent.buffer().cursor(), 0);
}

/// Fill a 4x2 buffer with uneven rewards and run one single-epoch update,
/// returning the GAE output and every advantage the network was handed.
fn advantages_seen(norm_adv: bool) -> (Vec<f32>, Vec<f32>) {
    let mut cfg = config(2, 4, 1);
    cfg.norm_adv = norm_adv;
    cfg.update_epochs = 1;
    let (net, _) = Scripted::new(0.5, 0.0);
    let seen = net.seen_advantages.clone();
    let mut agent = PPOAgent::new("ego", net, &cfg, 3, 1, RandomState::new(0)).unwrap();

    for t in 0..4 {
        agent.get_action(&obs(2), true).unwrap();
        agent
            .update(&[t as f32 * 0.3, 1.0 - t as f32], &[t == 1, false])
            .unwrap();
    }
    let (advantages, _) = agent.compute_advantages(&obs(2)).unwrap();
    agent.finish_rollout(&obs(2)).unwrap();
    let seen = seen.lock().unwrap().clone();
    (advantages.iter().copied().collect(), seen)
}

#[test]
fn unnormalized_advantages_reach_network_unchanged() {
    let (gae, seen) = advantages_seen(false);
    assert_eq!(seen.len(), 8);
    assert_eq!(sorted(seen), sorted(gae));
}

#[test]
fn normalized_advantages_are_centered() {
    let (gae, seen) = advantages_seen(true);
    assert_eq!(seen.len(), 8);
    assert_ne!(sorted(seen.clone()), sorted(gae));
    let mean = seen.iter().sum::<f32>() / seen.len() as f32;
    assert!(mean.abs() < 1e-5);
}

#[test]
fn high_kl_stops_after_first_epoch() {
    let cfg = config(2, 2, 1).with_target_kl(Some(0.01));
    let (net, calls) = Scripted::new(0.0, 1.0);
    let history = MetricHistory::new();
    let mut agent = PPOAgent::new("ego", net, &cfg, 3, 1, RandomState::new(0))
        .unwrap()
        .with_logger(Box::new(history.clone()));

    for _ in 0..2 {
        agent.get_action(&obs(2), true).unwrap();
        agent.update(&[0.0, 1.0], &[false, false]).unwrap();
    }
    let report = agent.finish_rollout(&obs(2)).unwrap();
    assert_eq!(cfg.update_epochs, 4);
    assert_eq!(report.epochs_run, 1);
    assert!(report.early_stopped);
    assert_eq!(calls.load(Ordering::SeqCst), cfg.num_minibatches);
    assert_eq!(history.latest("ego/epochs_run"), Some(1.0));
    assert_eq!(history.latest("ego/approx_kl"), Some(1.0));
    assert_eq!(history.last_step("ego/approx_kl"), Some(4));
}

#[test]
fn low_kl_runs_every_epoch() {
    let cfg = config(2, 2, 1).with_target_kl(Some(0.5));
    let (net, calls) = Scripted::new(0.0, 0.01);
    let mut agent = PPOAgent::new("ego", net, &cfg, 3, 1, RandomState::new(0)).unwrap();

    for _ in 0..2 {
        agent.get_action(&obs(2), true).unwrap();
        agent.update(&[0.0, 1.0], &[false, false]).unwrap();
    }
    let report = agent.finish_rollout(&obs(2)).unwrap();
    assert_eq!(report.epochs_run, 4);
    assert!(!report.early_stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// One-step bandit: reward 1 for action 1, 0 otherwise, for both players.
struct TwoArm;

impl MultiAgentEnv for TwoArm {
    fn observation_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::uniform(&[1], 0.0, 1.0))
    }

    fn action_space(&self) -> DynSpace {
        DynSpace::Discrete(Discrete::new(2))
    }

    fn reset(&mut self, _seed: Option<u64>) -> coplay::Result<(Vec<ArrayD<f32>>, EnvInfo)> {
        Ok((vec![ArrayD::zeros(IxDyn(&[1])); 2], EnvInfo::new()))
    }

    fn step(&mut self, actions: &[ArrayD<f32>]) -> coplay::Result<MultiStepResult> {
        let reward = if actions[0][0] == 1.0 { 1.0 } else { 0.0 };
        Ok(MultiStepResult {
            observations: vec![ArrayD::zeros(IxDyn(&[1])); 2],
            rewards: vec![reward, reward],
            terminated: true,
            truncated: false,
            info: EnvInfo::new().with_episode_stats(reward, 1),
        })
    }
}

#[test]
fn self_play_learns_the_better_arm() {
    let cfg = TrainConfig {
        learning_rate: 0.5,
        anneal_lr: false,
        ..config(8, 8, 40)
    };
    let mut env = VecEnv::new(Serial::new(|| TwoArm, cfg.num_envs).unwrap(), Some(cfg.seed));
    let partner = PPOAgent::new(
        "partner",
        SoftmaxPolicy::new(2, cfg.learning_rate),
        &cfg,
        1,
        1,
        RandomState::new(2),
    )
    .unwrap();
    env.add_partner_agent(Box::new(partner)).unwrap();

    let mut ego = PPOAgent::new(
        "ego",
        SoftmaxPolicy::new(2, cfg.learning_rate),
        &cfg,
        1,
        1,
        RandomState::new(1),
    )
    .unwrap();
    let summary = run_training(&mut env, &mut ego, cfg.total_ticks(), None).unwrap();

    assert_eq!(summary.ticks, 8 * 40);
    assert_eq!(summary.episodes, 8 * 8 * 40);
    assert_eq!(ego.iteration(), 40);
    let probs = ego.network().probabilities();
    assert!(probs[1] > 0.9, "probabilities {:?}", probs);
}
