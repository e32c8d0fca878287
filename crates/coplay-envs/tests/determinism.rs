use coplay::prelude::*;
use coplay::rng::streams;
use coplay_envs::{BalanceBatch, BalanceLine};

fn config(seed: u64) -> TrainConfig {
    TrainConfig::default()
        .with_seed(seed)
        .with_num_envs(4)
        .with_num_steps(16)
        .with_timesteps(4 * 16 * 5)
}

fn ppo(name: &str, config: &TrainConfig, stream: u64) -> PPOAgent<SoftmaxPolicy> {
    let root = RandomState::new(config.seed);
    PPOAgent::new(
        name,
        SoftmaxPolicy::new(4, config.learning_rate),
        config,
        4,
        1,
        root.stream(stream),
    )
    .unwrap()
}

/// Full self-play run; returns the ego's final parameters and episode count.
fn run<B: VecEnvBackend>(backend: B, config: &TrainConfig) -> (Vec<f32>, RunSummary) {
    let mut env = VecEnv::new(backend, Some(config.seed));
    env.add_partner_agent(Box::new(ppo("partner", config, streams::PARTNER)))
        .unwrap();
    let mut ego = ppo("ego", config, streams::EGO);
    let summary = run_training(&mut env, &mut ego, config.total_ticks(), None).unwrap();
    assert_eq!(ego.iteration(), config.num_updates());
    (ego.network().parameters().unwrap(), summary)
}

#[test]
fn same_seed_reproduces_run() {
    let cfg = config(11);
    let (params_a, summary_a) = run(Batched::new(BalanceBatch::new(4)).unwrap(), &cfg);
    let (params_b, summary_b) = run(Batched::new(BalanceBatch::new(4)).unwrap(), &cfg);
    assert_eq!(params_a, params_b);
    assert_eq!(summary_a.episodes, summary_b.episodes);
    assert_eq!(summary_a.mean_episode_return, summary_b.mean_episode_return);
}

#[test]
fn backends_train_identically() {
    let cfg = config(3);
    let (serial, _) = run(Serial::new(BalanceLine::new, 4).unwrap(), &cfg);
    let (batched, _) = run(Batched::new(BalanceBatch::new(4)).unwrap(), &cfg);
    assert_eq!(serial, batched);
}

#[test]
fn training_moves_parameters() {
    let cfg = config(5);
    let (params, summary) = run(Batched::new(BalanceBatch::new(4)).unwrap(), &cfg);
    let initial = SoftmaxPolicy::new(4, cfg.learning_rate).parameters().unwrap();
    assert_ne!(params, initial);
    assert_eq!(summary.ticks, cfg.total_ticks());
}

/// Drive the serial backend by hand and record every ego action batch.
fn serial_actions(config: &TrainConfig) -> Vec<ActionBatch> {
    let mut env = VecEnv::new(Serial::new(BalanceLine::new, 4).unwrap(), Some(config.seed));
    env.add_partner_agent(Box::new(ppo("partner", config, streams::PARTNER)))
        .unwrap();
    let mut ego = ppo("ego", config, streams::EGO);

    let mut observations = env.reset().unwrap();
    let mut actions = Vec::new();
    for _ in 0..config.total_ticks() {
        let batch = ego.get_action(&observations, true).unwrap();
        let step = env.step(&batch).unwrap();
        ego.update(&step.rewards, &step.dones).unwrap();
        actions.push(batch);
        observations = step.observations;
    }
    ego.flush(&observations).unwrap();
    actions
}

#[test]
fn same_seed_repeats_serial_actions() {
    let cfg = config(17);
    let first = serial_actions(&cfg);
    assert_eq!(first.len() as u64, cfg.total_ticks());
    assert_eq!(first, serial_actions(&cfg));
    assert_ne!(first, serial_actions(&config(18)));
}
