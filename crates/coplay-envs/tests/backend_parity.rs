use coplay::prelude::*;
use coplay_envs::{BalanceBatch, BalanceLine};

const NUM_ENVS: usize = 4;

fn serial_env(seed: u64) -> VecEnv<Serial<BalanceLine>> {
    VecEnv::new(Serial::new(BalanceLine::new, NUM_ENVS).unwrap(), Some(seed))
}

fn batched_env(seed: u64) -> VecEnv<Batched<BalanceBatch>> {
    VecEnv::new(Batched::new(BalanceBatch::new(NUM_ENVS)).unwrap(), Some(seed))
}

fn random_agent(env: &dyn VectorizedEnv, seed: u64) -> RandomAgent {
    RandomAgent::new(env.action_space(), RandomState::new(seed))
}

#[test]
fn serial_and_batched_trajectories_match() {
    let mut serial = serial_env(9);
    let mut batched = batched_env(9);
    serial
        .add_partner_agent(Box::new(random_agent(&serial, 3)))
        .unwrap();
    batched
        .add_partner_agent(Box::new(random_agent(&batched, 3)))
        .unwrap();
    let mut ego_a = random_agent(&serial, 5);
    let mut ego_b = random_agent(&batched, 5);

    let mut obs_a = serial.reset().unwrap();
    let mut obs_b = batched.reset().unwrap();
    assert_eq!(obs_a, obs_b);

    let mut episodes = 0;
    for _ in 0..300 {
        let act_a = ego_a.get_action(&obs_a, true).unwrap();
        let act_b = ego_b.get_action(&obs_b, true).unwrap();
        assert_eq!(act_a, act_b);

        let step_a = serial.step(&act_a).unwrap();
        let step_b = batched.step(&act_b).unwrap();
        assert_eq!(step_a.rewards, step_b.rewards);
        assert_eq!(step_a.dones, step_b.dones);
        assert_eq!(step_a.infos, step_b.infos);
        assert_eq!(step_a.observations, step_b.observations);

        episodes += step_a.dones.iter().filter(|&&d| d).count();
        obs_a = step_a.observations;
        obs_b = step_b.observations;
    }
    // Random play tips the beam well within 300 ticks
    assert!(episodes > 0);
}

#[test]
fn different_seeds_diverge() {
    let mut a = batched_env(1);
    let mut b = batched_env(2);
    a.add_partner_agent(Box::new(random_agent(&a, 0))).unwrap();
    b.add_partner_agent(Box::new(random_agent(&b, 0))).unwrap();
    assert_ne!(a.reset().unwrap(), b.reset().unwrap());
}

#[test]
fn env_seed_offsets_by_index() {
    let mut line = BalanceLine::new();
    let (expected, _) = line.reset(Some(9 + 2)).unwrap();

    let mut serial = serial_env(9);
    serial
        .add_partner_agent(Box::new(random_agent(&serial, 0)))
        .unwrap();
    let obs = serial.reset().unwrap();
    assert_eq!(obs.row(2).to_vec(), expected[0].iter().copied().collect::<Vec<_>>());
}

#[test]
fn max_seed_wraps_to_zero_for_next_env() {
    let mut line = BalanceLine::new();
    let (first, _) = line.reset(Some(u64::MAX)).unwrap();
    let (second, _) = line.reset(Some(0)).unwrap();

    let mut serial = VecEnv::new(Serial::new(BalanceLine::new, 2).unwrap(), Some(u64::MAX));
    let mut batched = VecEnv::new(Batched::new(BalanceBatch::new(2)).unwrap(), Some(u64::MAX));
    serial
        .add_partner_agent(Box::new(random_agent(&serial, 0)))
        .unwrap();
    batched
        .add_partner_agent(Box::new(random_agent(&batched, 0)))
        .unwrap();

    let obs = serial.reset().unwrap();
    assert_eq!(obs, batched.reset().unwrap());
    assert_eq!(obs.row(0).to_vec(), first[0].iter().copied().collect::<Vec<_>>());
    assert_eq!(obs.row(1).to_vec(), second[0].iter().copied().collect::<Vec<_>>());
}
