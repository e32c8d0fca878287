//! Step/update loop driving an ego agent against a vectorized environment.

use crate::agent::Agent;
use crate::vector::VectorizedEnv;
use crate::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// What a finished run looked like from the ego's side
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Environment ticks stepped
    pub ticks: u64,
    /// Episodes that ended during the run
    pub episodes: u64,
    /// Mean return of those episodes
    pub mean_episode_return: Option<f64>,
    pub elapsed_secs: f64,
}

/// Progress bar styled for training runs
pub fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message);
    pb
}

/// Reset `env` once, then run `ticks` get_action/step/update rounds.
///
/// Any update still pending after the last tick is flushed for both the ego
/// and the environment's partner.
pub fn run_training<E, A>(
    env: &mut E,
    ego: &mut A,
    ticks: u64,
    progress: Option<&ProgressBar>,
) -> Result<RunSummary>
where
    E: VectorizedEnv + ?Sized,
    A: Agent + ?Sized,
{
    let start = Instant::now();
    let mut observations = env.reset()?;
    let mut episodes = 0u64;
    let mut return_sum = 0.0f64;

    for tick in 0..ticks {
        let actions = ego.get_action(&observations, true)?;
        let step = env.step(&actions)?;
        ego.update(&step.rewards, &step.dones)?;

        for info in &step.infos {
            if let Some(ret) = info.episode_return {
                episodes += 1;
                return_sum += ret as f64;
            }
        }
        observations = step.observations;

        if let Some(pb) = progress {
            pb.inc(1);
        }
        if tick > 0 && tick % 1000 == 0 {
            tracing::debug!(tick, episodes, "training progress");
        }
    }

    ego.flush(&observations)?;
    env.finish()?;
    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }

    let summary = RunSummary {
        ticks,
        episodes,
        mean_episode_return: (episodes > 0).then(|| return_sum / episodes as f64),
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    tracing::info!(
        ticks,
        episodes,
        mean_return = summary.mean_episode_return.unwrap_or(0.0),
        elapsed = %crate::utils::format_duration(summary.elapsed_secs),
        "training finished"
    );
    Ok(summary)
}
