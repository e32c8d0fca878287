//! Generalized advantage estimation.

use crate::{CoplayError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Compute GAE advantages and returns over a full rollout.
///
/// `rewards`, `values` and `dones` are `[T, N]`; `last_value` is the
/// bootstrap value `V[T]` for each env. A done flag at step `t` cuts both
/// the bootstrap and the trace at that step.
///
/// Returns `(advantages, returns)` with `returns = advantages + values`.
pub fn compute_gae(
    rewards: ArrayView2<'_, f32>,
    values: ArrayView2<'_, f32>,
    dones: ArrayView2<'_, f32>,
    last_value: ArrayView1<'_, f32>,
    gamma: f64,
    gae_lambda: f64,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let (steps, num_envs) = rewards.dim();
    for shape in [values.shape(), dones.shape()] {
        if shape != rewards.shape() {
            return Err(CoplayError::ShapeMismatch {
                expected: rewards.shape().to_vec(),
                actual: shape.to_vec(),
            });
        }
    }
    if last_value.len() != num_envs {
        return Err(CoplayError::ShapeMismatch {
            expected: vec![num_envs],
            actual: vec![last_value.len()],
        });
    }

    let gamma = gamma as f32;
    let gl = gamma * gae_lambda as f32;
    let mut advantages = Array2::zeros((steps, num_envs));
    let mut last_gae = Array1::<f32>::zeros(num_envs);

    for t in (0..steps).rev() {
        let next_values = if t == steps - 1 {
            last_value.view()
        } else {
            values.row(t + 1)
        };
        for env in 0..num_envs {
            let not_done = 1.0 - dones[[t, env]];
            let delta =
                rewards[[t, env]] + gamma * next_values[env] * not_done - values[[t, env]];
            last_gae[env] = delta + gl * not_done * last_gae[env];
        }
        advantages.row_mut(t).assign(&last_gae);
    }

    let returns = &advantages + &values;
    if let Some(bad) = advantages.iter().chain(returns.iter()).find(|v| !v.is_finite()) {
        return Err(CoplayError::Numerical {
            stage: "advantage estimation",
            detail: format!("non-finite advantage or return ({})", bad),
        });
    }
    Ok((advantages, returns))
}

/// Normalize to zero mean and unit (sample) standard deviation.
pub fn normalize_advantages(advantages: &Array1<f32>) -> Array1<f32> {
    let n = advantages.len();
    if n == 0 {
        return advantages.clone();
    }
    let mean = advantages.sum() / n as f32;
    let std = if n > 1 {
        let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
        var.sqrt()
    } else {
        0.0
    };
    advantages.mapv(|a| (a - mean) / (std + 1e-8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn run(
        rewards: &Array2<f32>,
        values: &Array2<f32>,
        dones: &Array2<f32>,
        last: &Array1<f32>,
        gamma: f64,
        lambda: f64,
    ) -> (Array2<f32>, Array2<f32>) {
        compute_gae(
            rewards.view(),
            values.view(),
            dones.view(),
            last.view(),
            gamma,
            lambda,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_rewards_zero_values() {
        let zeros = Array2::zeros((5, 3));
        let (adv, ret) = run(&zeros, &zeros, &zeros, &Array1::zeros(3), 0.99, 0.95);
        assert!(adv.iter().all(|&a| a == 0.0));
        assert!(ret.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_constant_values_without_discount_return_v() {
        let zeros = Array2::zeros((6, 2));
        let values = Array2::from_elem((6, 2), 2.5);
        let (adv, ret) = run(&zeros, &values, &zeros, &Array1::from_elem(2, 2.5), 1.0, 0.95);
        assert!(adv.iter().all(|a| a.abs() < 1e-6));
        assert!(ret.iter().all(|r| (r - 2.5).abs() < 1e-6));
    }

    #[test]
    fn test_single_step_matches_delta() {
        let rewards = array![[1.0f32]];
        let values = array![[0.5f32]];
        let dones = array![[0.0f32]];
        let (adv, ret) = run(&rewards, &values, &dones, &array![2.0], 0.9, 0.95);
        let expected = 1.0 + 0.9 * 2.0 - 0.5;
        assert!((adv[[0, 0]] - expected).abs() < 1e-6);
        assert!((ret[[0, 0]] - (expected + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_done_cuts_bootstrap_and_trace() {
        let rewards = Array2::from_elem((3, 1), 1.0);
        let values = Array2::zeros((3, 1));
        let dones = array![[0.0f32], [1.0], [0.0]];
        let (adv, _) = run(&rewards, &values, &dones, &array![10.0], 0.5, 1.0);
        // Step 2 bootstraps from last value, step 1 is terminal, step 0 chains into step 1
        assert!((adv[[2, 0]] - (1.0 + 0.5 * 10.0)).abs() < 1e-6);
        assert!((adv[[1, 0]] - 1.0).abs() < 1e-6);
        assert!((adv[[0, 0]] - (1.0 + 0.5 * 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::zeros((2, 2));
        let b = Array2::zeros((3, 2));
        assert!(compute_gae(a.view(), b.view(), a.view(), Array1::zeros(2).view(), 0.9, 0.9).is_err());
        assert!(compute_gae(a.view(), a.view(), a.view(), Array1::zeros(3).view(), 0.9, 0.9).is_err());
    }

    #[test]
    fn test_nan_reward_is_numerical_error() {
        let mut rewards = Array2::zeros((2, 1));
        rewards[[0, 0]] = f32::NAN;
        let zeros = Array2::zeros((2, 1));
        let result = compute_gae(
            rewards.view(),
            zeros.view(),
            zeros.view(),
            Array1::zeros(1).view(),
            0.99,
            0.95,
        );
        assert!(matches!(result, Err(CoplayError::Numerical { .. })));
    }

    #[test]
    fn test_normalize_moments() {
        let adv: Array1<f32> = (0..64).map(|i| (i as f32 * 0.37).sin() * 5.0 + 2.0).collect();
        let norm = normalize_advantages(&adv);
        let n = norm.len() as f32;
        let mean = norm.sum() / n;
        let std = (norm.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (n - 1.0)).sqrt();
        assert!(mean.abs() < 1e-4);
        assert!((std - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_single_element() {
        let norm = normalize_advantages(&array![3.0]);
        assert!(norm[0].abs() < 1e-6);
    }
}
