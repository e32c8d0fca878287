//! PPO loss terms.
//!
//! Per-sample scalar forms return the loss together with its derivative so
//! analytic networks can backpropagate by hand. Tensor forms are used by the
//! tch-backed network.

#[cfg(feature = "torch")]
use tch::{Kind, Tensor};

/// Clipped surrogate policy loss for one sample.
///
/// Returns `(loss, d loss / d new_log_prob)`.
pub fn clipped_surrogate(advantage: f32, ratio: f32, clip_coef: f32) -> (f32, f32) {
    let unclipped = -advantage * ratio;
    let clipped = -advantage * ratio.clamp(1.0 - clip_coef, 1.0 + clip_coef);
    if unclipped >= clipped {
        (unclipped, unclipped)
    } else {
        (clipped, 0.0)
    }
}

/// Squared-error value loss for one sample, optionally clipped around the old value.
///
/// Returns `(loss, d loss / d new_value)`.
pub fn value_loss(new_value: f32, old_value: f32, ret: f32, clip_coef: Option<f32>) -> (f32, f32) {
    let err = new_value - ret;
    let Some(clip) = clip_coef else {
        return (0.5 * err * err, err);
    };
    let delta = new_value - old_value;
    let clipped_err = old_value + delta.clamp(-clip, clip) - ret;
    if err * err >= clipped_err * clipped_err {
        (0.5 * err * err, err)
    } else if delta.abs() < clip {
        (0.5 * clipped_err * clipped_err, clipped_err)
    } else {
        (0.5 * clipped_err * clipped_err, 0.0)
    }
}

/// Low-variance approximate KL estimate `(r - 1) - log r` for one sample
pub fn approx_kl(log_ratio: f32) -> f32 {
    log_ratio.exp() - 1.0 - log_ratio
}

/// Compute PPO clipped policy loss
#[cfg(feature = "torch")]
pub fn ppo_policy_loss(
    advantages: &Tensor,
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    clip_coef: f64,
) -> Tensor {
    let ratio = (log_probs - old_log_probs).exp();

    let surr1 = &ratio * advantages;
    let surr2 = ratio.clamp(1.0 - clip_coef, 1.0 + clip_coef) * advantages;

    -surr1.min_other(&surr2).mean(Kind::Float)
}

/// Compute value loss, clipped around the old values when `clip_coef` is set
#[cfg(feature = "torch")]
pub fn ppo_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_coef: Option<f64>,
) -> Tensor {
    let loss1 = (values - returns).pow_tensor_scalar(2);
    match clip_coef {
        Some(clip) => {
            let values_clipped = old_values + (values - old_values).clamp(-clip, clip);
            let loss2 = (&values_clipped - returns).pow_tensor_scalar(2);
            loss1.max_other(&loss2).mean(Kind::Float) * 0.5
        }
        None => loss1.mean(Kind::Float) * 0.5,
    }
}

/// Mean approximate KL between old and new log probabilities
#[cfg(feature = "torch")]
pub fn kl_divergence(log_probs: &Tensor, old_log_probs: &Tensor) -> Tensor {
    let log_ratio = log_probs - old_log_probs;
    (log_ratio.exp() - 1.0 - log_ratio).mean(Kind::Float)
}

/// Fraction of samples whose ratio left the clip range
#[cfg(feature = "torch")]
pub fn clip_fraction(log_probs: &Tensor, old_log_probs: &Tensor, clip_coef: f64) -> Tensor {
    ((log_probs - old_log_probs).exp() - 1.0)
        .abs()
        .gt(clip_coef)
        .to_kind(Kind::Float)
        .mean(Kind::Float)
}
