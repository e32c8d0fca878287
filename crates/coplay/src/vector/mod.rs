//! Vectorized environment backends.
//!
//! Two interchangeable backends sit behind [`VecEnvBackend`]:
//! - `Serial` - Steps each sub-environment in turn and stacks the results
//! - `Batched` - Hands the whole batch to a fused [`BatchSimulator`]
//!
//! [`VecEnv`] layers the ego/partner protocol on top of either.

mod batched;
mod serial;
mod vecenv;

pub use batched::{BatchSimulator, Batched};
pub use serial::Serial;
pub use vecenv::{
    ActionBatch, BackendStep, ObservationBatch, VecEnv, VecEnvBackend, VecStep, VectorizedEnv,
};

use crate::{CoplayError, Result};
use ndarray::{Array2, ArrayD};

/// Stack per-env rows into a `(rows, dim)` batch.
pub(crate) fn stack_rows<'a, I>(rows: I, num_rows: usize, dim: usize) -> Result<Array2<f32>>
where
    I: IntoIterator<Item = &'a ArrayD<f32>>,
{
    let mut flat = Vec::with_capacity(num_rows * dim);
    for row in rows {
        if row.len() != dim {
            return Err(CoplayError::ShapeMismatch {
                expected: vec![dim],
                actual: row.shape().to_vec(),
            });
        }
        flat.extend(row.iter().copied());
    }
    Ok(Array2::from_shape_vec((num_rows, dim), flat)?)
}

/// Check that every player's action batch is `(num_envs, dim)`.
pub(crate) fn check_actions(
    actions: &[ActionBatch],
    num_players: usize,
    num_envs: usize,
    dim: usize,
) -> Result<()> {
    if actions.len() != num_players {
        return Err(CoplayError::InvalidAction(format!(
            "expected actions for {} players, got {}",
            num_players,
            actions.len()
        )));
    }
    for batch in actions {
        if batch.dim() != (num_envs, dim) {
            return Err(CoplayError::ShapeMismatch {
                expected: vec![num_envs, dim],
                actual: batch.shape().to_vec(),
            });
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_stack_rows() {
        let rows = vec![
            ArrayD::from_elem(IxDyn(&[3]), 1.0),
            ArrayD::from_elem(IxDyn(&[3]), 2.0),
        ];
        let stacked = stack_rows(&rows, 2, 3).unwrap();
        assert_eq!(stacked.dim(), (2, 3));
        assert_eq!(stacked[[1, 2]], 2.0);
    }

    #[test]
    fn test_stack_rows_rejects_wrong_width() {
        let rows = vec![ArrayD::from_elem(IxDyn(&[2]), 1.0)];
        assert!(matches!(
            stack_rows(&rows, 1, 3),
            Err(CoplayError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_check_actions() {
        let ok = vec![Array2::zeros((4, 1)), Array2::zeros((4, 1))];
        assert!(check_actions(&ok, 2, 4, 1).is_ok());
        assert!(check_actions(&ok[..1], 2, 4, 1).is_err());
        let bad = vec![Array2::zeros((4, 1)), Array2::zeros((3, 1))];
        assert!(check_actions(&bad, 2, 4, 1).is_err());
    }
}
