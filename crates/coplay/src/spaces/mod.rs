//! Observation and action space types.
//!
//! Only the two shapes self-play environments need: `Discrete` actions and
//! bounded continuous (`BoxSpace`) observations or actions.

mod bounded;
mod discrete;

pub use bounded::BoxSpace;
pub use discrete::Discrete;

use ndarray::{Array1, ArrayD, IxDyn};
use rand::Rng;

/// Trait for observation and action spaces
pub trait Space: Clone + Send + Sync {
    /// The type of samples from this space
    type Sample;

    /// Sample a random element from this space
    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample;

    /// Check if a value is contained in this space
    fn contains(&self, value: &Self::Sample) -> bool;

    /// Get the shape of samples from this space
    fn shape(&self) -> &[usize];

    /// Get the total number of elements in a sample
    fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Enum for dynamic space types
#[derive(Clone, Debug, PartialEq)]
pub enum DynSpace {
    Discrete(Discrete),
    Box(BoxSpace),
}

impl DynSpace {
    /// Get the shape of this space
    pub fn shape(&self) -> Vec<usize> {
        match self {
            DynSpace::Discrete(s) => s.shape().to_vec(),
            DynSpace::Box(s) => s.shape().to_vec(),
        }
    }

    /// Width of one flattened sample, i.e. one row of a batch
    pub fn flat_dim(&self) -> usize {
        match self {
            DynSpace::Discrete(_) => 1,
            DynSpace::Box(s) => s.num_elements(),
        }
    }

    /// Number of policy head outputs needed to parameterize this space
    pub fn num_logits(&self) -> usize {
        match self {
            DynSpace::Discrete(s) => s.n,
            DynSpace::Box(s) => s.num_elements(),
        }
    }

    /// Whether actions from this space are continuous
    pub fn is_continuous(&self) -> bool {
        matches!(self, DynSpace::Box(_))
    }

    /// Sample one flattened row from this space
    pub fn sample_row<R: Rng>(&self, rng: &mut R) -> Array1<f32> {
        match self {
            DynSpace::Discrete(s) => Array1::from_elem(1, s.sample(rng) as f32),
            DynSpace::Box(s) => {
                let sample = s.sample(rng);
                Array1::from_iter(sample.iter().copied())
            }
        }
    }

    /// Check if this space contains the flattened value
    pub fn contains(&self, value: &ArrayD<f32>) -> bool {
        match self {
            DynSpace::Discrete(s) => match value.iter().next() {
                Some(&v) if value.len() == 1 && v >= 0.0 && v.fract() == 0.0 => {
                    s.contains(&(v as usize))
                }
                _ => false,
            },
            DynSpace::Box(s) => {
                match value.view().into_shape_with_order(IxDyn(s.shape())) {
                    Ok(view) => s.contains(&view.to_owned()),
                    Err(_) => false,
                }
            }
        }
    }
}
