//! Discrete action space

use super::Space;
use rand::Rng;

/// Discrete space with n possible values: {0, 1, ..., n-1}
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discrete {
    /// Number of possible values
    pub n: usize,
    /// Cached shape
    shape: Vec<usize>,
}

impl Discrete {
    /// Create a new discrete space with n values
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "Discrete space must have at least 1 element");
        Self { n, shape: vec![1] }
    }

    /// Decode a float-encoded action back into an index, if it is valid
    pub fn decode(&self, value: f32) -> Option<usize> {
        if value < 0.0 || value.fract() != 0.0 {
            return None;
        }
        let idx = value as usize;
        self.contains(&idx).then_some(idx)
    }
}

impl Space for Discrete {
    type Sample = usize;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        rng.gen_range(0..self.n)
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        *value < self.n
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn num_elements(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_discrete_sample() {
        let space = Discrete::new(4);
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let sample = space.sample(&mut rng);
            assert!(space.contains(&sample));
        }
    }

    #[test]
    fn test_discrete_decode() {
        let space = Discrete::new(4);
        assert_eq!(space.decode(0.0), Some(0));
        assert_eq!(space.decode(3.0), Some(3));
        assert_eq!(space.decode(4.0), None);
        assert_eq!(space.decode(0.5), None);
        assert_eq!(space.decode(f32::NAN), None);
    }
}
