//! Physical distance between adjacent voxels along each axis.

use super::Vector;

pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing on every axis.
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    pub fn is_uniform(&self) -> bool {
        (1..D).all(|i| (self[i] - self[0]).abs() < 1e-9)
    }
}
