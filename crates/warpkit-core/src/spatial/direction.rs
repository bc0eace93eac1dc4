//! Orientation of image axes in physical space.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

use super::Vector;

/// Direction cosine matrix; column `i` is the physical direction of image axis `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Build from column vectors (one per image axis).
    pub fn from_columns(columns: [Vector<D>; D]) -> Self {
        let cols: Vec<_> = columns.iter().map(|c| c.0).collect();
        Self(SMatrix::from_columns(&cols))
    }

    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// True when the columns are orthonormal.
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        (product - SMatrix::<f64, D, D>::identity()).abs().max() < 1e-6
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}
