//! Positions in physical space.

use nalgebra::Point as NaPoint;
use serde::{Deserialize, Serialize};

use super::Vector;

/// A point in D-dimensional physical space (usually millimetres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    pub fn new(coords: [f64; D]) -> Self {
        Self(NaPoint::from(coords))
    }

    /// The point with all coordinates zero.
    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.coords.iter().copied().collect()
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0.coords[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Point<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0.coords[index]
    }
}

impl<const D: usize> std::ops::Sub for Point<D> {
    type Output = Vector<D>;

    fn sub(self, other: Self) -> Self::Output {
        Vector(self.0.coords - other.0.coords)
    }
}

impl<const D: usize> std::ops::Add<Vector<D>> for Point<D> {
    type Output = Self;

    fn add(self, vector: Vector<D>) -> Self::Output {
        Self(self.0 + vector.0)
    }
}
