//! Image type with physical metadata.
//!
//! An [`Image`] couples a voxel tensor with the origin, spacing and direction
//! that place it in physical space.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::spatial::{Direction, Point, Spacing, Vector};

/// Medical image with physical metadata.
///
/// # Coordinate Systems
/// * **Index Space**: continuous voxel indices, axis order matches the tensor
/// * **Physical Space**: continuous coordinates in mm
///
/// # Examples
/// ```rust
/// use warpkit_core::Image;
/// use warpkit_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(1.0), Direction3::identity());
/// assert_eq!(image.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Wrap a tensor with unit spacing, zero origin and identity direction.
    pub fn from_tensor(data: Tensor<B, D>) -> Self {
        Self::new(
            data,
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        )
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    /// Replace the voxel data, keeping the physical metadata.
    pub fn with_data(self, data: Tensor<B, D>) -> Self {
        Self { data, ..self }
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Map a physical point to a continuous index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    ///
    /// Returns `None` when the direction matrix is singular.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Option<Point<D>> {
        let inv_dir = self.direction.try_inverse()?;
        let rotated = inv_dir * (*point - self.origin);

        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        Some(index)
    }

    /// Map a continuous index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn image(origin: [f64; 3], spacing: [f64; 3]) -> Image<Backend, 3> {
        let device = Default::default();
        Image::new(
            Tensor::<Backend, 3>::zeros([10, 10, 10], &device),
            Point::new(origin),
            Spacing::new(spacing),
            Direction::identity(),
        )
    }

    #[test]
    fn test_image_creation() {
        let image = image([0.0; 3], [1.0; 3]);
        assert_eq!(image.shape(), [10, 10, 10]);
        assert_eq!(image.origin(), &Point::origin());
        assert_eq!(image.spacing(), &Spacing::uniform(1.0));
    }

    #[test]
    fn test_non_unit_spacing_and_origin() {
        let image = image([10.0, 20.0, 30.0], [2.0, 2.0, 2.0]);
        let index = image
            .transform_physical_point_to_continuous_index(&Point::new([20.0, 30.0, 40.0]))
            .unwrap();
        for i in 0..3 {
            assert!((index[i] - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_transform_roundtrip() {
        let image = image([1.0, -2.0, 3.0], [0.5, 1.0, 2.0]);
        let original = Point::new([3.5, 4.5, 5.5]);
        let index = image
            .transform_physical_point_to_continuous_index(&original)
            .unwrap();
        let back = image.transform_continuous_index_to_physical_point(&index);
        for i in 0..3 {
            assert!((original[i] - back[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_with_data_keeps_metadata() {
        let image = image([1.0, 2.0, 3.0], [2.0; 3]);
        let device = Default::default();
        let replaced = image.with_data(Tensor::<Backend, 3>::ones([4, 5, 6], &device));
        assert_eq!(replaced.shape(), [4, 5, 6]);
        assert_eq!(replaced.origin(), &Point::new([1.0, 2.0, 3.0]));
    }
}
