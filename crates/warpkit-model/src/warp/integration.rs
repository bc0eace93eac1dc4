use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::interpolation::warp;

/// Velocity field integration by scaling and squaring.
///
/// $\phi = \exp(v)$, computed by scaling the flow by $1/2^N$ and then
/// composing $v_{i+1} = v_i + v_i \circ (x + v_i)$ for N steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VecInt {
    num_steps: usize,
}

impl VecInt {
    /// `num_steps` squarings; 7 gives 128 implicit Euler steps.
    pub fn new(num_steps: usize) -> Self {
        Self { num_steps }
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Integrate a velocity field `[B, 3, D, H, W]` into a displacement field.
    pub fn forward<B: Backend>(&self, dvf: Tensor<B, 5>, reference_grid: Tensor<B, 5>) -> Tensor<B, 5> {
        let scale = 1.0 / 2f32.powi(self.num_steps as i32);
        let mut flow = dvf * scale;

        for _ in 0..self.num_steps {
            let composed = warp(flow.clone(), flow.clone(), reference_grid.clone());
            flow = flow + composed;
        }

        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use warpkit_core::reference_grid;

    type B = NdArray<f32>;

    #[test]
    fn test_constant_velocity_integrates_to_itself() {
        let device = Default::default();
        let grid = reference_grid::<B>([4, 4, 4], &device);
        let dvf = Tensor::<B, 5>::ones([1, 3, 4, 4, 4], &device).mul_scalar(0.5);

        let ddf = VecInt::new(5).forward(dvf, grid);
        let values = ddf.to_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_zero_steps_is_identity() {
        let device = Default::default();
        let grid = reference_grid::<B>([2, 2, 2], &device);
        let dvf = Tensor::<B, 5>::ones([2, 3, 2, 2, 2], &device);
        let ddf = VecInt::new(0).forward(dvf.clone(), grid);
        assert_eq!(
            ddf.to_data().to_vec::<f32>().unwrap(),
            dvf.to_data().to_vec::<f32>().unwrap()
        );
    }
}
