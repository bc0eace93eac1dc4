//! Resampling layers shared by the networks and the losses.

mod affine;
mod integration;
mod interpolation;

pub use affine::affine_grid;
pub use integration::VecInt;
pub use interpolation::{resample, scale_grid, trilinear_interpolation, warp};
