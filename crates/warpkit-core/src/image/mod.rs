//! Volumes with physical metadata, and the sampling grids defined on them.

pub mod grid;
pub mod image;

pub use grid::reference_grid;
pub use image::Image;
