//! Core types for learned image registration.
//!
//! Volumes carry their physical metadata next to the voxel tensor, and the
//! reference grid gives the identity sampling positions every warp starts from.

pub mod image;
pub mod spatial;

pub use image::{reference_grid, Image};
pub use spatial::{Direction, Point, Spacing, Vector};
