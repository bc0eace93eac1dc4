//! Volume I/O and paired registration datasets.

pub mod adapter;
pub mod dataset;
pub mod loader;
pub mod nifti_io;

pub use adapter::{image_to_tensor, images_to_batch};
pub use dataset::{get_train_test_dataset, DataConfig, PairedDataset, PairedSample, Split};
pub use loader::{BatchInputs, Batches, DataLoaderConfig, PairedBatch};
pub use nifti_io::{read_nifti, write_nifti};
