//! Paired moving/fixed volumes read from a split directory.
//!
//! ```text
//! <dir>/<split>/moving_images/<key>.nii[.gz]
//! <dir>/<split>/fixed_images/<key>.nii[.gz]
//! <dir>/<split>/moving_labels/<key>.nii[.gz]
//! <dir>/<split>/fixed_labels/<key>.nii[.gz]
//! ```

use anyhow::{bail, ensure, Context, Result};
use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use warpkit_core::image::Image;

use crate::nifti_io::read_nifti;

pub const MOVING_IMAGES: &str = "moving_images";
pub const FIXED_IMAGES: &str = "fixed_images";
pub const MOVING_LABELS: &str = "moving_labels";
pub const FIXED_LABELS: &str = "fixed_labels";

/// Where the paired volumes live.
#[derive(Config, Debug)]
pub struct DataConfig {
    /// Root containing `train/` and `test/`.
    pub dir: String,
    /// Whether label folders are present and used.
    #[config(default = true)]
    pub labeled: bool,
}

/// Which half of the data a dataset was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

/// One registration pair.
#[derive(Debug, Clone)]
pub struct PairedSample<B: Backend> {
    pub key: String,
    pub moving_image: Image<B, 3>,
    pub fixed_image: Image<B, 3>,
    pub moving_label: Option<Image<B, 3>>,
    pub fixed_label: Option<Image<B, 3>>,
}

/// Indexed collection of registration pairs sharing one moving and one fixed shape.
#[derive(Debug, Clone)]
pub struct PairedDataset<B: Backend> {
    samples: Vec<PairedSample<B>>,
    moving_image_shape: [usize; 3],
    fixed_image_shape: [usize; 3],
    labeled: bool,
}

impl<B: Backend> PairedDataset<B> {
    /// Build a dataset from loaded samples, checking shape consistency.
    pub fn from_samples(samples: Vec<PairedSample<B>>) -> Result<Self> {
        ensure!(!samples.is_empty(), "Cannot build a dataset without samples");

        let moving_image_shape = samples[0].moving_image.shape();
        let fixed_image_shape = samples[0].fixed_image.shape();
        let labeled = samples[0].moving_label.is_some() && samples[0].fixed_label.is_some();

        for sample in &samples {
            ensure!(
                !moving_image_shape.contains(&0) && !fixed_image_shape.contains(&0),
                "Sample {} has an empty volume",
                sample.key
            );
            ensure!(
                sample.moving_image.shape() == moving_image_shape,
                "Moving image {} shape mismatch: {:?} vs {:?}",
                sample.key,
                sample.moving_image.shape(),
                moving_image_shape
            );
            ensure!(
                sample.fixed_image.shape() == fixed_image_shape,
                "Fixed image {} shape mismatch: {:?} vs {:?}",
                sample.key,
                sample.fixed_image.shape(),
                fixed_image_shape
            );
            match (&sample.moving_label, &sample.fixed_label) {
                (Some(moving), Some(fixed)) if labeled => {
                    ensure!(
                        moving.shape() == moving_image_shape,
                        "Moving label {} does not match its image shape",
                        sample.key
                    );
                    ensure!(
                        fixed.shape() == fixed_image_shape,
                        "Fixed label {} does not match its image shape",
                        sample.key
                    );
                }
                (None, None) if !labeled => {}
                _ => bail!("Sample {} labels are inconsistent with the rest of the dataset", sample.key),
            }
        }

        Ok(Self {
            samples,
            moving_image_shape,
            fixed_image_shape,
            labeled,
        })
    }

    /// Read one split from disk.
    pub fn load(config: &DataConfig, split: Split, device: &B::Device) -> Result<Self> {
        let split_dir = Path::new(&config.dir).join(split.dir_name());
        let folders: &[&str] = if config.labeled {
            &[MOVING_IMAGES, FIXED_IMAGES, MOVING_LABELS, FIXED_LABELS]
        } else {
            &[MOVING_IMAGES, FIXED_IMAGES]
        };

        let keyed = collect_keys(&split_dir, folders)?;
        tracing::info!(
            "Loading {} pairs from {}",
            keyed.len(),
            split_dir.display()
        );

        let mut samples = Vec::with_capacity(keyed.len());
        for (key, paths) in keyed {
            let read_image = |path: &Path| -> Result<Image<B, 3>> {
                Ok(normalize_intensity(read_nifti::<B, _>(path, device)?))
            };
            let read_label = |path: &Path| -> Result<Image<B, 3>> {
                Ok(binarize_label(read_nifti::<B, _>(path, device)?))
            };

            let moving_image = read_image(&paths[0])?;
            let fixed_image = read_image(&paths[1])?;
            let (moving_label, fixed_label) = if config.labeled {
                (Some(read_label(&paths[2])?), Some(read_label(&paths[3])?))
            } else {
                (None, None)
            };

            samples.push(PairedSample {
                key,
                moving_image,
                fixed_image,
                moving_label,
                fixed_label,
            });
        }

        Self::from_samples(samples)
            .with_context(|| format!("Invalid dataset in {}", split_dir.display()))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn moving_image_shape(&self) -> [usize; 3] {
        self.moving_image_shape
    }

    pub fn fixed_image_shape(&self) -> [usize; 3] {
        self.fixed_image_shape
    }

    pub fn is_labeled(&self) -> bool {
        self.labeled
    }

    pub fn get(&self, index: usize) -> Option<&PairedSample<B>> {
        self.samples.get(index)
    }

    pub fn samples(&self) -> &[PairedSample<B>] {
        &self.samples
    }
}

/// Read the train and test splits described by `config`.
///
/// The two splits may live on different backends (e.g. autodiff for training
/// and its inner backend for evaluation) but share a device.
pub fn get_train_test_dataset<BT, BE>(
    config: &DataConfig,
    device: &BT::Device,
) -> Result<(PairedDataset<BT>, PairedDataset<BE>)>
where
    BT: Backend,
    BE: Backend<Device = BT::Device>,
{
    let train = PairedDataset::<BT>::load(config, Split::Train, device)?;
    let test = PairedDataset::<BE>::load(config, Split::Test, device)?;

    ensure!(
        train.moving_image_shape() == test.moving_image_shape()
            && train.fixed_image_shape() == test.fixed_image_shape(),
        "Train and test shapes differ: moving {:?}/{:?}, fixed {:?}/{:?}",
        train.moving_image_shape(),
        test.moving_image_shape(),
        train.fixed_image_shape(),
        test.fixed_image_shape()
    );

    Ok((train, test))
}

/// Strip `.nii.gz` / `.nii` from a file name; `None` for other files.
pub fn volume_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .map(str::to_string)
}

/// Map each key to its file in every folder, in folder order.
fn collect_keys(split_dir: &Path, folders: &[&str]) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut per_folder: Vec<BTreeMap<String, PathBuf>> = Vec::with_capacity(folders.len());
    for folder in folders {
        let dir = split_dir.join(folder);
        let mut files = BTreeMap::new();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if let Some(key) = volume_key(&path) {
                files.insert(key, path);
            }
        }
        per_folder.push(files);
    }

    let reference = &per_folder[0];
    ensure!(
        !reference.is_empty(),
        "No NIfTI volumes found in {}",
        split_dir.join(folders[0]).display()
    );

    for (folder, files) in folders.iter().zip(&per_folder).skip(1) {
        if let Some(key) = reference.keys().find(|k| !files.contains_key(*k)) {
            bail!("{} has no file for key '{}'", split_dir.join(folder).display(), key);
        }
        if let Some(key) = files.keys().find(|k| !reference.contains_key(*k)) {
            bail!(
                "{} has no file for key '{}'",
                split_dir.join(folders[0]).display(),
                key
            );
        }
    }

    Ok(reference
        .keys()
        .map(|key| {
            let paths = per_folder.iter().map(|files| files[key].clone()).collect();
            (key.clone(), paths)
        })
        .collect())
}

/// Min-max rescale to `[0, 1]`; a constant volume becomes zeros.
pub fn normalize_intensity<B: Backend>(image: Image<B, 3>) -> Image<B, 3> {
    let data = image.data().clone();
    let min = data.clone().min().into_scalar().elem::<f32>();
    let max = data.clone().max().into_scalar().elem::<f32>();
    let range = max - min;

    let normalized = if range > f32::EPSILON {
        data.sub_scalar(min).div_scalar(range)
    } else {
        data.zeros_like()
    };
    image.with_data(normalized)
}

/// Threshold a label volume at 0.5.
pub fn binarize_label<B: Backend>(label: Image<B, 3>) -> Image<B, 3> {
    let mask = label.data().clone().greater_equal_elem(0.5).float();
    label.with_data(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn volume(shape: [usize; 3], value: f32) -> Image<B, 3> {
        let device = Default::default();
        Image::from_tensor(Tensor::<B, 3>::ones(shape, &device).mul_scalar(value))
    }

    fn sample(key: &str, moving: [usize; 3], fixed: [usize; 3]) -> PairedSample<B> {
        PairedSample {
            key: key.to_string(),
            moving_image: volume(moving, 1.0),
            fixed_image: volume(fixed, 1.0),
            moving_label: Some(volume(moving, 1.0)),
            fixed_label: Some(volume(fixed, 0.0)),
        }
    }

    #[test]
    fn test_volume_key() {
        assert_eq!(volume_key(Path::new("a/case_01.nii.gz")).as_deref(), Some("case_01"));
        assert_eq!(volume_key(Path::new("case.nii")).as_deref(), Some("case"));
        assert_eq!(volume_key(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_from_samples_records_shapes() {
        let dataset = PairedDataset::from_samples(vec![
            sample("a", [4, 4, 4], [6, 6, 6]),
            sample("b", [4, 4, 4], [6, 6, 6]),
        ])
        .unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.moving_image_shape(), [4, 4, 4]);
        assert_eq!(dataset.fixed_image_shape(), [6, 6, 6]);
        assert!(dataset.is_labeled());
    }

    #[test]
    fn test_from_samples_rejects_shape_mismatch() {
        let result = PairedDataset::from_samples(vec![
            sample("a", [4, 4, 4], [6, 6, 6]),
            sample("b", [4, 4, 5], [6, 6, 6]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_samples_rejects_moving_label_shape() {
        let mut bad = sample("a", [4, 4, 5], [6, 6, 6]);
        bad.moving_label = Some(volume([4, 4, 4], 1.0));
        let err = PairedDataset::from_samples(vec![bad]).unwrap_err();
        assert!(err.to_string().contains("Moving label a does not match its image shape"));
    }

    #[test]
    fn test_from_samples_rejects_fixed_label_shape() {
        let mut bad = sample("b", [4, 4, 4], [6, 6, 6]);
        bad.fixed_label = Some(volume([6, 6, 5], 0.0));
        let err = PairedDataset::from_samples(vec![bad]).unwrap_err();
        assert!(err.to_string().contains("Fixed label b does not match its image shape"));
    }

    #[test]
    fn test_from_samples_rejects_empty() {
        assert!(PairedDataset::<B>::from_samples(Vec::new()).is_err());
    }

    #[test]
    fn test_normalize_constant_volume_is_zero() {
        let image = normalize_intensity(volume([2, 2, 2], 7.0));
        assert_eq!(image.data().clone().max().into_scalar(), 0.0);
    }

    #[test]
    fn test_normalize_range() {
        let device = Default::default();
        let data = Tensor::<B, 1>::from_floats([2.0, 4.0, 6.0, 10.0], &device).reshape([1, 2, 2]);
        let image = normalize_intensity(Image::from_tensor(data));
        let values = image.data().to_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_binarize_label() {
        let device = Default::default();
        let data = Tensor::<B, 1>::from_floats([0.0, 0.49, 0.5, 3.0], &device).reshape([1, 2, 2]);
        let label = binarize_label(Image::from_tensor(data));
        let values = label.data().to_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 0.0, 1.0, 1.0]);
    }
}
