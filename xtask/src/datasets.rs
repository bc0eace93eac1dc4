//! Synthetic paired datasets and layout checks.
//!
//! The layout is the one the training driver reads:
//!
//! ```text
//! <root>/{train,test}/{moving_images,fixed_images,moving_labels,fixed_labels}/<key>.nii.gz
//! ```

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::{NiftiObject, ReaderOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

const IMAGE_FOLDERS: [&str; 2] = ["moving_images", "fixed_images"];
const LABEL_FOLDERS: [&str; 2] = ["moving_labels", "fixed_labels"];
const SPLITS: [&str; 2] = ["train", "test"];

pub struct SynthOptions {
    pub pairs: usize,
    /// `[D, H, W]`
    pub shape: [usize; 3],
    pub labeled: bool,
    pub seed: u64,
}

fn progress_bar(len: usize, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

/// An ellipsoid with a soft intensity falloff.
struct Blob {
    center: [f64; 3],
    radii: [f64; 3],
}

impl Blob {
    fn random(rng: &mut StdRng, shape: [usize; 3]) -> Self {
        let mut center = [0.0; 3];
        let mut radii = [0.0; 3];
        for axis in 0..3 {
            let n = shape[axis] as f64;
            center[axis] = rng.gen_range(0.35..0.65) * n;
            radii[axis] = rng.gen_range(0.15..0.3) * n;
        }
        Self { center, radii }
    }

    fn shifted(&self, offset: [f64; 3]) -> Self {
        Self {
            center: [
                self.center[0] + offset[0],
                self.center[1] + offset[1],
                self.center[2] + offset[2],
            ],
            radii: self.radii,
        }
    }

    /// Squared normalised distance from the centre; < 1 inside.
    fn distance(&self, index: [usize; 3]) -> f64 {
        (0..3)
            .map(|a| ((index[a] as f64 - self.center[a]) / self.radii[a].max(1.0)).powi(2))
            .sum()
    }

    /// Image and label volumes in NIfTI `[X, Y, Z]` order.
    fn render(&self, shape: [usize; 3], rng: &mut StdRng) -> (Array3<f32>, Array3<f32>) {
        let [d, h, w] = shape;
        let mut image = Array3::<f32>::zeros((w, h, d));
        let mut label = Array3::<f32>::zeros((w, h, d));
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    let r = self.distance([z, y, x]);
                    let noise: f64 = rng.gen_range(-0.02..0.02);
                    image[[x, y, z]] = ((-r).exp() + noise).max(0.0) as f32;
                    if r < 1.0 {
                        label[[x, y, z]] = 1.0;
                    }
                }
            }
        }
        (image, label)
    }
}

fn write_volume(path: &Path, volume: &Array3<f32>) -> Result<()> {
    WriterOptions::new(path)
        .write_nifti(volume)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))
}

/// Write `options.pairs` training pairs and a quarter as many test pairs.
///
/// Each moving volume is its fixed volume's blob shifted by up to two voxels
/// per axis.
pub fn synth_dataset(root: &Path, options: &SynthOptions) -> Result<()> {
    if options.pairs == 0 || options.shape.contains(&0) {
        bail!("Need at least one pair and a non-empty shape");
    }
    let mut rng = StdRng::seed_from_u64(options.seed);
    let counts = [options.pairs, (options.pairs / 4).max(1)];
    let pb = progress_bar(counts.iter().sum(), "Writing pairs")?;

    for (split, count) in SPLITS.iter().zip(counts) {
        let mut folders = IMAGE_FOLDERS.to_vec();
        if options.labeled {
            folders.extend(LABEL_FOLDERS);
        }
        for folder in &folders {
            std::fs::create_dir_all(root.join(split).join(folder))?;
        }

        for i in 0..count {
            let key = format!("case_{i:03}");
            let fixed = Blob::random(&mut rng, options.shape);
            let offset = [0; 3].map(|_: i32| rng.gen_range(-2..=2) as f64);
            let moving = fixed.shifted(offset);

            let (fixed_image, fixed_label) = fixed.render(options.shape, &mut rng);
            let (moving_image, moving_label) = moving.render(options.shape, &mut rng);

            let file = format!("{key}.nii.gz");
            let dir = root.join(split);
            write_volume(&dir.join("moving_images").join(&file), &moving_image)?;
            write_volume(&dir.join("fixed_images").join(&file), &fixed_image)?;
            if options.labeled {
                write_volume(&dir.join("moving_labels").join(&file), &moving_label)?;
                write_volume(&dir.join("fixed_labels").join(&file), &fixed_label)?;
            }
            pb.inc(1);
        }
    }
    pb.finish_with_message("Pairs written");

    info!(
        "Wrote {} train and {} test pairs of shape {:?} to {}",
        counts[0],
        counts[1],
        options.shape,
        root.display()
    );
    Ok(())
}

/// What [`verify_dataset`] found in one split.
#[derive(Debug)]
pub struct SplitReport {
    pub name: &'static str,
    pub pairs: usize,
    pub labeled: bool,
    /// `[D, H, W]` of the fixed images.
    pub shape: [usize; 3],
}

fn volume_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .map(str::to_string)
}

fn folder_keys(dir: &Path) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if entry.file_type().is_file() {
            if let Some(key) = volume_key(entry.path()) {
                keys.insert(key);
            }
        }
    }
    Ok(keys)
}

fn volume_shape(path: &Path) -> Result<[usize; 3]> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let dim = obj.header().dim;
    if dim[0] < 3 {
        bail!("{} has {} dimensions, expected 3", path.display(), dim[0]);
    }
    Ok([dim[3] as usize, dim[2] as usize, dim[1] as usize])
}

fn first_volume(dir: &Path, key: &str) -> Option<std::path::PathBuf> {
    ["nii.gz", "nii"]
        .iter()
        .map(|ext| dir.join(format!("{key}.{ext}")))
        .find(|p| p.is_file())
}

/// Check that every folder of every split holds the same keys and that all
/// fixed (and all moving) images share a shape.
pub fn verify_dataset(root: &Path) -> Result<Vec<SplitReport>> {
    let mut reports = Vec::new();

    for name in SPLITS {
        let split_dir = root.join(name);
        if !split_dir.is_dir() {
            bail!("Missing split directory {}", split_dir.display());
        }

        let labeled = LABEL_FOLDERS.iter().any(|f| split_dir.join(f).is_dir());
        let mut folders = IMAGE_FOLDERS.to_vec();
        if labeled {
            folders.extend(LABEL_FOLDERS);
        }

        let reference = folder_keys(&split_dir.join(folders[0]))?;
        for folder in &folders[1..] {
            let keys = folder_keys(&split_dir.join(folder))?;
            if let Some(key) = reference.symmetric_difference(&keys).next() {
                bail!(
                    "Split '{}': key '{}' is not present in both {} and {}",
                    name,
                    key,
                    folders[0],
                    folder
                );
            }
        }
        if reference.is_empty() {
            bail!("Split '{}' has no volumes", name);
        }

        let pb = progress_bar(reference.len(), &format!("Checking {name}"))?;
        let mut shapes: [Option<[usize; 3]>; 2] = [None, None];
        for key in &reference {
            for (slot, folder) in IMAGE_FOLDERS.iter().enumerate() {
                let dir = split_dir.join(folder);
                let path = first_volume(&dir, key)
                    .with_context(|| format!("No volume for key '{}' in {}", key, dir.display()))?;
                let shape = volume_shape(&path)?;
                let current = shapes[slot];
                match current {
                    None => shapes[slot] = Some(shape),
                    Some(expected) if expected != shape => bail!(
                        "{} has shape {:?}, expected {:?}",
                        path.display(),
                        shape,
                        expected
                    ),
                    Some(_) => {}
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if !labeled {
            warn!("Split '{}' has no label folders", name);
        }
        reports.push(SplitReport {
            name,
            pairs: reference.len(),
            labeled,
            shape: shapes[1].unwrap_or([0; 3]),
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(labeled: bool) -> SynthOptions {
        SynthOptions {
            pairs: 4,
            shape: [6, 5, 4],
            labeled,
            seed: 7,
        }
    }

    #[test]
    fn test_synth_then_verify() {
        let dir = tempdir().unwrap();
        synth_dataset(dir.path(), &options(true)).unwrap();

        let reports = verify_dataset(dir.path()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].pairs, 4);
        assert_eq!(reports[1].pairs, 1);
        assert!(reports[0].labeled);
        assert_eq!(reports[0].shape, [6, 5, 4]);
    }

    #[test]
    fn test_unlabeled_dataset() {
        let dir = tempdir().unwrap();
        synth_dataset(dir.path(), &options(false)).unwrap();
        assert!(!dir.path().join("train").join("fixed_labels").exists());
        assert!(!verify_dataset(dir.path()).unwrap()[0].labeled);
    }

    #[test]
    fn test_mismatched_keys_fail() {
        let dir = tempdir().unwrap();
        synth_dataset(dir.path(), &options(true)).unwrap();
        std::fs::remove_file(dir.path().join("train/fixed_labels/case_002.nii.gz")).unwrap();

        let err = verify_dataset(dir.path()).unwrap_err().to_string();
        assert!(err.contains("case_002"));
    }
}
