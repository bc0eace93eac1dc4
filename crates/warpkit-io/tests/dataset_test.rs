use anyhow::Result;
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use std::path::Path;
use tempfile::tempdir;
use warpkit_core::image::Image;
use warpkit_io::dataset::{FIXED_IMAGES, FIXED_LABELS, MOVING_IMAGES, MOVING_LABELS};
use warpkit_io::{get_train_test_dataset, write_nifti, DataConfig, DataLoaderConfig, PairedDataset, Split};

type B = NdArray<f32>;

fn write_volume(path: &Path, shape: [usize; 3], offset: f32) -> Result<()> {
    let device = Default::default();
    let n = shape.iter().product::<usize>() as i64;
    let data = Tensor::<B, 1, burn::tensor::Int>::arange(0..n, &device)
        .float()
        .add_scalar(offset)
        .reshape(shape);
    write_nifti(path, &Image::from_tensor(data))
}

fn write_split(root: &Path, split: &str, keys: &[&str], shape: [usize; 3]) -> Result<()> {
    for folder in [MOVING_IMAGES, FIXED_IMAGES, MOVING_LABELS, FIXED_LABELS] {
        let dir = root.join(split).join(folder);
        std::fs::create_dir_all(&dir)?;
        for key in keys {
            write_volume(&dir.join(format!("{key}.nii.gz")), shape, 3.0)?;
        }
    }
    Ok(())
}

#[test]
fn loads_sorted_normalised_split() -> Result<()> {
    let dir = tempdir()?;
    write_split(dir.path(), "train", &["b", "a", "c"], [3, 4, 5])?;
    write_split(dir.path(), "test", &["z"], [3, 4, 5])?;

    let config = DataConfig::new(dir.path().to_string_lossy().into_owned());
    let device = Default::default();
    let (train, test) = get_train_test_dataset::<B, B>(&config, &device)?;

    assert_eq!(train.len(), 3);
    assert_eq!(test.len(), 1);
    assert_eq!(train.moving_image_shape(), [3, 4, 5]);
    assert!(train.is_labeled());

    let keys: Vec<_> = train.samples().iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);

    let image = train.get(0).unwrap().moving_image.data().clone();
    assert_eq!(image.clone().min().into_scalar(), 0.0);
    assert_eq!(image.max().into_scalar(), 1.0);

    let label = train.get(0).unwrap().fixed_label.as_ref().unwrap().data().clone();
    let values = label.to_data().to_vec::<f32>().unwrap();
    assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0));

    let batches = train.batches(true, &DataLoaderConfig::new(), 0, &device).count();
    assert_eq!(batches, 1);
    Ok(())
}

#[test]
fn mismatched_keys_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    write_split(dir.path(), "train", &["a", "b"], [2, 2, 2])?;
    std::fs::remove_file(dir.path().join("train").join(FIXED_IMAGES).join("b.nii.gz"))?;

    let config = DataConfig::new(dir.path().to_string_lossy().into_owned());
    let err = PairedDataset::<B>::load(&config, Split::Train, &Default::default()).unwrap_err();
    assert!(format!("{err:#}").contains("'b'"));
    Ok(())
}

#[test]
fn unlabeled_config_ignores_label_folders() -> Result<()> {
    let dir = tempdir()?;
    for folder in [MOVING_IMAGES, FIXED_IMAGES] {
        let path = dir.path().join("test").join(folder);
        std::fs::create_dir_all(&path)?;
        write_volume(&path.join("only.nii"), [2, 2, 2], 0.0)?;
    }

    let config = DataConfig::new(dir.path().to_string_lossy().into_owned()).with_labeled(false);
    let test = PairedDataset::<B>::load(&config, Split::Test, &Default::default())?;
    assert_eq!(test.len(), 1);
    assert!(!test.is_labeled());
    Ok(())
}

#[test]
fn empty_split_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    write_split(dir.path(), "test", &["t"], [2, 2, 2])?;
    for folder in [MOVING_IMAGES, FIXED_IMAGES, MOVING_LABELS, FIXED_LABELS] {
        let path = dir.path().join("train").join(folder);
        std::fs::create_dir_all(&path)?;
        std::fs::write(path.join("README.txt"), "not a volume")?;
    }

    let config = DataConfig::new(dir.path().to_string_lossy().into_owned());
    let err = get_train_test_dataset::<B, B>(&config, &Default::default()).unwrap_err();
    assert!(format!("{err:#}").contains("No NIfTI volumes found"));
    Ok(())
}

#[test]
fn missing_split_is_an_error() {
    let dir = tempdir().unwrap();
    let config = DataConfig::new(dir.path().to_string_lossy().into_owned());
    assert!(PairedDataset::<B>::load(&config, Split::Train, &Default::default()).is_err());
}
