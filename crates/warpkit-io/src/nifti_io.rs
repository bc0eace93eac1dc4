use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use ndarray::{Array3, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use warpkit_core::image::Image;
use warpkit_core::spatial::{Direction, Point, Spacing, Vector};

/// Voxel-to-world affine rows from a header: sform, then qform, then pixdim only.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    if header.sform_code > 0 {
        let row = |r: [f32; 4]| r.map(f64::from);
        return [row(header.srow_x), row(header.srow_y), row(header.srow_z)];
    }

    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;

    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] as f64 };
        let dz = dz * qfac;

        return [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x as f64,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y as f64,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z as f64,
            ],
        ];
    }

    [
        [dx, 0.0, 0.0, 0.0],
        [0.0, dy, 0.0, 0.0],
        [0.0, 0.0, dz, 0.0],
    ]
}

/// Split the affine into spacing and unit direction columns, one per NIfTI axis (i, j, k).
fn decompose_affine(affine: &[[f64; 4]; 3]) -> ([f64; 3], [Vector<3>; 3]) {
    let mut spacing = [1.0; 3];
    let mut columns = [Vector::zeros(); 3];
    for axis in 0..3 {
        let column = Vector::new([affine[0][axis], affine[1][axis], affine[2][axis]]);
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[axis] = norm;
            columns[axis] = column * (1.0 / norm);
        } else {
            let mut unit = Vector::zeros();
            unit[axis] = 1.0;
            columns[axis] = unit;
        }
    }
    (spacing, columns)
}

/// Read a 3D NIfTI volume (`.nii` or `.nii.gz`).
///
/// NIfTI stores voxels as `[X, Y, Z]`; the returned tensor is `[Z, Y, X]`
/// and the spacing / direction columns are reordered to match the tensor axes.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;

    let affine = header_affine(obj.header());
    let (spacing, columns) = decompose_affine(&affine);
    let origin = Point::new([affine[0][3], affine[1][3], affine[2][3]]);

    let volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    if volume.ndim() != 3 {
        bail!(
            "Expected 3D NIfTI file, found {} dimensions in {}",
            volume.ndim(),
            path.display()
        );
    }
    let volume = volume.into_dimensionality::<Ix3>()?;

    // Logical [Z, Y, X] order regardless of the in-memory layout.
    let zyx = volume.permuted_axes([2, 1, 0]);
    let dims = [zyx.shape()[0], zyx.shape()[1], zyx.shape()[2]];
    let values: Vec<f32> = zyx.iter().copied().collect();

    let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(dims)), device);

    Ok(Image::new(
        tensor,
        origin,
        Spacing::new([spacing[2], spacing[1], spacing[0]]),
        Direction::from_columns([columns[2], columns[1], columns[0]]),
    ))
}

/// Write an image as NIfTI, with its geometry stored in the sform.
///
/// A `.nii.gz` path is gzip-compressed.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    use nifti::writer::WriterOptions;

    let [nz, ny, nx] = image.shape();
    let data = image.data().to_data();
    let values = data
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    let zyx = Array3::from_shape_vec((nz, ny, nx), values).context("Failed to create ndarray")?;
    let xyz = zyx.permuted_axes([2, 1, 0]);

    // Tensor axis t holds NIfTI axis 2 - t.
    let spacing = image.spacing();
    let direction = image.direction();
    let origin = image.origin();
    let mut header = NiftiHeader::default();
    let mut rows = [[0f32; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for axis in 0..3 {
            let t = 2 - axis;
            row[axis] = (direction[(r, t)] * spacing[t]) as f32;
        }
        row[3] = origin[r] as f32;
    }
    header.srow_x = rows[0];
    header.srow_y = rows[1];
    header.srow_z = rows[2];
    header.sform_code = 1;
    header.pixdim = [
        1.0,
        spacing[2] as f32,
        spacing[1] as f32,
        spacing[0] as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];

    let path = path.as_ref();
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&xyz)
        .map_err(|e| anyhow::anyhow!("Failed to write NIfTI file {}: {}", path.display(), e))?;

    Ok(())
}
