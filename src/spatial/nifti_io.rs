//! NIfTI (`.nii` / `.nii.gz`) reading and writing
//!
//! Volumes carry their origin and voxel size in the engine's LPS world
//! frame; NIfTI stores an RAS affine, so x and y flip sign on the way
//! through. Direction cosines other than the axes are not kept.

use crate::core::error::{RegistrationError, Result};
use crate::spatial::Volume;
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// LPS to RAS sign per axis
const RAS_FLIP: [f64; 3] = [-1.0, -1.0, 1.0];

/// True for `.nii` and `.nii.gz` paths
pub fn is_nifti(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// File name without `.nii` or `.nii.gz`
pub fn stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let lower = name.to_ascii_lowercase();
    let cut = if lower.ends_with(".nii.gz") {
        name.len() - ".nii.gz".len()
    } else if lower.ends_with(".nii") {
        name.len() - ".nii".len()
    } else {
        return path.file_stem().map(|s| s.to_string_lossy().into_owned());
    };
    Some(name[..cut].to_string())
}

/// Read a NIfTI file into a volume
pub fn read(path: &Path) -> Result<Volume> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| image_error(path, e))?;
    let (voxel_size, origin) = geometry(object.header());

    let array = object
        .into_volume()
        .into_ndarray::<f32>()
        .map_err(|e| image_error(path, e))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 || shape[3..].iter().any(|&n| n != 1) {
        return Err(RegistrationError::Image(format!(
            "{}: expected a 3-D single-channel image, found dimensions {:?}",
            path.display(),
            shape
        )));
    }

    // Logical iteration order is [x, y, z] whatever the memory layout
    let values: Vec<f32> = array.iter().copied().collect();
    let data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)
        .map_err(|e| image_error(path, e))?;

    debug!("Read {:?} volume from {}", &shape[..3], path.display());
    Ok(Volume::new(data, voxel_size, origin))
}

/// Write a volume as 32-bit float NIfTI; `.gz` paths are compressed
pub fn write(volume: &Volume, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    WriterOptions::new(path)
        .reference_header(&header_for(volume))
        .write_nifti(volume.data())
        .map_err(|e| image_error(path, e))?;

    debug!("Wrote {:?} volume to {}", volume.shape(), path.display());
    Ok(())
}

/// Header carrying the volume's geometry as both qform and sform
fn header_for(volume: &Volume) -> NiftiHeader {
    let spacing = volume.voxel_size();
    let origin = volume.origin();
    let ras_origin = [0, 1, 2].map(|axis| (RAS_FLIP[axis] * origin[axis]) as f32);

    let mut header = NiftiHeader::default();
    header.pixdim = [1.0; 8];
    for axis in 0..3 {
        header.pixdim[axis + 1] = spacing[axis] as f32;
    }

    // 180 degrees about z: diag(-1, -1, 1)
    header.qform_code = 1;
    header.quatern_b = 0.0;
    header.quatern_c = 0.0;
    header.quatern_d = 1.0;
    header.quatern_x = ras_origin[0];
    header.quatern_y = ras_origin[1];
    header.quatern_z = ras_origin[2];

    header.sform_code = 1;
    header.srow_x = [-(spacing[0] as f32), 0.0, 0.0, ras_origin[0]];
    header.srow_y = [0.0, -(spacing[1] as f32), 0.0, ras_origin[1]];
    header.srow_z = [0.0, 0.0, spacing[2] as f32, ras_origin[2]];
    header
}

/// Voxel size and LPS origin from the sform, else the qform, else pixdim
fn geometry(header: &NiftiHeader) -> ([f64; 3], [f64; 3]) {
    let affine = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        qform_affine(header)
    } else {
        let voxel_size = [1, 2, 3].map(|i| (header.pixdim[i] as f64).abs());
        return (voxel_size, [0.0; 3]);
    };

    let mut voxel_size = [0.0; 3];
    let mut origin = [0.0; 3];
    for axis in 0..3 {
        let column = [0, 1, 2].map(|row| affine[row][axis] as f64);
        voxel_size[axis] = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        origin[axis] = RAS_FLIP[axis] * affine[axis][3] as f64;

        let off_axis = (0..3)
            .filter(|&row| row != axis)
            .any(|row| column[row].abs() > 1e-6 * voxel_size[axis].max(1.0));
        if off_axis {
            warn!("Oblique NIfTI orientation; direction cosines are ignored");
        }
    }
    (voxel_size, origin)
}

/// Quaternion form of the NIfTI affine
fn qform_affine(header: &NiftiHeader) -> [[f32; 4]; 3] {
    let (b, c, d) = (header.quatern_b, header.quatern_c, header.quatern_d);
    let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let (dx, dy, dz) = (header.pixdim[1], header.pixdim[2], header.pixdim[3] * qfac);

    [
        [
            (a * a + b * b - c * c - d * d) * dx,
            (2.0 * b * c - 2.0 * a * d) * dy,
            (2.0 * b * d + 2.0 * a * c) * dz,
            header.quatern_x,
        ],
        [
            (2.0 * b * c + 2.0 * a * d) * dx,
            (a * a + c * c - b * b - d * d) * dy,
            (2.0 * c * d - 2.0 * a * b) * dz,
            header.quatern_y,
        ],
        [
            (2.0 * b * d - 2.0 * a * c) * dx,
            (2.0 * c * d + 2.0 * a * b) * dy,
            (a * a + d * d - c * c - b * b) * dz,
            header.quatern_z,
        ],
    ]
}

fn image_error(path: &Path, error: impl std::fmt::Display) -> RegistrationError {
    RegistrationError::Image(format!("{}: {}", path.display(), error))
}
