//! Volumetric image with voxel geometry

use crate::core::error::Result;
use crate::spatial::nifti_io;
use ndarray::Array3;
use std::path::Path;

const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// A 3-D scalar image.
///
/// Voxel data is indexed `[x, y, z]`. `origin` is the physical position of
/// the centre of voxel `[0, 0, 0]`; `voxel_size` is the physical spacing
/// along each axis. Axes are assumed aligned with the physical frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    voxel_size: [f64; 3],
    origin: [f64; 3],
}

impl Volume {
    pub fn new(data: Array3<f32>, voxel_size: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            data,
            voxel_size,
            origin,
        }
    }

    /// Zero-filled volume with the given shape and geometry
    pub fn zeros(shape: [usize; 3], voxel_size: [f64; 3], origin: [f64; 3]) -> Self {
        Self::new(Array3::zeros(shape), voxel_size, origin)
    }

    /// Read a NIfTI file (`.nii` or `.nii.gz`)
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        nifti_io::read(path.as_ref())
    }

    /// Write a NIfTI file, compressed when the path ends in `.gz`
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        nifti_io::write(self, path.as_ref())
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn voxel_size(&self) -> [f64; 3] {
        self.voxel_size
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn shape(&self) -> [usize; 3] {
        let dims = self.data.dim();
        [dims.0, dims.1, dims.2]
    }

    /// Physical position of a voxel centre
    pub fn position(&self, index: [usize; 3]) -> [f64; 3] {
        [0, 1, 2].map(|axis| self.origin[axis] + index[axis] as f64 * self.voxel_size[axis])
    }

    /// Index of the voxel containing a physical point, if inside the volume
    pub fn index_of(&self, point: [f64; 3]) -> Option<[usize; 3]> {
        let shape = self.shape();
        let mut index = [0usize; 3];
        for axis in 0..3 {
            let continuous = (point[axis] - self.origin[axis]) / self.voxel_size[axis];
            let nearest = continuous.round();
            if nearest < 0.0 || nearest >= shape[axis] as f64 {
                return None;
            }
            index[axis] = nearest as usize;
        }
        Some(index)
    }

    /// Physical bounds `[min, max]` per axis, measured at the outer voxel faces
    pub fn extent(&self) -> [[f64; 2]; 3] {
        let shape = self.shape();
        [0, 1, 2].map(|axis| {
            let half = self.voxel_size[axis] / 2.0;
            let first = self.origin[axis] - half;
            let last = self.origin[axis] + (shape[axis] as f64 - 1.0) * self.voxel_size[axis] + half;
            [first.min(last), first.max(last)]
        })
    }

    /// True if both volumes share shape, voxel size and origin
    pub fn same_geometry(&self, other: &Volume) -> bool {
        let close = |a: [f64; 3], b: [f64; 3]| {
            a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < GEOMETRY_TOLERANCE)
        };
        self.shape() == other.shape()
            && close(self.voxel_size, other.voxel_size)
            && close(self.origin, other.origin)
    }
}
