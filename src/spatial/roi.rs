//! Regions of interest and structure sets

use crate::core::error::{RegistrationError, Result};
use crate::spatial::{nifti_io, Volume};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Boundary points (world x, y) of a region, keyed by slice index
pub type Contours = BTreeMap<usize, Vec<[f64; 2]>>;

/// A named region defined by a binary mask
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    name: String,
    mask: Volume,
}

impl Roi {
    /// Create a region from a mask; voxels at or above 0.5 are inside
    pub fn new(name: impl Into<String>, mut mask: Volume) -> Self {
        mask.data_mut().mapv_inplace(|v| if v >= 0.5 { 1.0 } else { 0.0 });
        Self {
            name: name.into(),
            mask,
        }
    }

    /// Read a mask file, naming the region after the file stem
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = nifti_io::stem(path)
            .ok_or_else(|| RegistrationError::Image(format!("{} has no file name", path.display())))?;
        Ok(Self::new(name, Volume::read(path)?))
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.mask.write(path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mask(&self) -> &Volume {
        &self.mask
    }

    pub fn voxel_count(&self) -> usize {
        self.mask.data().iter().filter(|&&v| v > 0.0).count()
    }

    /// Boundary voxels per slice: inside voxels with an in-plane
    /// 4-neighbour that is outside the region or outside the volume
    pub fn contours(&self) -> Contours {
        let data = self.mask.data();
        let [nx, ny, nz] = self.mask.shape();
        let inside = |x: isize, y: isize, z: usize| {
            x >= 0
                && y >= 0
                && (x as usize) < nx
                && (y as usize) < ny
                && data[[x as usize, y as usize, z]] > 0.0
        };

        let mut contours = Contours::new();
        for z in 0..nz {
            let mut points = Vec::new();
            for y in 0..ny {
                for x in 0..nx {
                    let (xi, yi) = (x as isize, y as isize);
                    if !inside(xi, yi, z) {
                        continue;
                    }
                    let on_edge = !inside(xi - 1, yi, z)
                        || !inside(xi + 1, yi, z)
                        || !inside(xi, yi - 1, z)
                        || !inside(xi, yi + 1, z);
                    if on_edge {
                        let position = self.mask.position([x, y, z]);
                        points.push([position[0], position[1]]);
                    }
                }
            }
            if !points.is_empty() {
                contours.insert(z, points);
            }
        }
        contours
    }
}

/// Ordered collection of uniquely named regions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureSet {
    name: String,
    rois: Vec<Roi>,
}

impl StructureSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rois: Vec::new(),
        }
    }

    /// Add a region, replacing any existing region with the same name
    pub fn add_roi(&mut self, roi: Roi) {
        match self.rois.iter_mut().find(|r| r.name == roi.name) {
            Some(existing) => *existing = roi,
            None => self.rois.push(roi),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    pub fn roi(&self, name: &str) -> Option<&Roi> {
        self.rois.iter().find(|r| r.name == name)
    }

    pub fn roi_names(&self) -> Vec<&str> {
        self.rois.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Write every region as `<dir>/<name>.nii`
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for roi in &self.rois {
            if roi.name.is_empty() || roi.name.contains(['/', '\\']) {
                return Err(RegistrationError::Image(format!(
                    "region name '{}' is not a valid file name",
                    roi.name
                )));
            }
            roi.write(dir.join(format!("{}.nii", roi.name)))?;
        }
        debug!("Wrote {} regions to {}", self.rois.len(), dir.display());
        Ok(())
    }

    /// Read every `.nii`/`.nii.gz` mask in a directory, ordered by file name
    pub fn read<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && nifti_io::is_nifti(path))
            .collect();
        paths.sort();

        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut set = StructureSet::new(name);
        for path in paths {
            set.add_roi(Roi::read(&path)?);
        }
        Ok(set)
    }
}
