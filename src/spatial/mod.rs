//! Spatial entities that transforms can be applied to

pub mod nifti_io;
pub mod roi;
pub mod volume;

use crate::core::error::{RegistrationError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use roi::{Contours, Roi, StructureSet};
pub use volume::Volume;

/// Kind of a spatial entity on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Image,
    Roi,
    StructureSet,
}

impl EntityKind {
    /// Guess the kind from a path: directories are structure sets,
    /// NIfTI files are images
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Ok(EntityKind::StructureSet)
        } else if nifti_io::is_nifti(path) {
            Ok(EntityKind::Image)
        } else {
            Err(RegistrationError::UnsupportedEntity(path.display().to_string()))
        }
    }
}

impl FromStr for EntityKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(EntityKind::Image),
            "roi" => Ok(EntityKind::Roi),
            "structure-set" | "structure_set" => Ok(EntityKind::StructureSet),
            other => Err(RegistrationError::UnsupportedEntity(other.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Image => "image",
            EntityKind::Roi => "roi",
            EntityKind::StructureSet => "structure-set",
        };
        f.write_str(name)
    }
}

/// Anything a registration transform can be applied to
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialEntity {
    Image(Volume),
    Roi(Roi),
    StructureSet(StructureSet),
}

impl SpatialEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            SpatialEntity::Image(_) => EntityKind::Image,
            SpatialEntity::Roi(_) => EntityKind::Roi,
            SpatialEntity::StructureSet(_) => EntityKind::StructureSet,
        }
    }

    /// Load an entity of the given kind from a file or directory
    pub fn load(path: &Path, kind: EntityKind) -> Result<Self> {
        Ok(match kind {
            EntityKind::Image => SpatialEntity::Image(Volume::read(path)?),
            EntityKind::Roi => SpatialEntity::Roi(Roi::read(path)?),
            EntityKind::StructureSet => SpatialEntity::StructureSet(StructureSet::read(path)?),
        })
    }

    /// Save to a file (image, roi) or directory (structure set)
    pub fn save(&self, path: &Path) -> Result<()> {
        match self {
            SpatialEntity::Image(volume) => volume.write(path),
            SpatialEntity::Roi(roi) => roi.write(path),
            SpatialEntity::StructureSet(set) => set.write(path),
        }
    }
}

impl From<Volume> for SpatialEntity {
    fn from(volume: Volume) -> Self {
        SpatialEntity::Image(volume)
    }
}

impl From<Roi> for SpatialEntity {
    fn from(roi: Roi) -> Self {
        SpatialEntity::Roi(roi)
    }
}

impl From<StructureSet> for SpatialEntity {
    fn from(set: StructureSet) -> Self {
        SpatialEntity::StructureSet(set)
    }
}
