//! File names inside a working directory

use std::path::{Path, PathBuf};

/// Canonical copy of the fixed image
pub const FIXED_IMAGE: &str = "fixed.nii";

/// Canonical copy of the moving image
pub const MOVING_IMAGE: &str = "moving.nii";

/// Step names in execution order, one per line
pub const STEPS_FILE: &str = "registration_steps.txt";

/// A step's copy of its parameter file
pub const INPUT_PARAMETERS: &str = "InputParameters.txt";

/// Transform file written by elastix
pub const TRANSFORM_FILE: &str = "TransformParameters.0.txt";

/// Resampled moving image written by elastix
pub const RESULT_IMAGE: &str = "result.0.nii";

/// Resampled image written by transformix
pub const TRANSFORMIX_RESULT: &str = "result.nii";

/// Subdirectory of a step holding its inverse transform
pub const INVERSE_DIR: &str = "inverse";

/// `ResultImageFormat` every step is forced to, matching the names above
pub const RESULT_FORMAT: &str = "nii";

pub fn step_dir(workdir: &Path, name: &str) -> PathBuf {
    workdir.join(name)
}

pub fn pfile_path(outdir: &Path) -> PathBuf {
    outdir.join(INPUT_PARAMETERS)
}

pub fn tfile_path(outdir: &Path) -> PathBuf {
    outdir.join(TRANSFORM_FILE)
}

pub fn result_path(outdir: &Path) -> PathBuf {
    outdir.join(RESULT_IMAGE)
}

pub fn inverse_dir(outdir: &Path) -> PathBuf {
    outdir.join(INVERSE_DIR)
}
