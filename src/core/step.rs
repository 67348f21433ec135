//! Step domain model

use crate::core::state::StepState;
use std::path::{Path, PathBuf};

/// One registration step in a working directory.
///
/// `tfile` and `transformed_image` are only set once the step has been
/// performed; both are re-derived from disk, never trusted from memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique step name, also the output directory name
    pub name: String,

    /// Directory holding this step's inputs and outputs
    pub outdir: PathBuf,

    /// The step's copy of its parameter file
    pub pfile: PathBuf,

    /// Transform file written by the engine
    pub tfile: Option<PathBuf>,

    /// Moving image resampled onto the fixed image by this step
    pub transformed_image: Option<PathBuf>,
}

impl Step {
    /// A configured step that has not been performed
    pub fn new(name: impl Into<String>, outdir: PathBuf, pfile: PathBuf) -> Self {
        Self {
            name: name.into(),
            outdir,
            pfile,
            tfile: None,
            transformed_image: None,
        }
    }

    pub fn state(&self) -> StepState {
        if self.tfile.is_some() {
            StepState::Performed
        } else {
            StepState::Configured
        }
    }

    pub fn is_performed(&self) -> bool {
        self.tfile.is_some()
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }
}
