//! Step and pipeline state models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// State of a single step, always derived from the working directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// No parameter file on disk
    Unconfigured,
    /// Parameter file present, no transform file yet
    Configured,
    /// Transform file present
    Performed,
}

impl StepState {
    pub fn is_performed(&self) -> bool {
        matches!(self, StepState::Performed)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepState::Unconfigured => "unconfigured",
            StepState::Configured => "configured",
            StepState::Performed => "performed",
        };
        f.write_str(name)
    }
}

/// Snapshot of one step for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub state: StepState,
    pub pfile: PathBuf,
    pub tfile: Option<PathBuf>,
    pub transformed_image: Option<PathBuf>,
}

/// Snapshot of a working directory for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub workdir: PathBuf,
    pub fixed: Option<PathBuf>,
    pub moving: Option<PathBuf>,
    pub steps: Vec<StepSummary>,
}

impl PipelineSummary {
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn performed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.state.is_performed()).count()
    }

    /// Fraction of performed steps (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.performed_steps() as f64 / self.total_steps() as f64
    }

    /// True once inputs are present and every step has been performed
    pub fn is_complete(&self) -> bool {
        self.fixed.is_some()
            && self.moving.is_some()
            && !self.steps.is_empty()
            && self.performed_steps() == self.total_steps()
    }
}
