//! Engine invocation results

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for engine invocations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn {0}")]
    Spawn(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of one external tool run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Stdout followed by stderr
    pub captured_output: String,

    /// Files present in the output directory after the run
    pub produced_paths: Vec<PathBuf>,
}

impl ToolOutput {
    pub fn new(exit_code: i32, captured_output: impl Into<String>) -> Self {
        Self {
            exit_code,
            captured_output: captured_output.into(),
            produced_paths: Vec::new(),
        }
    }

    pub fn with_produced(mut self, paths: Vec<PathBuf>) -> Self {
        self.produced_paths = paths;
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// True if the run produced the given file and it exists on disk
    pub fn produced(&self, path: &Path) -> bool {
        self.produced_paths.iter().any(|p| p == path) && path.exists()
    }
}
