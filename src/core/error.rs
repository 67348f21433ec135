//! Error taxonomy for the registration pipeline

use crate::engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Error types for registration operations
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Malformed record in a parameter file
    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Well-formed file missing a required field
    #[error("Schema error: {0}")]
    Schema(String),

    /// Strict adjustment targeted a key that is not in the source file
    #[error("Key '{0}' not present in parameter file")]
    MissingKey(String),

    #[error("Step '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid step name '{0}'")]
    InvalidStepName(String),

    #[error("No step named '{0}'")]
    UnknownStep(String),

    /// External process exited non-zero or did not write its expected output
    #[error("{tool} failed (exit code {exit_code:?}): {message}")]
    ExternalTool {
        tool: String,
        exit_code: Option<i32>,
        message: String,
        output: String,
    },

    /// Transform requested for a step that has not been performed
    #[error("Step '{0}' has not been performed")]
    UnresolvedStep(String),

    #[error("Unsupported spatial entity: {0}")]
    UnsupportedEntity(String),

    /// Registration attempted without a fixed or moving image
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistrationError {
    /// Captured process output, if this error came from an external tool
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            RegistrationError::ExternalTool { output, .. } => Some(output),
            _ => None,
        }
    }
}
