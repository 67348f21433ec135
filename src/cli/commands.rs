//! CLI command definitions

use crate::core::params::{decode_value, ParameterSet};
use crate::execution::StepRef;
use clap::Args;
use std::path::PathBuf;

/// Run the registration
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Only run this step (and the steps before it)
    #[arg(long)]
    pub step: Option<String>,

    /// Discard existing state in the working directory first
    #[arg(long)]
    pub overwrite: bool,
}

/// Show pipeline status
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Working directory (instead of the one named in the config)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Apply a transform
#[derive(Debug, Args, Clone)]
pub struct TransformCommand {
    /// Working directory (instead of the one named in the config)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Entity kind: image, roi or structure-set (detected when omitted)
    #[arg(long)]
    pub kind: Option<String>,

    /// Step name or zero-based index (defaults to the last step)
    #[arg(long)]
    pub step: Option<String>,

    /// Map from fixed to moving space instead
    #[arg(long)]
    pub invert: bool,

    /// Image or mask file, or a directory of masks
    pub input: PathBuf,

    /// Where to write the result
    pub output: PathBuf,
}

impl TransformCommand {
    pub fn step_ref(&self) -> StepRef {
        self.step
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

/// Remove steps
#[derive(Debug, Args, Clone)]
pub struct ClearCommand {
    /// Working directory (instead of the one named in the config)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Remove only this step
    #[arg(long)]
    pub step: Option<String>,
}

/// Adjust a parameter file
#[derive(Debug, Args, Clone)]
pub struct AdjustCommand {
    /// Source parameter file
    pub input: PathBuf,

    /// Destination (may equal the source)
    pub output: PathBuf,

    /// Values to set (key=value; several tokens make a list)
    #[arg(long = "set", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Fail instead of appending keys missing from the source
    #[arg(long)]
    pub strict: bool,
}

impl AdjustCommand {
    /// Overrides decoded with the parameter-file typing rule
    pub fn overrides(&self) -> ParameterSet {
        self.set
            .iter()
            .map(|(key, value)| (key.clone(), decode_value(value)))
            .collect()
    }
}

/// Shift a transform's translation; the result is `input - shift`
#[derive(Debug, Args, Clone)]
pub struct ShiftCommand {
    /// Transform file to read
    pub tfile: PathBuf,

    /// Destination (may equal the source)
    pub output: PathBuf,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dx: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dy: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dz: f64,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].trim().is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].trim().to_string(), parts[1].to_string()))
}
