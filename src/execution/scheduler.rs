//! Step selection - which steps a request touches

use crate::core::error::{RegistrationError, Result};
use crate::core::step::Step;
use std::fmt;
use std::str::FromStr;

/// Reference to a step by position or name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StepRef {
    /// The final step in the pipeline
    #[default]
    Last,
    /// Zero-based position in execution order
    Index(usize),
    Name(String),
}

impl FromStr for StepRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "last" => StepRef::Last,
            _ => match s.parse::<usize>() {
                Ok(index) => StepRef::Index(index),
                Err(_) => StepRef::Name(s.to_string()),
            },
        })
    }
}

impl From<&str> for StepRef {
    fn from(name: &str) -> Self {
        StepRef::Name(name.to_string())
    }
}

impl From<usize> for StepRef {
    fn from(index: usize) -> Self {
        StepRef::Index(index)
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepRef::Last => f.write_str("last"),
            StepRef::Index(index) => write!(f, "#{}", index),
            StepRef::Name(name) => f.write_str(name),
        }
    }
}

/// Position of the referenced step
pub fn resolve(steps: &[Step], step: &StepRef) -> Result<usize> {
    match step {
        StepRef::Last if steps.is_empty() => Err(RegistrationError::UnresolvedStep(
            "no steps have been added".to_string(),
        )),
        StepRef::Last => Ok(steps.len() - 1),
        StepRef::Index(index) if *index < steps.len() => Ok(*index),
        StepRef::Index(index) => Err(RegistrationError::UnknownStep(format!(
            "#{} (pipeline has {} steps)",
            index,
            steps.len()
        ))),
        StepRef::Name(name) => steps
            .iter()
            .position(|s| &s.name == name)
            .ok_or_else(|| RegistrationError::UnknownStep(name.clone())),
    }
}

/// Steps to run, in order: every step, or `target` and its predecessors
pub fn plan(steps: &[Step], target: Option<&str>) -> Result<Vec<String>> {
    let end = match target {
        Some(name) => resolve(steps, &StepRef::Name(name.to_string()))? + 1,
        None => steps.len(),
    };
    Ok(steps[..end].iter().map(|s| s.name.clone()).collect())
}
