//! Pipeline configuration from YAML

use crate::core::params::{ParamValue, ParameterSet};
use crate::engine::EngineConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level registration configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Working directory holding all pipeline state
    pub workdir: PathBuf,

    /// Fixed image to copy into the working directory
    #[serde(default)]
    pub fixed: Option<PathBuf>,

    /// Moving image to copy into the working directory
    #[serde(default)]
    pub moving: Option<PathBuf>,

    /// Discard any existing state in the working directory
    #[serde(default)]
    pub overwrite: bool,

    /// External engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Registration steps, in composition order
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Parameter file for this step
    pub pfile: PathBuf,

    /// Step name; derived from the parameter file when absent
    #[serde(default)]
    pub name: Option<String>,

    /// Parameter values replaced in (or appended to) the step's copy
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
}

impl StepConfig {
    /// Convert the YAML overrides into a parameter set
    pub fn parameter_overrides(&self) -> Result<ParameterSet> {
        self.overrides
            .iter()
            .map(|(key, value)| {
                let value = yaml_to_param(value)
                    .with_context(|| format!("Override '{}' of {}", key, self.pfile.display()))?;
                Ok::<_, anyhow::Error>((key.clone(), value))
            })
            .collect()
    }
}

impl RegistrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// Relative paths are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: RegistrationConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RegistrationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Explicit step names must be unique
        let mut seen_names = HashSet::new();
        for step in &self.steps {
            if let Some(name) = &step.name {
                if !seen_names.insert(name) {
                    anyhow::bail!("Duplicate step name: {}", name);
                }
            }
        }

        for step in &self.steps {
            if !step.pfile.is_file() {
                anyhow::bail!(
                    "Parameter file doesn't exist: {}",
                    step.pfile.display()
                );
            }
            step.parameter_overrides()?;
        }

        for (label, image) in [("fixed", &self.fixed), ("moving", &self.moving)] {
            if let Some(image) = image {
                if !image.is_file() {
                    anyhow::bail!("The {} image doesn't exist: {}", label, image.display());
                }
            }
        }

        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.workdir);
        if let Some(fixed) = self.fixed.as_mut() {
            resolve(fixed);
        }
        if let Some(moving) = self.moving.as_mut() {
            resolve(moving);
        }
        for step in &mut self.steps {
            resolve(&mut step.pfile);
        }
    }
}

fn yaml_to_param(value: &Value) -> Result<ParamValue> {
    match value {
        Value::Bool(b) => Ok(ParamValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(ParamValue::Int(i)),
            None => n
                .as_f64()
                .map(ParamValue::Float)
                .with_context(|| format!("Unsupported number {}", n)),
        },
        Value::String(s) => Ok(ParamValue::Str(s.clone())),
        Value::Sequence(items) => {
            if items.is_empty() {
                anyhow::bail!("Empty lists cannot be written to a parameter file");
            }
            let values = items
                .iter()
                .map(|item| match item {
                    Value::Sequence(_) => anyhow::bail!("Nested lists are not supported"),
                    other => yaml_to_param(other),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ParamValue::List(values))
        }
        other => anyhow::bail!("Unsupported value {:?}", other),
    }
}
