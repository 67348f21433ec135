//! Working-directory state for a registration pipeline
//!
//! Everything the pipeline knows lives on disk: the canonical input images,
//! the ordered step list and one directory per step. Memory is a cache that
//! is rebuilt from disk on `load_steps` and refreshed after every engine run.

use crate::core::error::{RegistrationError, Result};
use crate::core::params::{self, MissingKeyPolicy, ParamValue, ParameterSet};
use crate::core::state::{PipelineSummary, StepState, StepSummary};
use crate::core::step::Step;
use crate::persistence::layout;
use crate::spatial::Volume;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Output format forced on every step so engine results match the layout
const RESULT_IMAGE_FORMAT: &str = "ResultImageFormat";

/// The state of one working directory.
///
/// Only one `Workspace` (in one process) should use a directory at a time.
#[derive(Debug, Clone)]
pub struct Workspace {
    workdir: PathBuf,
    fixed_path: Option<PathBuf>,
    moving_path: Option<PathBuf>,
    steps: Vec<Step>,
}

impl Workspace {
    /// Open (creating if needed) a working directory.
    ///
    /// Supplied images replace the canonical copies; otherwise existing
    /// copies are picked up. With `overwrite`, prior inputs, steps and
    /// outputs are discarded first.
    pub fn open<P: AsRef<Path>>(
        workdir: P,
        fixed: Option<&Volume>,
        moving: Option<&Volume>,
        overwrite: bool,
    ) -> Result<Self> {
        let workdir = workdir.as_ref().to_path_buf();
        fs::create_dir_all(&workdir)?;

        let mut workspace = Self {
            workdir,
            fixed_path: None,
            moving_path: None,
            steps: Vec::new(),
        };

        if overwrite {
            workspace.discard_all()?;
        }
        if let Some(fixed) = fixed {
            workspace.set_fixed_image(fixed)?;
        }
        if let Some(moving) = moving {
            workspace.set_moving_image(moving)?;
        }

        workspace.load_steps()?;
        info!(
            "Opened working directory {} with {} steps",
            workspace.workdir.display(),
            workspace.steps.len()
        );
        Ok(workspace)
    }

    /// Rebuild in-memory state from the working directory.
    ///
    /// Listed steps whose parameter file has vanished, repeated names and
    /// names that are not a single path component are dropped, and the
    /// step list is rewritten.
    pub fn load_steps(&mut self) -> Result<()> {
        self.fixed_path = existing(self.workdir.join(layout::FIXED_IMAGE));
        self.moving_path = existing(self.workdir.join(layout::MOVING_IMAGE));
        self.steps.clear();

        let steps_file = self.steps_file();
        if !steps_file.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&steps_file)?;
        let mut seen = HashSet::new();
        let mut repaired = false;

        for name in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Err(e) = validate_step_name(name) {
                warn!("Dropping step entry: {}", e);
                repaired = true;
                continue;
            }
            if !seen.insert(name.to_string()) {
                warn!("Dropping duplicate step entry '{}'", name);
                repaired = true;
                continue;
            }
            let outdir = layout::step_dir(&self.workdir, name);
            let pfile = layout::pfile_path(&outdir);
            if !pfile.is_file() {
                warn!(
                    "Dropping step '{}': parameter file {} is missing",
                    name,
                    pfile.display()
                );
                repaired = true;
                continue;
            }
            let mut step = Step::new(name, outdir, pfile);
            refresh_outputs(&mut step);
            self.steps.push(step);
        }

        if repaired {
            self.write_steps_file()?;
        }
        debug!("Loaded {} steps from {}", self.steps.len(), steps_file.display());
        Ok(())
    }

    /// Add a step at the end of the pipeline.
    ///
    /// The parameter file is copied into the step directory with
    /// `overrides` applied. Without a name, `NN_<pfile stem>` is used.
    pub fn add_step(
        &mut self,
        pfile: &Path,
        name: Option<&str>,
        overrides: &ParameterSet,
    ) -> Result<&Step> {
        let name = match name {
            Some(name) => {
                validate_step_name(name)?;
                if self.step(name).is_some() {
                    return Err(RegistrationError::DuplicateName(name.to_string()));
                }
                name.to_string()
            }
            None => self.derive_step_name(pfile)?,
        };

        let outdir = layout::step_dir(&self.workdir, &name);
        if outdir.exists() {
            warn!("Removing stale step directory {}", outdir.display());
            fs::remove_dir_all(&outdir)?;
        }
        fs::create_dir_all(&outdir)?;

        let mut overrides = overrides.clone();
        overrides.insert(RESULT_IMAGE_FORMAT, ParamValue::from(layout::RESULT_FORMAT));
        let step_pfile = layout::pfile_path(&outdir);
        if let Err(e) = params::adjust(pfile, &step_pfile, &overrides, MissingKeyPolicy::Append) {
            let _ = fs::remove_dir_all(&outdir);
            return Err(e);
        }

        self.steps.push(Step::new(name.clone(), outdir, step_pfile));
        self.write_steps_file()?;
        info!("Added step '{}' from {}", name, pfile.display());

        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Remove a step and its directory. Later steps are kept as they are.
    pub fn remove_step(&mut self, name: &str) -> Result<()> {
        let index = self.index_of(name)?;
        let step = self.steps.remove(index);
        if step.outdir.exists() {
            fs::remove_dir_all(&step.outdir)?;
        }
        self.write_steps_file()?;
        info!("Removed step '{}'", name);
        Ok(())
    }

    /// Remove every step; the input images are kept
    pub fn clear(&mut self) -> Result<()> {
        for step in self.steps.drain(..) {
            if step.outdir.exists() {
                fs::remove_dir_all(&step.outdir)?;
            }
        }
        fs::write(self.steps_file(), "")?;
        info!("Cleared steps in {}", self.workdir.display());
        Ok(())
    }

    /// True if the step's transform file exists on disk
    pub fn already_performed(&self, name: &str) -> Result<bool> {
        let step = self.require_step(name)?;
        Ok(layout::tfile_path(&step.outdir).is_file())
    }

    /// Re-derive a step's outputs from disk after the engine ran
    pub fn record_result(&mut self, name: &str) -> Result<&Step> {
        let index = self.index_of(name)?;
        refresh_outputs(&mut self.steps[index]);
        Ok(&self.steps[index])
    }

    pub fn step_state(&self, name: &str) -> StepState {
        match self.step(name) {
            Some(step) if layout::tfile_path(&step.outdir).is_file() => StepState::Performed,
            Some(step) if step.pfile.is_file() => StepState::Configured,
            _ => StepState::Unconfigured,
        }
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            workdir: self.workdir.clone(),
            fixed: self.fixed_path.clone(),
            moving: self.moving_path.clone(),
            steps: self
                .steps
                .iter()
                .map(|step| StepSummary {
                    name: step.name.clone(),
                    state: self.step_state(&step.name),
                    pfile: step.pfile.clone(),
                    tfile: step.tfile.clone(),
                    transformed_image: step.transformed_image.clone(),
                })
                .collect(),
        }
    }

    /// Replace the canonical fixed image
    pub fn set_fixed_image(&mut self, image: &Volume) -> Result<()> {
        let path = self.workdir.join(layout::FIXED_IMAGE);
        image.write(&path)?;
        self.fixed_path = Some(path);
        Ok(())
    }

    /// Replace the canonical moving image
    pub fn set_moving_image(&mut self, image: &Volume) -> Result<()> {
        let path = self.workdir.join(layout::MOVING_IMAGE);
        image.write(&path)?;
        self.moving_path = Some(path);
        Ok(())
    }

    pub fn fixed_image(&self) -> Result<Volume> {
        let path = self
            .fixed_path
            .as_ref()
            .ok_or_else(|| RegistrationError::MissingInput("fixed image".to_string()))?;
        Volume::read(path)
    }

    pub fn moving_image(&self) -> Result<Volume> {
        let path = self
            .moving_path
            .as_ref()
            .ok_or_else(|| RegistrationError::MissingInput("moving image".to_string()))?;
        Volume::read(path)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn fixed_path(&self) -> Option<&Path> {
        self.fixed_path.as_deref()
    }

    pub fn moving_path(&self) -> Option<&Path> {
        self.moving_path.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn steps_file(&self) -> PathBuf {
        self.workdir.join(layout::STEPS_FILE)
    }

    fn require_step(&self, name: &str) -> Result<&Step> {
        self.step(name)
            .ok_or_else(|| RegistrationError::UnknownStep(name.to_string()))
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RegistrationError::UnknownStep(name.to_string()))
    }

    fn derive_step_name(&self, pfile: &Path) -> Result<String> {
        let stem = pfile
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| RegistrationError::InvalidStepName(pfile.display().to_string()))?;

        let mut index = self.steps.len() + 1;
        loop {
            let candidate = format!("{:02}_{}", index, stem);
            if self.step(&candidate).is_none() {
                validate_step_name(&candidate)?;
                return Ok(candidate);
            }
            index += 1;
        }
    }

    fn write_steps_file(&self) -> Result<()> {
        let mut content = String::new();
        for step in &self.steps {
            content.push_str(&step.name);
            content.push('\n');
        }
        fs::write(self.steps_file(), content)?;
        Ok(())
    }

    /// Remove inputs, the step list and every step directory
    fn discard_all(&mut self) -> Result<()> {
        for image in [layout::FIXED_IMAGE, layout::MOVING_IMAGE] {
            let path = self.workdir.join(image);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        let steps_file = self.steps_file();
        if steps_file.exists() {
            let content = fs::read_to_string(&steps_file)?;
            for name in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if validate_step_name(name).is_err() {
                    continue;
                }
                let dir = layout::step_dir(&self.workdir, name);
                if dir.is_dir() {
                    fs::remove_dir_all(&dir)?;
                }
            }
            fs::remove_file(&steps_file)?;
        }

        // Step directories no longer listed in the step file
        for entry in fs::read_dir(&self.workdir)? {
            let path = entry?.path();
            if path.is_dir() && layout::pfile_path(&path).is_file() {
                fs::remove_dir_all(&path)?;
            }
        }

        self.fixed_path = None;
        self.moving_path = None;
        self.steps.clear();
        warn!("Discarded previous state in {}", self.workdir.display());
        Ok(())
    }
}

/// A step name doubles as a directory name
fn validate_step_name(name: &str) -> Result<()> {
    let invalid = || RegistrationError::InvalidStepName(name.to_string());
    if name.trim().is_empty() || name.trim() != name || name.contains(['\n', '\r']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(invalid()),
    }
}

/// A result image only counts once the transform file exists
fn refresh_outputs(step: &mut Step) {
    step.tfile = existing(layout::tfile_path(&step.outdir));
    step.transformed_image = step
        .tfile
        .as_ref()
        .and_then(|_| existing(layout::result_path(&step.outdir)));
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}
