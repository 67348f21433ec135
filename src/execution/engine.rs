//! Registration orchestrator - runs the pipeline and applies its transforms

use crate::{
    core::error::{RegistrationError, Result},
    core::params::{self, MissingKeyPolicy, ParameterSet},
    core::step::Step,
    engine::{RegistrationEngine, RegistrationRequest, TransformEngine, TransformRequest},
    execution::{scheduler, StepExecutor, StepRef},
    persistence::{layout, Workspace},
    spatial::{EntityKind, Roi, SpatialEntity, StructureSet, Volume},
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Metric that drives a registration towards the identity; used to invert
const INVERSION_METRIC: &str = "DisplacementMagnitudePenalty";

/// Events that can occur while registering or transforming
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationEvent {
    PipelineStarted {
        workdir: PathBuf,
        total_steps: usize,
    },
    StepStarted {
        step: String,
        index: usize,
        total: usize,
    },
    StepSkipped {
        step: String,
    },
    StepCompleted {
        step: String,
        tfile: PathBuf,
    },
    StepFailed {
        step: String,
        error: String,
    },
    TransformApplied {
        step: String,
        kind: EntityKind,
        invert: bool,
    },
    PipelineCompleted {
        success: bool,
        performed: usize,
        skipped: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(RegistrationEvent) + Send + Sync>;

/// Drives the engine over a working directory
pub struct Registration<E> {
    workspace: Workspace,
    executor: StepExecutor<E>,
    event_handlers: Vec<EventHandler>,
    image_cache: HashMap<String, Volume>,
}

impl<E> Registration<E>
where
    E: RegistrationEngine + TransformEngine,
{
    pub fn new(workspace: Workspace, engine: Arc<E>) -> Self {
        Self {
            workspace,
            executor: StepExecutor::new(engine),
            event_handlers: Vec::new(),
            image_cache: HashMap::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(RegistrationEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: RegistrationEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Mutable access for adding or removing steps; cached images are dropped
    pub fn workspace_mut(&mut self) -> &mut Workspace {
        self.image_cache.clear();
        &mut self.workspace
    }

    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }

    pub fn engine(&self) -> &Arc<E> {
        self.executor.engine()
    }

    /// Perform every step, or `step` and the steps before it.
    ///
    /// Steps whose transform file already exists are skipped. Each step
    /// starts from the previous step's transform. The first failure stops
    /// the run; steps performed before it stay performed.
    pub async fn register(&mut self, step: Option<&str>) -> Result<()> {
        let fixed = self
            .workspace
            .fixed_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| RegistrationError::MissingInput("fixed image".to_string()))?;
        let moving = self
            .workspace
            .moving_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| RegistrationError::MissingInput("moving image".to_string()))?;

        let plan = scheduler::plan(self.workspace.steps(), step)?;
        let total = plan.len();

        info!(
            "Starting registration in {} ({} steps)",
            self.workspace.workdir().display(),
            total
        );
        self.emit_event(RegistrationEvent::PipelineStarted {
            workdir: self.workspace.workdir().to_path_buf(),
            total_steps: total,
        });

        let mut initial_transform: Option<PathBuf> = None;
        let (mut performed, mut skipped) = (0, 0);

        for (index, name) in plan.iter().enumerate() {
            if self.workspace.already_performed(name)? {
                let step = self.workspace.record_result(name)?;
                debug!("Step '{}' already performed, skipping", name);
                initial_transform = step.tfile.clone();
                skipped += 1;
                self.emit_event(RegistrationEvent::StepSkipped { step: name.clone() });
                continue;
            }

            let step = self.require_step(name)?.clone();
            info!("Running step {}/{}: {}", index + 1, total, name);
            self.emit_event(RegistrationEvent::StepStarted {
                step: name.clone(),
                index,
                total,
            });

            let request = RegistrationRequest {
                fixed: fixed.clone(),
                moving: moving.clone(),
                pfile: step.pfile.clone(),
                outdir: step.outdir.clone(),
                initial_transform: initial_transform.clone(),
            };

            match self.executor.register(&request).await {
                Ok(tfile) => {
                    self.workspace.record_result(name)?;
                    self.forget_outputs(&step)?;
                    performed += 1;
                    self.emit_event(RegistrationEvent::StepCompleted {
                        step: name.clone(),
                        tfile: tfile.clone(),
                    });
                    initial_transform = Some(tfile);
                }
                Err(e) => {
                    error!("Step '{}' failed: {}", name, e);
                    discard_partial_outputs(&step);
                    self.workspace.record_result(name)?;
                    self.emit_event(RegistrationEvent::StepFailed {
                        step: name.clone(),
                        error: e.to_string(),
                    });
                    self.emit_event(RegistrationEvent::PipelineCompleted {
                        success: false,
                        performed,
                        skipped,
                    });
                    return Err(e);
                }
            }
        }

        info!(
            "Registration complete: {} performed, {} already done",
            performed, skipped
        );
        self.emit_event(RegistrationEvent::PipelineCompleted {
            success: true,
            performed,
            skipped,
        });
        Ok(())
    }

    /// Apply the transform of a performed step to an entity.
    ///
    /// Regions are resampled with nearest-neighbour interpolation and
    /// re-thresholded; structure sets keep their region names and order.
    /// With `invert`, the entity is mapped from fixed to moving space.
    pub async fn transform(
        &mut self,
        entity: &SpatialEntity,
        step: StepRef,
        invert: bool,
    ) -> Result<SpatialEntity> {
        let step = self.performed_step(&step)?;
        let tfile = if invert {
            self.inverse_tfile(&step).await?
        } else {
            layout::tfile_path(&step.outdir)
        };

        let transformed = match entity {
            SpatialEntity::Image(volume) => {
                SpatialEntity::Image(self.transform_volume(volume, &tfile, false).await?)
            }
            SpatialEntity::Roi(roi) => SpatialEntity::Roi(self.transform_roi(roi, &tfile).await?),
            SpatialEntity::StructureSet(set) => {
                let mut result = StructureSet::new(set.name());
                for roi in set.rois() {
                    result.add_roi(self.transform_roi(roi, &tfile).await?);
                }
                SpatialEntity::StructureSet(result)
            }
        };

        info!(
            "Applied {}{} transform to {}",
            step.name,
            if invert { " inverse" } else { "" },
            entity.kind()
        );
        self.emit_event(RegistrationEvent::TransformApplied {
            step: step.name.clone(),
            kind: entity.kind(),
            invert,
        });
        Ok(transformed)
    }

    /// The moving image resampled by a performed step.
    ///
    /// Served from memory, else from the step's result file, else
    /// recomputed from the moving image and written back.
    pub async fn get_transformed_image(&mut self, step: StepRef) -> Result<Volume> {
        let step = self.performed_step(&step)?;
        if let Some(volume) = self.image_cache.get(&step.name) {
            return Ok(volume.clone());
        }

        let path = layout::result_path(&step.outdir);
        let volume = if path.is_file() {
            Volume::read(&path)?
        } else {
            debug!("Recomputing transformed image for '{}'", step.name);
            let moving = self.workspace.moving_image()?;
            let tfile = layout::tfile_path(&step.outdir);
            let volume = self.transform_volume(&moving, &tfile, false).await?;
            volume.write(&path)?;
            self.workspace.record_result(&step.name)?;
            volume
        };

        self.image_cache.insert(step.name.clone(), volume.clone());
        Ok(volume)
    }

    fn require_step(&self, name: &str) -> Result<&Step> {
        self.workspace
            .step(name)
            .ok_or_else(|| RegistrationError::UnknownStep(name.to_string()))
    }

    fn performed_step(&self, step: &StepRef) -> Result<Step> {
        let index = scheduler::resolve(self.workspace.steps(), step)?;
        let step = self.workspace.steps()[index].clone();
        if !self.workspace.already_performed(&step.name)? {
            return Err(RegistrationError::UnresolvedStep(step.name));
        }
        Ok(step)
    }

    /// Drop cached results derived from an earlier run of this step
    fn forget_outputs(&mut self, step: &Step) -> Result<()> {
        self.image_cache.remove(&step.name);
        let inverse = layout::inverse_dir(&step.outdir);
        if inverse.exists() {
            fs::remove_dir_all(&inverse)?;
        }
        Ok(())
    }

    /// Inverse of a step's transform, computed once and kept in `inverse/`
    async fn inverse_tfile(&self, step: &Step) -> Result<PathBuf> {
        let dir = layout::inverse_dir(&step.outdir);
        let tfile = layout::tfile_path(&dir);
        if tfile.is_file() {
            return Ok(tfile);
        }

        info!("Computing inverse transform for '{}'", step.name);
        let fixed = self
            .workspace
            .fixed_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| RegistrationError::MissingInput("fixed image".to_string()))?;
        let moving = self.workspace.moving_image()?;

        fs::create_dir_all(&dir)?;
        let pfile = layout::pfile_path(&dir);
        let metric = ParameterSet::new().with("Metric", INVERSION_METRIC);
        params::adjust(&step.pfile, &pfile, &metric, MissingKeyPolicy::Append)?;

        let request = RegistrationRequest {
            fixed: fixed.clone(),
            moving: fixed,
            pfile,
            outdir: dir.clone(),
            initial_transform: Some(layout::tfile_path(&step.outdir)),
        };
        if let Err(e) = self.executor.register(&request).await {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        // Standalone transform resampling onto the moving image grid
        let geometry = ParameterSet::new()
            .with("InitialTransformParametersFileName", "NoInitialTransform")
            .with("Size", moving.shape().to_vec())
            .with("Spacing", moving.voxel_size().to_vec())
            .with("Origin", moving.origin().to_vec());
        params::adjust(&tfile, &tfile, &geometry, MissingKeyPolicy::Append)?;

        Ok(tfile)
    }

    async fn transform_roi(&self, roi: &Roi, tfile: &Path) -> Result<Roi> {
        let mask = self.transform_volume(roi.mask(), tfile, true).await?;
        Ok(Roi::new(roi.name(), mask))
    }

    /// Resample a volume through a transform file in a scratch directory
    async fn transform_volume(&self, volume: &Volume, tfile: &Path, nearest: bool) -> Result<Volume> {
        let scratch = self
            .workspace
            .workdir()
            .join(format!(".transform-{}", Uuid::new_v4()));
        fs::create_dir_all(&scratch)?;

        let result = self.transform_in(&scratch, volume, tfile, nearest).await;
        if let Err(e) = fs::remove_dir_all(&scratch) {
            warn!("Failed to remove {}: {}", scratch.display(), e);
        }
        result
    }

    async fn transform_in(
        &self,
        scratch: &Path,
        volume: &Volume,
        tfile: &Path,
        nearest: bool,
    ) -> Result<Volume> {
        let input = scratch.join("input.nii");
        volume.write(&input)?;

        let tfile = if nearest {
            let adjusted = scratch.join(layout::TRANSFORM_FILE);
            let order = ParameterSet::new().with("FinalBSplineInterpolationOrder", 0);
            params::adjust(tfile, &adjusted, &order, MissingKeyPolicy::Append)?;
            adjusted
        } else {
            tfile.to_path_buf()
        };

        let output = self
            .executor
            .apply(&TransformRequest {
                input,
                tfile,
                outdir: scratch.to_path_buf(),
            })
            .await?;
        Volume::read(output)
    }
}

/// A failed run must not leave the step looking performed
fn discard_partial_outputs(step: &Step) {
    for path in [
        layout::tfile_path(&step.outdir),
        layout::result_path(&step.outdir),
    ] {
        if path.exists() {
            warn!("Removing partial output {}", path.display());
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
