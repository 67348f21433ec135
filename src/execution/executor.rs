//! Step executor - runs the engine and checks what it produced

use crate::core::error::{RegistrationError, Result};
use crate::engine::{RegistrationEngine, RegistrationRequest, ToolOutput, TransformEngine, TransformRequest};
use crate::persistence::layout;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Invokes the engine and turns "exit 0 but nothing written" into an error
pub struct StepExecutor<E> {
    engine: Arc<E>,
}

impl<E> StepExecutor<E>
where
    E: RegistrationEngine + TransformEngine,
{
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Run one registration; returns the transform file it wrote
    pub async fn register(&self, request: &RegistrationRequest) -> Result<PathBuf> {
        debug!(
            "Registering {} onto {} with {}",
            request.moving.display(),
            request.fixed.display(),
            request.pfile.display()
        );
        let output = self.engine.register(request).await?;
        let tfile = layout::tfile_path(&request.outdir);
        check_output("elastix", &output, &tfile)?;
        Ok(tfile)
    }

    /// Apply a transform file; returns the resampled image path
    pub async fn apply(&self, request: &TransformRequest) -> Result<PathBuf> {
        debug!(
            "Applying {} to {}",
            request.tfile.display(),
            request.input.display()
        );
        let output = self.engine.apply(request).await?;
        let result = request.outdir.join(layout::TRANSFORMIX_RESULT);
        check_output("transformix", &output, &result)?;
        Ok(result)
    }
}

fn check_output(tool: &str, output: &ToolOutput, expected: &std::path::Path) -> Result<()> {
    if !output.success() {
        warn!("{} failed with exit code {}", tool, output.exit_code);
        return Err(RegistrationError::ExternalTool {
            tool: tool.to_string(),
            exit_code: Some(output.exit_code),
            message: format!("exited with code {}", output.exit_code),
            output: output.captured_output.clone(),
        });
    }
    if !output.produced(expected) {
        warn!("{} exited cleanly but did not write {}", tool, expected.display());
        return Err(RegistrationError::ExternalTool {
            tool: tool.to_string(),
            exit_code: Some(output.exit_code),
            message: format!("expected output {} was not written", expected.display()),
            output: output.captured_output.clone(),
        });
    }
    Ok(())
}
