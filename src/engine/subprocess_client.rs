//! Engine subprocess client - runs elastix/transformix and captures the result

use crate::engine::{EngineError, ToolOutput};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs one engine executable as a subprocess
#[derive(Debug, Clone)]
pub struct SubprocessClient {
    /// Timeout for command execution in seconds
    timeout_secs: u64,
}

impl SubprocessClient {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Run `program` with `args` and collect what it left in `outdir`.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ToolOutput::exit_code`] together with the files they expect.
    ///
    /// # Errors
    /// Returns `EngineError` if:
    /// - The executable cannot be spawned
    /// - The command times out (the child is killed)
    /// - The output directory cannot be listed
    pub async fn run(
        &self,
        program: &str,
        args: &[OsString],
        outdir: &Path,
    ) -> Result<ToolOutput, EngineError> {
        debug!("Running {} {:?}", program, args);

        let timeout_duration = Duration::from_secs(self.timeout_secs);

        let result = timeout(
            timeout_duration,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| EngineError::Timeout(self.timeout_secs))?;

        let output = result.map_err(|e| EngineError::Spawn(format!("{}: {}", program, e)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let mut captured_output = String::from_utf8_lossy(&output.stdout).into_owned();
        captured_output.push_str(&String::from_utf8_lossy(&output.stderr));

        if exit_code != 0 {
            warn!("{} exited with code {}", program, exit_code);
        }

        let produced_paths = list_files(outdir)?;
        debug!(
            "{} returned {} bytes of output, {} files in {}",
            program,
            captured_output.len(),
            produced_paths.len(),
            outdir.display()
        );

        Ok(ToolOutput {
            exit_code,
            captured_output,
            produced_paths,
        })
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|e| EngineError::Internal(format!("Failed to list {}: {}", dir.display(), e)))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}
