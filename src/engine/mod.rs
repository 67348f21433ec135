//! External registration engine: trait seams and the elastix implementation

pub mod client;
pub mod response;
pub mod subprocess_client;

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;

pub use client::EngineConfig;
pub use response::{EngineError, ToolOutput};
pub use subprocess_client::SubprocessClient;

/// Inputs for one registration run
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub fixed: PathBuf,
    pub moving: PathBuf,
    pub pfile: PathBuf,
    pub outdir: PathBuf,
    /// Transform file composed before this run's transform
    pub initial_transform: Option<PathBuf>,
}

/// Inputs for applying a transform file to an image
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub input: PathBuf,
    pub tfile: PathBuf,
    pub outdir: PathBuf,
}

/// Trait for registration execution - allows for different implementations
#[async_trait]
pub trait RegistrationEngine: Send + Sync {
    /// Register `moving` onto `fixed`, writing a transform file into `outdir`
    async fn register(&self, request: &RegistrationRequest) -> Result<ToolOutput, EngineError>;
}

/// Trait for transform application
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Resample `input` through `tfile`, writing the result into `outdir`
    async fn apply(&self, request: &TransformRequest) -> Result<ToolOutput, EngineError>;
}

/// Engine backed by the `elastix` and `transformix` executables
#[derive(Debug, Clone)]
pub struct ElastixEngine {
    config: EngineConfig,
    subprocess_client: SubprocessClient,
}

impl ElastixEngine {
    pub fn new(config: EngineConfig) -> Self {
        let subprocess_client = SubprocessClient::new(config.timeout_secs);
        Self {
            config,
            subprocess_client,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Command line for `elastix`
    pub fn registration_args(&self, request: &RegistrationRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            request.fixed.clone().into(),
            "-m".into(),
            request.moving.clone().into(),
            "-p".into(),
            request.pfile.clone().into(),
            "-out".into(),
            request.outdir.clone().into(),
        ];
        if let Some(t0) = &request.initial_transform {
            args.push("-t0".into());
            args.push(t0.clone().into());
        }
        self.push_threads(&mut args);
        args
    }

    /// Command line for `transformix`
    pub fn transform_args(&self, request: &TransformRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-in".into(),
            request.input.clone().into(),
            "-tp".into(),
            request.tfile.clone().into(),
            "-out".into(),
            request.outdir.clone().into(),
        ];
        self.push_threads(&mut args);
        args
    }

    fn push_threads(&self, args: &mut Vec<OsString>) {
        if let Some(threads) = self.config.threads {
            args.push("-threads".into());
            args.push(threads.to_string().into());
        }
    }
}

impl Default for ElastixEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait]
impl RegistrationEngine for ElastixEngine {
    async fn register(&self, request: &RegistrationRequest) -> Result<ToolOutput, EngineError> {
        let args = self.registration_args(request);
        self.subprocess_client
            .run(&self.config.elastix, &args, &request.outdir)
            .await
    }
}

#[async_trait]
impl TransformEngine for ElastixEngine {
    async fn apply(&self, request: &TransformRequest) -> Result<ToolOutput, EngineError> {
        let args = self.transform_args(request);
        self.subprocess_client
            .run(&self.config.transformix, &args, &request.outdir)
            .await
    }
}
