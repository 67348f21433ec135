//! regpipe - multi-step image registration driven by elastix

pub mod cli;
pub mod core;
pub mod engine;
pub mod execution;
pub mod persistence;
pub mod spatial;

// Re-export commonly used types
pub use crate::core::{ParamValue, ParameterSet, RegistrationError, Result, Step, StepState};
pub use engine::{ElastixEngine, EngineConfig, EngineError, RegistrationEngine, ToolOutput, TransformEngine};
pub use execution::{Registration, RegistrationEvent, StepRef};
pub use persistence::Workspace;
pub use spatial::{EntityKind, Roi, SpatialEntity, StructureSet, Volume};
