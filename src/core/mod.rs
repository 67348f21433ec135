//! Core domain models for registration pipelines
//!
//! This module defines the parameter-file codec, the step model and its
//! state, configuration, and the error taxonomy shared by the library.

pub mod config;
pub mod error;
pub mod params;
pub mod state;
pub mod step;

pub use error::{RegistrationError, Result};
pub use params::{MissingKeyPolicy, ParamValue, ParameterSet};
pub use state::*;
pub use step::*;
