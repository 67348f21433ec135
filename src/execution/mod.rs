//! Pipeline execution

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EventHandler, Registration, RegistrationEvent};
pub use executor::StepExecutor;
pub use scheduler::StepRef;
