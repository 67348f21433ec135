//! On-disk pipeline state

pub mod layout;
pub mod workspace;

pub use workspace::Workspace;
