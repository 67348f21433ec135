//! Test: Single Step - registering one step runs its predecessors

use crate::helpers::*;
use regpipe::core::{RegistrationError, StepState};
use tempfile::tempdir;

#[tokio::test]
async fn test_register_named_step_runs_predecessors() {
    let dir = tempdir().unwrap();
    let engine = std::sync::Arc::new(MockEngine::new());
    let workspace = setup_workspace(dir.path(), &["MI_Translation.txt", "MI_Affine.txt", "MI_Affine.txt"]);
    let mut registration = regpipe::execution::Registration::new(workspace, engine.clone());

    registration.register(Some("02_MI_Affine")).await.unwrap();

    let workspace = registration.workspace();
    assert_eq!(workspace.step_state("01_MI_Translation"), StepState::Performed);
    assert_eq!(workspace.step_state("02_MI_Affine"), StepState::Performed);
    assert_eq!(workspace.step_state("03_MI_Affine"), StepState::Configured);
    assert_eq!(engine.registration_count(), 2);
}

#[tokio::test]
async fn test_register_first_step_only() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());

    registration.register(Some("01_MI_Translation")).await.unwrap();
    registration.register(Some("01_MI_Translation")).await.unwrap();

    assert_eq!(engine.registration_count(), 1);
    assert_eq!(
        registration.workspace().step_state("02_MI_Affine"),
        StepState::Configured
    );
}

#[tokio::test]
async fn test_register_unknown_step() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());

    let err = registration.register(Some("03_missing")).await.unwrap_err();

    assert!(matches!(err, RegistrationError::UnknownStep(name) if name == "03_missing"));
    assert_eq!(engine.registration_count(), 0);
}
