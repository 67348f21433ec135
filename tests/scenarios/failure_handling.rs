//! Test: Failure Handling - engine failures stop the run and can be retried

use crate::helpers::*;
use regpipe::core::{RegistrationError, StepState};
use regpipe::execution::{Registration, RegistrationEvent};
use regpipe::persistence::{layout, Workspace};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_failed_step_then_retry() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    let events = record_events(&mut registration);
    engine.fail_step("02_MI_Affine", Failure::NonZeroExit);

    let err = registration.register(None).await.unwrap_err();

    match &err {
        RegistrationError::ExternalTool { tool, exit_code, .. } => {
            assert_eq!(tool, "elastix");
            assert_eq!(*exit_code, Some(1));
        }
        other => panic!("expected ExternalTool, got {:?}", other),
    }
    assert!(err.captured_output().unwrap().contains("metric diverged"));

    let workspace = registration.workspace();
    assert_eq!(workspace.step_state("01_MI_Translation"), StepState::Performed);
    assert_eq!(workspace.step_state("02_MI_Affine"), StepState::Configured);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, RegistrationEvent::StepFailed { step, .. } if step == "02_MI_Affine")));

    // Only the failed step runs again
    engine.clear_failures();
    registration.register(None).await.unwrap();

    assert_eq!(engine.registration_count(), 3);
    let last = engine.registrations().pop().unwrap();
    assert!(last.outdir.ends_with("02_MI_Affine"));
    assert_eq!(
        registration.workspace().step_state("02_MI_Affine"),
        StepState::Performed
    );
}

#[tokio::test]
async fn test_clean_exit_without_transform_file_is_error() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    engine.fail_step("01_MI_Translation", Failure::MissingOutput);

    let err = registration.register(None).await.unwrap_err();

    assert!(matches!(
        err,
        RegistrationError::ExternalTool { exit_code: Some(0), .. }
    ));
    // Nothing after the failed step ran
    assert_eq!(engine.registration_count(), 1);
    assert_eq!(
        registration.workspace().step_state("02_MI_Affine"),
        StepState::Configured
    );
}

#[tokio::test]
async fn test_outputs_of_failed_step_are_discarded() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    engine.fail_step("01_MI_Translation", Failure::PartialOutput);

    registration.register(None).await.unwrap_err();

    let step = registration.workspace().steps()[0].clone();
    assert!(step.tfile.is_none());
    assert!(step.transformed_image.is_none());
    assert!(!layout::tfile_path(&step.outdir).exists());
    assert!(!layout::result_path(&step.outdir).exists());

    let reloaded = Workspace::open(dir.path(), None, None, false).unwrap();
    assert_eq!(reloaded.steps()[0].transformed_image, None);
    assert_eq!(reloaded.step_state("01_MI_Translation"), StepState::Configured);
}

#[tokio::test]
async fn test_missing_moving_image() {
    let dir = tempdir().unwrap();
    let mut workspace = Workspace::open(dir.path(), Some(&fixed_image()), None, false).unwrap();
    workspace
        .add_step(&pfile("MI_Translation.txt"), None, &Default::default())
        .unwrap();
    let engine = Arc::new(MockEngine::new());
    let mut registration = Registration::new(workspace, engine.clone());

    let err = registration.register(None).await.unwrap_err();

    assert!(matches!(err, RegistrationError::MissingInput(_)));
    assert_eq!(engine.registration_count(), 0);
}
