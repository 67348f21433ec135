//! Test: Success Chain - two steps composed end to end

use crate::helpers::*;
use regpipe::core::StepState;
use regpipe::execution::{RegistrationEvent, StepRef};
use regpipe::persistence::layout;
use tempfile::tempdir;

#[tokio::test]
async fn test_two_step_registration() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    let events = record_events(&mut registration);

    registration.register(None).await.unwrap();

    let workspace = registration.workspace();
    assert_eq!(workspace.step_names(), vec!["01_MI_Translation", "02_MI_Affine"]);
    for step in workspace.steps() {
        assert_eq!(workspace.step_state(&step.name), StepState::Performed);
        assert_eq!(step.tfile, Some(layout::tfile_path(&step.outdir)));
        assert_eq!(step.transformed_image, Some(layout::result_path(&step.outdir)));
    }

    // The second step starts from the first step's transform
    let requests = engine.registrations();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].initial_transform, None);
    assert_eq!(
        requests[1].initial_transform,
        workspace.steps()[0].tfile.clone()
    );
    assert_eq!(requests[1].pfile, workspace.steps()[1].pfile);

    let events = events.lock().unwrap();
    assert!(matches!(
        events.first(),
        Some(RegistrationEvent::PipelineStarted { total_steps: 2, .. })
    ));
    assert_eq!(
        events.last(),
        Some(&RegistrationEvent::PipelineCompleted {
            success: true,
            performed: 2,
            skipped: 0
        })
    );
}

#[tokio::test]
async fn test_result_aligns_moving_onto_fixed() {
    let dir = tempdir().unwrap();
    let (mut registration, _engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();

    let result = registration.get_transformed_image(StepRef::Last).await.unwrap();

    assert!(result.same_geometry(&fixed_image()));
    assert_close(centroid(&result), centroid(&fixed_image()));
    assert_eq!(
        result.data().iter().filter(|&&v| v > 0.0).count(),
        27
    );
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();
    let steps_before = registration.workspace().steps().to_vec();
    let snapshot = |steps: &[regpipe::Step]| -> Vec<(String, Vec<u8>)> {
        steps
            .iter()
            .map(|step| {
                let tfile = step.tfile.as_ref().unwrap();
                let image = step.transformed_image.as_ref().unwrap();
                (
                    std::fs::read_to_string(tfile).unwrap(),
                    std::fs::read(image).unwrap(),
                )
            })
            .collect()
    };
    let before = snapshot(&steps_before);

    let events = record_events(&mut registration);
    registration.register(None).await.unwrap();

    assert_eq!(engine.registration_count(), 2);
    let steps_after = registration.workspace().steps().to_vec();
    assert_eq!(steps_after, steps_before);
    assert_eq!(snapshot(&steps_after), before);
    let skipped = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, RegistrationEvent::StepSkipped { .. }))
        .count();
    assert_eq!(skipped, 2);
}
