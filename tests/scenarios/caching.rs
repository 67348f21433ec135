//! Test: Caching - transformed images come from memory, disk, or recomputation

use crate::helpers::*;
use regpipe::core::RegistrationError;
use regpipe::execution::StepRef;
use regpipe::persistence::layout;
use tempfile::tempdir;

#[tokio::test]
async fn test_transformed_image_read_from_disk_then_memory() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();

    let first = registration.get_transformed_image(StepRef::Index(0)).await.unwrap();
    let second = registration.get_transformed_image(StepRef::Index(0)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.transform_count(), 0);
}

#[tokio::test]
async fn test_missing_result_is_recomputed_and_written_back() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();
    let step = registration.workspace().steps()[1].clone();
    let result_path = layout::result_path(&step.outdir);
    let on_disk = regpipe::spatial::Volume::read(&result_path).unwrap();
    std::fs::remove_file(&result_path).unwrap();

    let recomputed = registration
        .get_transformed_image(StepRef::Name(step.name.clone()))
        .await
        .unwrap();

    assert_eq!(engine.transform_count(), 1);
    assert_eq!(recomputed, on_disk);
    assert!(result_path.is_file());
    assert_eq!(
        registration.workspace().step(&step.name).unwrap().transformed_image,
        Some(result_path)
    );

    // Served from memory afterwards
    registration.get_transformed_image(StepRef::Last).await.unwrap();
    assert_eq!(engine.transform_count(), 1);
}

#[tokio::test]
async fn test_transformed_image_before_registration() {
    let dir = tempdir().unwrap();
    let (mut registration, _engine) = setup_registration(dir.path());

    let err = registration.get_transformed_image(StepRef::Last).await.unwrap_err();

    assert!(matches!(err, RegistrationError::UnresolvedStep(name) if name == "02_MI_Affine"));
}
