//! Test: Transforms - applying step transforms to images, regions and sets

use crate::helpers::*;
use regpipe::core::params::{self, ParamValue};
use regpipe::core::RegistrationError;
use regpipe::execution::{RegistrationEvent, StepRef};
use regpipe::persistence::layout;
use regpipe::spatial::{EntityKind, Roi, SpatialEntity, StructureSet};
use std::path::Path;
use tempfile::tempdir;

#[tokio::test]
async fn test_transform_image_matches_registration_result() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();
    let events = record_events(&mut registration);

    let transformed = registration
        .transform(&moving_image().into(), StepRef::Last, false)
        .await
        .unwrap();
    let expected = registration.get_transformed_image(StepRef::Last).await.unwrap();

    assert_eq!(transformed, SpatialEntity::Image(expected));
    assert_eq!(engine.transform_count(), 1);
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &[RegistrationEvent::TransformApplied {
            step: "02_MI_Affine".to_string(),
            kind: EntityKind::Image,
            invert: false,
        }]
    );
    // Scratch directories are cleaned up
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".transform-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_transform_roi_uses_nearest_neighbour() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();

    let roi = Roi::new("cube", moving_image());
    let transformed = registration
        .transform(&roi.into(), StepRef::Index(0), false)
        .await
        .unwrap();

    let SpatialEntity::Roi(transformed) = transformed else {
        panic!("expected a region");
    };
    assert_eq!(transformed.name(), "cube");
    assert_eq!(transformed.voxel_count(), 27);
    assert_close(centroid(transformed.mask()), [4.0, 4.0, 4.0]);
    assert_eq!(
        transformed.contours().keys().copied().collect::<Vec<_>>(),
        vec![3, 4, 5]
    );

    let applied = engine.applied_tfiles();
    assert_eq!(
        applied[0].get("FinalBSplineInterpolationOrder"),
        Some(&ParamValue::Int(0))
    );
    // The step's own transform file is untouched
    let step = &registration.workspace().steps()[0];
    let original = params::read(layout::tfile_path(&step.outdir)).unwrap();
    assert_eq!(
        original.get("FinalBSplineInterpolationOrder"),
        Some(&ParamValue::Int(3))
    );
}

#[tokio::test]
async fn test_transform_structure_set_preserves_names_and_order() {
    let dir = tempdir().unwrap();
    let (mut registration, _engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();

    let mut set = StructureSet::new("shapes");
    set.add_roi(Roi::new("cube", moving_image()));
    set.add_roi(Roi::new("point", cuboid([11, 11, 11], [6.0, 6.0, 6.0], 0.0)));

    let transformed = registration
        .transform(&set.clone().into(), StepRef::Last, false)
        .await
        .unwrap();

    let SpatialEntity::StructureSet(transformed) = transformed else {
        panic!("expected a structure set");
    };
    assert_eq!(transformed.name(), "shapes");
    assert_eq!(transformed.len(), set.len());
    assert_eq!(transformed.roi_names(), vec!["cube", "point"]);
    let point = transformed.roi("point").unwrap();
    assert_eq!(point.voxel_count(), 1);
    assert_close(centroid(point.mask()), [4.0, 4.0, 4.0]);

    // Written and read back as one mask per region
    let out = dir.path().join("transformed_shapes");
    SpatialEntity::StructureSet(transformed).save(&out).unwrap();
    let reread = SpatialEntity::load(&out, EntityKind::StructureSet).unwrap();
    assert_eq!(reread.kind(), EntityKind::StructureSet);
}

#[tokio::test]
async fn test_inverse_transform_is_computed_once() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();

    let back = registration
        .transform(&fixed_image().into(), StepRef::Last, true)
        .await
        .unwrap();

    let SpatialEntity::Image(back) = back else {
        panic!("expected an image");
    };
    assert!(back.same_geometry(&moving_image()));
    assert_close(centroid(&back), centroid(&moving_image()));
    assert_eq!(engine.registration_count(), 3);

    let inverse = engine.registrations().pop().unwrap();
    assert_eq!(inverse.moving, inverse.fixed);
    let step = registration.workspace().steps()[1].clone();
    assert_eq!(inverse.initial_transform, step.tfile);
    let inverse_pfile = params::read(&inverse.pfile).unwrap();
    assert_eq!(
        inverse_pfile.get("Metric"),
        Some(&ParamValue::from("DisplacementMagnitudePenalty"))
    );

    let inverse_tfile = params::read(layout::tfile_path(&layout::inverse_dir(&step.outdir))).unwrap();
    assert_eq!(
        inverse_tfile.get("InitialTransformParametersFileName"),
        Some(&ParamValue::from("NoInitialTransform"))
    );
    assert_eq!(
        inverse_tfile.get("Size"),
        Some(&ParamValue::from(vec![11, 11, 11]))
    );

    // Cached in the step directory
    registration
        .transform(&Roi::new("cube", fixed_image()).into(), StepRef::Last, true)
        .await
        .unwrap();
    assert_eq!(engine.registration_count(), 3);
}

#[tokio::test]
async fn test_transform_before_registration() {
    let dir = tempdir().unwrap();
    let (mut registration, engine) = setup_registration(dir.path());

    let err = registration
        .transform(&moving_image().into(), StepRef::Index(0), false)
        .await
        .unwrap_err();

    assert!(matches!(err, RegistrationError::UnresolvedStep(name) if name == "01_MI_Translation"));
    assert_eq!(engine.transform_count(), 0);
}

#[tokio::test]
async fn test_unsupported_entities() {
    assert!(matches!(
        "dose".parse::<EntityKind>(),
        Err(RegistrationError::UnsupportedEntity(_))
    ));
    assert!(matches!(
        EntityKind::detect(Path::new("plan.dcm")),
        Err(RegistrationError::UnsupportedEntity(_))
    ));
}
