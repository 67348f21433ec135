//! Test: Parameter Files - reading, adjusting and shifting engine files

use crate::helpers::*;
use regpipe::core::params::{self, MissingKeyPolicy, ParamValue, ParameterSet, TRANSFORM_PARAMETERS};
use regpipe::core::RegistrationError;
use tempfile::tempdir;

#[test]
fn test_read_shipped_parameter_file() {
    let params = params::read(pfile("MI_Translation.txt")).unwrap();

    assert_eq!(params.get("NumberOfResolutions"), Some(&ParamValue::Int(4)));
    assert_eq!(params.get("UseDirectionCosines"), Some(&ParamValue::Bool(true)));
    assert_eq!(
        params.get("HowToCombineTransforms"),
        Some(&ParamValue::from("Compose"))
    );
    assert_eq!(
        params.get("RequiredRatioOfValidSamples"),
        Some(&ParamValue::Float(0.05))
    );
    let schedule = params.get("ImagePyramidSchedule").and_then(ParamValue::as_list).unwrap();
    assert_eq!(schedule.len(), 12);
    assert_eq!(schedule[0], ParamValue::Int(8));
}

#[test]
fn test_write_then_read_keeps_types() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("params.txt");
    let params = ParameterSet::new()
        .with("float", 0.4)
        .with("list", vec![0.4, 0.2, 0.1])
        .with("int", 6)
        .with("int_list", vec![2, 5, 2])
        .with("string", "test")
        .with("true", true)
        .with("false", false);

    params::write(&path, &params).unwrap();

    assert_eq!(params::read(&path).unwrap(), params);
}

#[test]
fn test_adjust_changes_only_named_record() {
    let dir = tempdir().unwrap();
    let src = pfile("MI_Translation.txt");
    let dst = dir.path().join("adjusted.txt");
    let original = std::fs::read_to_string(&src).unwrap();
    assert!(original.contains("(DefaultPixelValue 0)"));

    let overrides = ParameterSet::new().with("DefaultPixelValue", 10);
    params::adjust(&src, &dst, &overrides, MissingKeyPolicy::Strict).unwrap();

    let adjusted = std::fs::read_to_string(&dst).unwrap();
    assert!(adjusted.contains("(DefaultPixelValue 10)"));
    let changed: Vec<_> = original
        .lines()
        .zip(adjusted.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(changed, vec![("(DefaultPixelValue 0)", "(DefaultPixelValue 10)")]);
    assert_eq!(original.lines().count(), adjusted.lines().count());
}

#[test]
fn test_strict_adjust_rejects_unknown_key() {
    let dir = tempdir().unwrap();
    let overrides = ParameterSet::new().with("NoSuchKey", 1);
    let err = params::adjust(
        pfile("MI_Affine.txt"),
        dir.path().join("out.txt"),
        &overrides,
        MissingKeyPolicy::Strict,
    )
    .unwrap_err();
    assert!(matches!(err, RegistrationError::MissingKey(key) if key == "NoSuchKey"));
}

#[tokio::test]
async fn test_shift_registered_translation() {
    let dir = tempdir().unwrap();
    let (mut registration, _engine) = setup_registration(dir.path());
    registration.register(None).await.unwrap();
    let tfile = registration.workspace().steps()[0].tfile.clone().unwrap();
    let init = params::read(&tfile).unwrap().get(TRANSFORM_PARAMETERS).unwrap().to_vec();

    let shifted = dir.path().join("shifted.txt");
    params::shift_translation(&tfile, 5.0, 7.0, 3.0, &shifted).unwrap();

    let fin = params::read(&shifted).unwrap().get(TRANSFORM_PARAMETERS).unwrap().to_vec();
    for (axis, shift) in [5.0, 7.0, 3.0].into_iter().enumerate() {
        assert_eq!(
            fin[axis].as_f64().unwrap(),
            init[axis].as_f64().unwrap() - shift
        );
    }
}
