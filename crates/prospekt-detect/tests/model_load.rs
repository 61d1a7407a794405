//! Startup behaviour of `Detector::load`, and inference through the portable
//! runtime on a two-class detection head fixture.

use std::path::{Path, PathBuf};

use prospekt_core::{Device, RuntimeKind};
use prospekt_detect::{
    prepare_image, Detect, DetectError, Detector, DetectorConfig, ModelInfo, RawBox,
};

/// `tests/fixtures/two_class_head.onnx`: a 32x32 input and a constant
/// `[1, 6, 8]` head (`cx, cy, w, h`, two class scores, eight anchors).
const FIXTURE_INPUT_SIZE: u32 = 32;
const FIXTURE_SHA256: &str = "fe016f7f9d51da8744e03768a41691df2c65343e3375e122b7ed8e01caeafe59";

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("two_class_head.onnx")
}

fn load_fixture() -> Detector {
    Detector::load(&DetectorConfig {
        model_path: fixture_path(),
        input_size: FIXTURE_INPUT_SIZE,
        runtime: RuntimeKind::Portable,
        device: Device::Cpu,
    })
    .expect("fixture loads")
}

fn config(model_path: PathBuf, runtime: RuntimeKind, device: Device) -> DetectorConfig {
    DetectorConfig {
        model_path,
        input_size: 640,
        runtime,
        device,
    }
}

#[test]
fn misconfigured_model_path_is_a_model_load_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("models").join("best.onnx");

    let err = Detector::load(&config(missing, RuntimeKind::Portable, Device::Cpu)).unwrap_err();

    match err {
        DetectError::ModelLoad { path, .. } => assert!(path.ends_with("best.onnx")),
        other => panic!("expected ModelLoad, got: {other:?}"),
    }
}

#[test]
fn directory_instead_of_file_is_a_model_load_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Detector::load(&config(
        dir.path().to_path_buf(),
        RuntimeKind::Portable,
        Device::Cpu,
    ))
    .unwrap_err();
    assert!(matches!(err, DetectError::ModelLoad { .. }), "got: {err:?}");
}

#[test]
fn portable_runtime_rejects_cuda_device() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("best.onnx");
    std::fs::write(&path, b"weights").expect("write");

    let err = Detector::load(&config(path, RuntimeKind::Portable, Device::Cuda)).unwrap_err();
    assert!(err.to_string().contains("only supports cpu"), "got: {err}");
}

#[test]
fn model_info_serializes_runtime_and_device_in_lowercase() {
    let info = ModelInfo {
        path: "models/best.onnx".to_string(),
        size_bytes: 12_345,
        sha256: "ab".repeat(32),
        runtime: RuntimeKind::Portable,
        device: Device::Cpu,
        input_size: 640,
        num_classes: 5,
    };
    let json = serde_json::to_value(&info).expect("serialize");
    assert_eq!(json["runtime"], "portable");
    assert_eq!(json["device"], "cpu");
    assert_eq!(json["num_classes"], 5);
}

#[test]
fn detection_head_loads_through_the_portable_runtime() {
    let detector = load_fixture();
    let info = detector.info();

    assert_eq!(info.num_classes, 2);
    assert_eq!(info.input_size, FIXTURE_INPUT_SIZE);
    assert_eq!(info.runtime, RuntimeKind::Portable);
    assert_eq!(info.sha256, FIXTURE_SHA256);
    assert_eq!(
        info.size_bytes,
        std::fs::metadata(fixture_path()).expect("fixture metadata").len()
    );
    assert_eq!(detector.input_size(), FIXTURE_INPUT_SIZE);
}

#[test]
fn detect_returns_one_decoded_box_per_anchor() {
    let detector = load_fixture();
    let page = image::DynamicImage::new_rgb8(64, 48);

    let mut boxes = detector
        .detect(&prepare_image(&page, FIXTURE_INPUT_SIZE))
        .expect("inference");

    assert_eq!(boxes.len(), 8);
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let close = |a: f32, b: f32| (a - b).abs() < 1e-5;
    let expect_box = |raw: &RawBox, class_id, score, [x1, y1, x2, y2]: [f32; 4]| {
        assert_eq!(raw.class_id, class_id);
        assert!(close(raw.score, score), "score {}", raw.score);
        assert!(
            close(raw.bbox.x1, x1)
                && close(raw.bbox.y1, y1)
                && close(raw.bbox.x2, x2)
                && close(raw.bbox.y2, y2),
            "bbox {:?}",
            raw.bbox
        );
    };
    expect_box(&boxes[0], 0, 0.9, [4.0, 4.0, 16.0, 12.0]);
    expect_box(&boxes[1], 1, 0.75, [18.0, 17.0, 26.0, 23.0]);
    assert!(boxes[2..].iter().all(|b| b.class_id == 1 && close(b.score, 0.02)));
}

#[test]
fn detect_rejects_input_prepared_at_another_size() {
    let detector = load_fixture();
    let page = image::DynamicImage::new_rgb8(64, 64);

    let err = detector.detect(&prepare_image(&page, 64)).unwrap_err();

    assert!(matches!(err, DetectError::Inference(_)), "got: {err:?}");
}
