//! Per-page work after download: preprocess, infer, refine, group.

use std::time::Instant;

use prospekt_core::{FailureStage, FlyerPage, PageFailure, PageOutcome, PageResult};
use prospekt_detect::{group_products, prepare, refine, Detect, DetectError, RefineOptions};
use prospekt_scraper::PageFetchFailure;

/// Runs one downloaded page through the model. Blocking; call from a blocking
/// thread.
///
/// The deadline is checked before preprocessing and again before inference.
/// A model call that has already started cannot be interrupted and keeps its
/// inference permit until it returns.
pub(crate) fn detect_page(
    detector: &dyn Detect,
    page: FlyerPage,
    confidence_threshold: f32,
    options: &RefineOptions,
    grouping_proximity: f32,
    deadline: Instant,
) -> PageOutcome {
    let page_number = page.page_number;
    if Instant::now() >= deadline {
        return past_deadline(page_number);
    }
    let input = match prepare(&page.bytes, detector.input_size()) {
        Ok(input) => input,
        Err(err) => return failed(page_number, stage_of(&err), &err),
    };
    // bytes are not needed past preprocessing
    drop(page);
    if Instant::now() >= deadline {
        return past_deadline(page_number);
    }

    let raw = match detector.detect(&input) {
        Ok(raw) => raw,
        Err(err) => return failed(page_number, stage_of(&err), &err),
    };

    let (width, height) = (input.original_width, input.original_height);
    let detections = refine(
        &raw,
        input.input_size,
        (width, height),
        confidence_threshold,
        options,
    );
    let products = group_products(&detections, height, grouping_proximity);
    tracing::debug!(
        page = page_number,
        raw = raw.len(),
        detections = detections.len(),
        products = products.len(),
        "page detected"
    );

    PageOutcome::Ok(PageResult {
        page_number,
        width,
        height,
        detections,
        products,
    })
}

pub(crate) fn fetch_failed(failure: &PageFetchFailure) -> PageOutcome {
    PageOutcome::Failed(PageFailure {
        page_number: failure.page_number,
        stage: FailureStage::Fetch,
        reason: format!("{}: {}", failure.reason, failure.message),
    })
}

pub(crate) fn timed_out(page_number: usize, timeout_secs: u64) -> PageOutcome {
    tracing::warn!(page = page_number, timeout_secs, "page abandoned at request deadline");
    PageOutcome::Failed(PageFailure {
        page_number,
        stage: FailureStage::Timeout,
        reason: format!("request deadline of {timeout_secs}s reached"),
    })
}

fn past_deadline(page_number: usize) -> PageOutcome {
    failed(
        page_number,
        FailureStage::Timeout,
        &"request deadline reached before inference",
    )
}

pub(crate) fn failed(
    page_number: usize,
    stage: FailureStage,
    err: &dyn std::fmt::Display,
) -> PageOutcome {
    tracing::warn!(page = page_number, stage = %stage, error = %err, "page failed");
    PageOutcome::Failed(PageFailure {
        page_number,
        stage,
        reason: err.to_string(),
    })
}

fn stage_of(err: &DetectError) -> FailureStage {
    match err {
        DetectError::UnsupportedImageFormat(_) => FailureStage::Decode,
        DetectError::ModelLoad { .. } | DetectError::Inference(_) => FailureStage::Inference,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use prospekt_core::BoundingBox;
    use prospekt_detect::{ModelInput, RawBox};

    use super::*;

    struct FixedDetector(Vec<RawBox>);

    impl Detect for FixedDetector {
        fn detect(&self, _input: &ModelInput) -> Result<Vec<RawBox>, DetectError> {
            Ok(self.0.clone())
        }

        fn input_size(&self) -> u32 {
            64
        }
    }

    #[derive(Default)]
    struct CountingDetector {
        calls: AtomicUsize,
    }

    impl Detect for CountingDetector {
        fn detect(&self, _input: &ModelInput) -> Result<Vec<RawBox>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn input_size(&self) -> u32 {
            64
        }
    }

    struct BrokenDetector;

    impl Detect for BrokenDetector {
        fn detect(&self, _input: &ModelInput) -> Result<Vec<RawBox>, DetectError> {
            Err(DetectError::Inference("session poisoned".to_string()))
        }

        fn input_size(&self) -> u32 {
            64
        }
    }

    fn options() -> RefineOptions {
        RefineOptions {
            iou_threshold: 0.7,
            class_names: vec!["name".to_string(), "price".to_string()],
        }
    }

    fn page(bytes: Vec<u8>) -> FlyerPage {
        FlyerPage {
            page_number: 3,
            source_url: "https://cdn.example.com/3.png".to_string(),
            bytes,
            width: 64,
            height: 64,
        }
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn page_is_refined_and_grouped() {
        let detector = FixedDetector(vec![
            RawBox {
                class_id: 0,
                score: 0.9,
                bbox: BoundingBox {
                    x1: 4.0,
                    y1: 4.0,
                    x2: 30.0,
                    y2: 12.0,
                },
            },
            RawBox {
                class_id: 1,
                score: 0.8,
                bbox: BoundingBox {
                    x1: 34.0,
                    y1: 4.0,
                    x2: 60.0,
                    y2: 12.0,
                },
            },
            RawBox {
                class_id: 1,
                score: 0.1,
                bbox: BoundingBox {
                    x1: 0.0,
                    y1: 50.0,
                    x2: 10.0,
                    y2: 60.0,
                },
            },
        ]);

        let outcome = detect_page(
            &detector,
            page(png(64, 64)),
            0.3,
            &options(),
            0.075,
            later(),
        );

        let PageOutcome::Ok(result) = outcome else {
            panic!("expected a page result, got: {outcome:?}");
        };
        assert_eq!(result.page_number, 3);
        assert_eq!(result.detections.len(), 2);
        assert_eq!(result.detections[1].label, "price");
        assert_eq!(result.products.len(), 1);
        assert_eq!(result.products[0].detections, vec![0, 1]);
    }

    #[test]
    fn undecodable_page_is_a_decode_failure() {
        let outcome = detect_page(
            &FixedDetector(Vec::new()),
            page(b"<html>".to_vec()),
            0.3,
            &options(),
            0.075,
            later(),
        );
        assert!(
            matches!(outcome, PageOutcome::Failed(PageFailure { stage: FailureStage::Decode, .. })),
            "got: {outcome:?}"
        );
    }

    #[test]
    fn inference_fault_is_a_page_failure() {
        let outcome = detect_page(
            &BrokenDetector,
            page(png(64, 64)),
            0.3,
            &options(),
            0.075,
            later(),
        );
        match outcome {
            PageOutcome::Failed(failure) => {
                assert_eq!(failure.stage, FailureStage::Inference);
                assert!(failure.reason.contains("session poisoned"));
            }
            PageOutcome::Ok(_) => panic!("expected a failure"),
        }
    }

    #[test]
    fn page_past_the_deadline_skips_inference() {
        let detector = CountingDetector::default();
        let outcome = detect_page(
            &detector,
            page(png(64, 64)),
            0.3,
            &options(),
            0.075,
            Instant::now(),
        );

        match outcome {
            PageOutcome::Failed(failure) => {
                assert_eq!(failure.page_number, 3);
                assert_eq!(failure.stage, FailureStage::Timeout);
            }
            PageOutcome::Ok(_) => panic!("expected a timeout"),
        }
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }
}
