use std::cmp::Ordering;
use std::collections::BTreeMap;

use prospekt_core::DetectionBox;

use crate::decode::RawBox;
use crate::preprocess::Letterbox;

/// Options fixed for the lifetime of the process; the confidence threshold is
/// passed per call so the same raw output can be re-filtered.
#[derive(Debug, Clone)]
pub struct RefineOptions {
    /// Same-class boxes overlapping more than this IoU are suppressed.
    pub iou_threshold: f32,
    pub class_names: Vec<String>,
}

impl RefineOptions {
    #[must_use]
    pub fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

/// Turns raw model output into the final boxes of one page.
///
/// Drops boxes scoring below `confidence_threshold`, maps the rest from
/// model-input space to original-page pixels, suppresses same-class duplicates
/// and orders the result by confidence (descending), then top-to-bottom and
/// left-to-right by box origin. Pure and deterministic.
#[must_use]
pub fn refine(
    raw: &[RawBox],
    input_size: u32,
    original_size: (u32, u32),
    confidence_threshold: f32,
    options: &RefineOptions,
) -> Vec<DetectionBox> {
    let (width, height) = original_size;
    let letterbox = Letterbox::new(width, height, input_size);

    let candidates = raw
        .iter()
        .filter(|r| r.score >= confidence_threshold)
        .map(|r| DetectionBox {
            class_id: r.class_id,
            label: options.label_for(r.class_id),
            confidence: r.score.clamp(0.0, 1.0),
            bbox: letterbox.to_original(&r.bbox, width, height),
        })
        .collect();

    let mut kept = nms(candidates, options.iou_threshold);
    kept.sort_by(reading_order);
    kept
}

/// Greedy per-class non-maximum suppression. Boxes of different classes never
/// suppress each other.
#[must_use]
pub fn nms(detections: Vec<DetectionBox>, iou_threshold: f32) -> Vec<DetectionBox> {
    let mut by_class: BTreeMap<usize, Vec<DetectionBox>> = BTreeMap::new();
    for detection in detections {
        by_class.entry(detection.class_id).or_default().push(detection);
    }

    let mut kept = Vec::new();
    for (_, mut boxes) in by_class {
        boxes.sort_by(reading_order);
        let mut suppressed = vec![false; boxes.len()];
        for i in 0..boxes.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..boxes.len() {
                if !suppressed[j] && boxes[i].bbox.iou(&boxes[j].bbox) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
        kept.extend(
            boxes
                .into_iter()
                .zip(suppressed)
                .filter_map(|(b, s)| (!s).then_some(b)),
        );
    }
    kept
}

fn reading_order(a: &DetectionBox, b: &DetectionBox) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.bbox.y1.total_cmp(&b.bbox.y1))
        .then_with(|| a.bbox.x1.total_cmp(&b.bbox.x1))
        .then_with(|| a.class_id.cmp(&b.class_id))
}
