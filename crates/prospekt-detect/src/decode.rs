use prospekt_core::BoundingBox;

use crate::error::DetectError;

/// One candidate box straight from the model, before any filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub class_id: usize,
    pub score: f32,
    /// `x1, y1, x2, y2` in model-input pixels.
    pub bbox: BoundingBox,
}

/// Decodes a YOLO detection head output.
///
/// Expects `[1, 4 + num_classes, anchors]` with `cx, cy, w, h` followed by the
/// per-class scores. A transposed `[1, anchors, 4 + num_classes]` layout is
/// accepted as well. Every anchor yields one box carrying its best class; no
/// score floor is applied here.
///
/// # Errors
///
/// Returns [`DetectError::Inference`] if the shape does not describe a detection head.
pub fn decode_yolo(shape: &[usize], data: &[f32]) -> Result<Vec<RawBox>, DetectError> {
    let [batch, a, b] = shape else {
        return Err(DetectError::Inference(format!(
            "expected a 3-D output tensor, got shape {shape:?}"
        )));
    };
    if *batch != 1 {
        return Err(DetectError::Inference(format!(
            "expected batch size 1, got {batch}"
        )));
    }
    if data.len() != a * b {
        return Err(DetectError::Inference(format!(
            "output holds {} values but shape {shape:?} needs {}",
            data.len(),
            a * b
        )));
    }

    // Channels-first unless the first axis is clearly the anchor axis.
    let channels_first = a <= b;
    let (channels, anchors) = if channels_first { (*a, *b) } else { (*b, *a) };
    if channels < 5 {
        return Err(DetectError::Inference(format!(
            "output has {channels} channels; need 4 box coordinates and at least one class"
        )));
    }

    let at = |channel: usize, anchor: usize| {
        if channels_first {
            data[channel * anchors + anchor]
        } else {
            data[anchor * channels + channel]
        }
    };

    let num_classes = channels - 4;
    let mut boxes = Vec::with_capacity(anchors);
    for anchor in 0..anchors {
        let (mut class_id, mut score) = (0, f32::NEG_INFINITY);
        for class in 0..num_classes {
            let s = at(4 + class, anchor);
            if s > score {
                class_id = class;
                score = s;
            }
        }
        if !score.is_finite() {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        boxes.push(RawBox {
            class_id,
            score,
            bbox: BoundingBox {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
            },
        });
    }
    Ok(boxes)
}
