use std::collections::BTreeMap;

use prospekt_core::{DetectionBox, ProductGroup};

/// Groups refined boxes of one page into products by vertical alignment.
///
/// Boxes are visited by vertical centre. A group is opened by its first box
/// and takes every following box whose centre lies less than
/// `proximity * page_height` below that first centre. Inside a group only the
/// highest-confidence box of each class is kept. Groups are returned
/// top-to-bottom and hold indices into `detections` in ascending order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn group_products(
    detections: &[DetectionBox],
    page_height: u32,
    proximity: f32,
) -> Vec<ProductGroup> {
    let max_distance = proximity * page_height as f32;

    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[a]
            .bbox
            .center_y()
            .total_cmp(&detections[b].bbox.center_y())
            .then(a.cmp(&b))
    });

    let mut groups = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut anchor_y = 0.0_f32;
    for index in order {
        let center = detections[index].bbox.center_y();
        if !current.is_empty() && (center - anchor_y).abs() >= max_distance {
            groups.push(best_per_class(detections, &current));
            current.clear();
        }
        if current.is_empty() {
            anchor_y = center;
        }
        current.push(index);
    }
    if !current.is_empty() {
        groups.push(best_per_class(detections, &current));
    }
    groups
}

fn best_per_class(detections: &[DetectionBox], members: &[usize]) -> ProductGroup {
    let mut best: BTreeMap<usize, usize> = BTreeMap::new();
    for &index in members {
        let class_id = detections[index].class_id;
        match best.get(&class_id) {
            // lower index wins ties: `detections` is confidence-descending
            Some(&held)
                if detections[held].confidence > detections[index].confidence
                    || (detections[held].confidence == detections[index].confidence
                        && held < index) => {}
            _ => {
                best.insert(class_id, index);
            }
        }
    }
    let mut indices: Vec<usize> = best.into_values().collect();
    indices.sort_unstable();
    ProductGroup {
        detections: indices,
        extraction: None,
    }
}
