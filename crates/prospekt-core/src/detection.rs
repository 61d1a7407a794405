//! Detection result schema returned for a processed flyer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flyer::ValidityWindow;

/// Axis-aligned box in pixel coordinates of the original page image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[must_use]
    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    #[must_use]
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    /// Intersection over union; `0.0` when both boxes are degenerate.
    #[must_use]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// A classified sale-item region on a flyer page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub class_id: usize,
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detections that belong to the same advertised product.
///
/// Holds indices into [`PageResult::detections`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGroup {
    pub detections: Vec<usize>,
    /// Present only when product extraction is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ProductExtraction>,
}

/// Product facts read from the crop of a [`ProductGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub name: Option<String>,
    /// Final advertised price in euros.
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProductExtraction {
    Ok(ExtractedProduct),
    Failed { reason: String },
}

/// Refined detections of one successfully processed page.
///
/// `detections` is ordered by confidence descending, ties in reading order
/// (top-to-bottom, then left-to-right) of the box origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<DetectionBox>,
    pub products: Vec<ProductGroup>,
}

/// Pipeline stage at which a page was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Decode,
    Inference,
    Timeout,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Fetch => write!(f, "fetch"),
            FailureStage::Decode => write!(f, "decode"),
            FailureStage::Inference => write!(f, "inference"),
            FailureStage::Timeout => write!(f, "timeout"),
        }
    }
}

/// Explicit marker for a page that produced no detections because it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub page_number: usize,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Ok(PageResult),
    Failed(PageFailure),
}

impl PageOutcome {
    #[must_use]
    pub fn page_number(&self) -> usize {
        match self {
            PageOutcome::Ok(result) => result.page_number,
            PageOutcome::Failed(failure) => failure.page_number,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, PageOutcome::Ok(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlyerSummary {
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub detections: usize,
}

impl FlyerSummary {
    #[must_use]
    pub fn from_pages(pages: &[PageOutcome]) -> Self {
        let mut summary = Self {
            pages_ok: 0,
            pages_failed: 0,
            detections: 0,
        };
        for page in pages {
            match page {
                PageOutcome::Ok(result) => {
                    summary.pages_ok += 1;
                    summary.detections += result.detections.len();
                }
                PageOutcome::Failed(_) => summary.pages_failed += 1,
            }
        }
        summary
    }
}

/// Flyer-level result: one outcome per attempted page, in page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlyerResult {
    pub run_id: Uuid,
    pub retailer_key: String,
    pub ordinal: usize,
    pub title: String,
    pub source_url: String,
    pub validity: Option<ValidityWindow>,
    pub confidence_threshold: f32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: FlyerSummary,
    pub pages: Vec<PageOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = bbox(10.0, 10.0, 50.0, 50.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 30.0, 30.0);
        assert!(a.iou(&b).abs() < f32::EPSILON);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 15.0, 10.0);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_boxes_have_zero_iou() {
        let a = bbox(5.0, 5.0, 5.0, 5.0);
        assert!(a.iou(&a).abs() < f32::EPSILON);
        assert!(a.area().abs() < f32::EPSILON);
    }

    #[test]
    fn summary_counts_pages_and_detections() {
        let ok = PageOutcome::Ok(PageResult {
            page_number: 1,
            width: 100,
            height: 100,
            detections: vec![DetectionBox {
                class_id: 0,
                label: "name".to_string(),
                confidence: 0.9,
                bbox: bbox(0.0, 0.0, 10.0, 10.0),
            }],
            products: vec![],
        });
        let failed = PageOutcome::Failed(PageFailure {
            page_number: 2,
            stage: FailureStage::Fetch,
            reason: "not found".to_string(),
        });
        let summary = FlyerSummary::from_pages(&[ok, failed]);
        assert_eq!(summary.pages_ok, 1);
        assert_eq!(summary.pages_failed, 1);
        assert_eq!(summary.detections, 1);
    }

    #[test]
    fn page_outcome_serializes_with_status_tag() {
        let failed = PageOutcome::Failed(PageFailure {
            page_number: 3,
            stage: FailureStage::Fetch,
            reason: "endpoint not found".to_string(),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["page_number"], 3);
        assert_eq!(json["stage"], "fetch");
    }

    #[test]
    fn groups_without_extraction_omit_the_field() {
        let plain = ProductGroup {
            detections: vec![0, 2],
            extraction: None,
        };
        let json = serde_json::to_value(&plain).expect("serialize");
        assert!(json.get("extraction").is_none());

        let extracted = ProductGroup {
            detections: vec![1],
            extraction: Some(ProductExtraction::Ok(ExtractedProduct {
                name: Some("Pepsi Cola".to_string()),
                price: Some(0.69),
            })),
        };
        let json = serde_json::to_value(&extracted).expect("serialize");
        assert_eq!(json["extraction"]["status"], "ok");
        assert_eq!(json["extraction"]["name"], "Pepsi Cola");
    }
}
