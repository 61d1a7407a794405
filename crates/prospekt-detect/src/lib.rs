//! Page preprocessing, model inference and result refinement.

pub mod decode;
pub mod detector;
pub mod error;
pub mod grouping;
pub mod postprocess;
pub mod preprocess;
mod runtime;

pub use decode::{decode_yolo, RawBox};
pub use detector::{Detect, Detector, DetectorConfig, ModelInfo};
pub use error::DetectError;
pub use grouping::group_products;
pub use postprocess::{nms, refine, RefineOptions};
pub use preprocess::{prepare, prepare_image, Letterbox, ModelInput};
