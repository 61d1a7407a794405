//! Product name and price extraction from detected flyer regions.

pub mod crop;
pub mod error;
pub mod extractor;
mod gemini;

pub use crop::{crop_groups, group_bounds};
pub use error::ExtractError;
pub use extractor::ProductExtractor;
