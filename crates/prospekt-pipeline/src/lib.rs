pub mod error;
mod page;
pub mod pipeline;

pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineSettings};
