use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The model artifact is missing, unreadable or incompatible. Fatal at startup.
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// Unrecoverable runtime fault for one call. Low scores are never an error.
    #[error("inference failed: {0}")]
    Inference(String),
}
