use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};

use prospekt_core::{AppConfig, Device, RuntimeKind};

use crate::decode::{decode_yolo, RawBox};
use crate::error::DetectError;
use crate::preprocess::{prepare_image, ModelInput};
use crate::runtime::{model_load_error, Runtime};

/// Runs the detection model on a prepared page.
///
/// Implementations hold the loaded model as read-only shared state and must be
/// callable from several threads. Scores are returned unfiltered; thresholds
/// are applied by [`crate::refine`].
pub trait Detect: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DetectError::Inference`] on unrecoverable runtime faults only.
    fn detect(&self, input: &ModelInput) -> Result<Vec<RawBox>, DetectError>;

    /// Square edge length the model expects its input at.
    fn input_size(&self) -> u32;
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub runtime: RuntimeKind,
    pub device: Device,
}

impl DetectorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            input_size: config.model_input_size,
            runtime: config.runtime,
            device: config.device,
        }
    }
}

/// Identity of the loaded model artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the artifact bytes.
    pub sha256: String,
    pub runtime: RuntimeKind,
    pub device: Device,
    pub input_size: u32,
    pub num_classes: usize,
}

/// The process-wide detector. Load once, share behind an `Arc`.
pub struct Detector {
    runtime: Runtime,
    info: ModelInfo,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector").field("info", &self.info).finish()
    }
}

impl Detector {
    /// Loads the model artifact and verifies it produces a detection head output.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::ModelLoad`] if the file is missing, unreadable, not a
    /// model the selected runtime can execute, or its output is not a detection head.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectError> {
        let path = config.model_path.as_path();
        let started = Instant::now();

        let bytes = std::fs::read(path).map_err(|e| model_load_error(path, e.to_string()))?;
        if bytes.is_empty() {
            return Err(model_load_error(path, "model file is empty".to_string()));
        }
        let sha256 = sha256_hex(&bytes);
        let size_bytes = bytes.len() as u64;
        drop(bytes);

        let runtime = Runtime::load(config.runtime, config.device, path, config.input_size)?;
        let num_classes = count_output_classes(&runtime, path, config.input_size)?;

        let info = ModelInfo {
            path: path.display().to_string(),
            size_bytes,
            sha256,
            runtime: config.runtime,
            device: config.device,
            input_size: config.input_size,
            num_classes,
        };
        tracing::info!(
            path = %info.path,
            size_bytes = info.size_bytes,
            sha256 = %info.sha256,
            runtime = %info.runtime,
            device = %info.device,
            input_size = info.input_size,
            num_classes = info.num_classes,
            elapsed_ms = started.elapsed().as_millis(),
            "detection model loaded"
        );

        Ok(Self { runtime, info })
    }

    #[must_use]
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

impl Detect for Detector {
    fn detect(&self, input: &ModelInput) -> Result<Vec<RawBox>, DetectError> {
        if input.input_size != self.info.input_size {
            return Err(DetectError::Inference(format!(
                "input prepared at {} but model expects {}",
                input.input_size, self.info.input_size
            )));
        }
        let output = self.runtime.run(input)?;
        decode_yolo(&output.shape, &output.data)
    }

    fn input_size(&self) -> u32 {
        self.info.input_size
    }
}

/// Runs one blank page through the model so an incompatible artifact fails at
/// startup instead of on the first request.
fn count_output_classes(runtime: &Runtime, path: &Path, input_size: u32) -> Result<usize, DetectError> {
    let blank = image::DynamicImage::new_rgb8(input_size, input_size);
    let output = runtime
        .run(&prepare_image(&blank, input_size))
        .map_err(|e| model_load_error(path, format!("blank-page inference failed: {e}")))?;
    decode_yolo(&output.shape, &output.data)
        .map_err(|e| model_load_error(path, format!("not a detection model: {e}")))?;
    let channels = output.shape.get(1).copied().unwrap_or_default();
    let anchors = output.shape.get(2).copied().unwrap_or_default();
    Ok(channels.min(anchors).saturating_sub(4))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
