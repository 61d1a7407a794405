//! Inference backends. Every backend returns the raw output tensor; decoding
//! is shared so the output contract does not depend on the runtime.

#[cfg(feature = "onnxruntime")]
mod onnx;
mod tract;

use std::path::Path;

use prospekt_core::{Device, RuntimeKind};

use crate::error::DetectError;
use crate::preprocess::ModelInput;

/// Flat output tensor of the detection head.
#[derive(Debug, Clone)]
pub(crate) struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

pub(crate) enum Runtime {
    Portable(tract::TractRuntime),
    #[cfg(feature = "onnxruntime")]
    Native(onnx::OnnxRuntime),
}

impl Runtime {
    pub fn load(
        kind: RuntimeKind,
        device: Device,
        path: &Path,
        input_size: u32,
    ) -> Result<Self, DetectError> {
        match kind {
            RuntimeKind::Portable => {
                if device != Device::Cpu {
                    return Err(model_load_error(
                        path,
                        format!("the portable runtime only supports cpu, not {device}"),
                    ));
                }
                tract::TractRuntime::load(path, input_size).map(Runtime::Portable)
            }
            #[cfg(feature = "onnxruntime")]
            RuntimeKind::Native => onnx::OnnxRuntime::load(path, device).map(Runtime::Native),
            #[cfg(not(feature = "onnxruntime"))]
            RuntimeKind::Native => Err(model_load_error(
                path,
                "native runtime support not enabled. Compile with --features onnxruntime"
                    .to_string(),
            )),
        }
    }

    pub fn run(&self, input: &ModelInput) -> Result<RawOutput, DetectError> {
        match self {
            Runtime::Portable(rt) => rt.run(input),
            #[cfg(feature = "onnxruntime")]
            Runtime::Native(rt) => rt.run(input),
        }
    }
}

pub(crate) fn model_load_error(path: &Path, reason: String) -> DetectError {
    DetectError::ModelLoad {
        path: path.display().to_string(),
        reason,
    }
}
