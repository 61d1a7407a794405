use std::path::Path;

use tract_onnx::prelude::*;

use super::{model_load_error, RawOutput};
use crate::error::DetectError;
use crate::preprocess::ModelInput;

/// Pure-Rust CPU runtime. The optimized plan is immutable and `run` takes
/// `&self`, so one instance serves concurrent callers.
pub(crate) struct TractRuntime {
    model: TypedRunnableModel<TypedModel>,
}

impl TractRuntime {
    pub fn load(path: &Path, input_size: u32) -> Result<Self, DetectError> {
        let size = input_size as usize;
        let load = || -> TractResult<TypedRunnableModel<TypedModel>> {
            tract_onnx::onnx()
                .model_for_path(path)?
                .with_input_fact(0, f32::fact([1, 3, size, size]).into())?
                .into_optimized()?
                .into_runnable()
        };
        let model = load().map_err(|e| model_load_error(path, format!("{e:#}")))?;
        Ok(Self { model })
    }

    pub fn run(&self, input: &ModelInput) -> Result<RawOutput, DetectError> {
        let tensor = Tensor::from_shape(&input.shape(), input.as_slice()?)
            .map_err(|e| DetectError::Inference(format!("{e:#}")))?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| DetectError::Inference(format!("{e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectError::Inference("model produced no outputs".to_string()))?;
        let data = output
            .as_slice::<f32>()
            .map_err(|e| DetectError::Inference(format!("{e:#}")))?;
        Ok(RawOutput {
            shape: output.shape().to_vec(),
            data: data.to_vec(),
        })
    }
}
