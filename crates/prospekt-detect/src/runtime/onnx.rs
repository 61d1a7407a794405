use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use prospekt_core::Device;

use super::{model_load_error, RawOutput};
use crate::error::DetectError;
use crate::preprocess::ModelInput;

/// ONNX Runtime backend. `Session::run` needs `&mut self`, so calls on the
/// single loaded session are serialized through a mutex.
pub(crate) struct OnnxRuntime {
    session: Mutex<Session>,
}

impl OnnxRuntime {
    pub fn load(path: &Path, device: Device) -> Result<Self, DetectError> {
        let builder = Session::builder()
            .map_err(|e| model_load_error(path, e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| model_load_error(path, e.to_string()))?;
        let builder = match device {
            Device::Cpu => builder,
            Device::Cuda => with_cuda(builder).map_err(|reason| model_load_error(path, reason))?,
        };
        let session = builder
            .commit_from_file(path)
            .map_err(|e| model_load_error(path, e.to_string()))?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn run(&self, input: &ModelInput) -> Result<RawOutput, DetectError> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let tensor = TensorRef::from_array_view((dims, input.as_slice()?))
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectError::Inference("inference session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let shape = shape
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DetectError::Inference(format!("dynamic output shape {shape:?}")))?;
        Ok(RawOutput {
            shape,
            data: data.to_vec(),
        })
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(
    builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder, String> {
    use ort::execution_providers::CUDAExecutionProvider;

    builder
        .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(
    _builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder, String> {
    Err("CUDA support not enabled. Compile with --features cuda".to_string())
}
