use std::path::Path;
use std::sync::Arc;

use super::preprocess::NormalizedTensor;

/// Per-class scores, index-aligned with `shared::ClassLabel`.
pub type ScoreVector = Vec<f32>;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model {path}: {message}")]
    Load { path: String, message: String },
    #[error("Model error: {0}")]
    Model(String),
    #[error("Model returned {actual} scores, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Model returned an out-of-range score: {0}")]
    InvalidScore(f32),
    #[error("Inference engine unavailable: {0}")]
    Unavailable(String),
}

/// Maps one preprocessed image batch to class scores.
///
/// Implementations are loaded once and shared read-only between workers.
pub trait InferenceEngine: Send + Sync {
    fn predict(&self, input: &NormalizedTensor) -> Result<ScoreVector, InferenceError>;
}

/// Picks the runtime from the model file extension: `.onnx` for ONNX
/// Runtime, `.pt`/`.pth` for TorchScript.
pub fn load_engine(model_path: &Path) -> Result<Arc<dyn InferenceEngine>, InferenceError> {
    let extension = model_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        #[cfg(feature = "onnx")]
        "onnx" => Ok(Arc::new(onnx::OnnxEngine::load(model_path)?)),
        #[cfg(feature = "torch")]
        "pt" | "pth" => Ok(Arc::new(torch::TorchEngine::load(model_path)?)),
        _ => Err(InferenceError::Unavailable(format!(
            "no enabled runtime can load {} (enabled: {})",
            model_path.display(),
            enabled_runtimes()
        ))),
    }
}

fn enabled_runtimes() -> &'static str {
    match (cfg!(feature = "onnx"), cfg!(feature = "torch")) {
        (true, true) => "onnx, torch",
        (true, false) => "onnx",
        (false, true) => "torch",
        (false, false) => "none",
    }
}

/// Shape and row-major data of the input batch, as runtimes take them.
pub fn flatten_input(input: &NormalizedTensor) -> (Vec<i64>, Vec<f32>) {
    let dims = input.shape().iter().map(|&d| d as i64).collect();
    let data = input.iter().copied().collect();
    (dims, data)
}

/// Turns a `[1, classes]` (or `[classes]`) model output into a score vector.
pub fn scores_from_output(dims: &[i64], data: &[f32]) -> Result<ScoreVector, InferenceError> {
    let batch = if dims.len() > 1 { dims[0] } else { 1 };
    if batch != 1 {
        return Err(InferenceError::Model(format!(
            "expected a single batch output, got shape {:?}",
            dims
        )));
    }
    let declared: i64 = dims.iter().product();
    if declared != data.len() as i64 {
        return Err(InferenceError::Model(format!(
            "output shape {:?} does not match {} values",
            dims,
            data.len()
        )));
    }
    Ok(data.to_vec())
}

#[cfg(feature = "onnx")]
pub mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Value;

    use super::{scores_from_output, InferenceEngine, InferenceError, ScoreVector};
    use crate::inference::preprocess::NormalizedTensor;

    /// ONNX export of the classifier, taking NHWC input.
    pub struct OnnxEngine {
        session: Mutex<Session>,
        input_name: String,
    }

    impl OnnxEngine {
        pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
            let load_error = |e: String| InferenceError::Load {
                path: model_path.display().to_string(),
                message: e,
            };

            let _ = ort::init().with_name("tomato-classifier").commit();

            let session = Session::builder()
                .map_err(|e| load_error(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| load_error(e.to_string()))?
                .with_intra_threads(4)
                .map_err(|e| load_error(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| load_error(e.to_string()))?;

            let input_name = session
                .inputs()
                .first()
                .map(|input| input.name().to_string())
                .ok_or_else(|| load_error("model declares no inputs".into()))?;

            log::info!(
                "Loaded ONNX model {} (input `{}`)",
                model_path.display(),
                input_name
            );
            Ok(Self {
                session: Mutex::new(session),
                input_name,
            })
        }
    }

    impl InferenceEngine for OnnxEngine {
        fn predict(&self, input: &NormalizedTensor) -> Result<ScoreVector, InferenceError> {
            let input_tensor = Value::from_array(input.clone())
                .map_err(|e| InferenceError::Model(format!("Failed to create tensor value: {}", e)))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| InferenceError::Model("session lock poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| InferenceError::Model(format!("Inference failed: {}", e)))?;

            let output_value = outputs
                .values()
                .next()
                .ok_or_else(|| InferenceError::Model("Model produced no outputs".into()))?;
            let (shape, data) = output_value.try_extract_tensor::<f32>().map_err(|e| {
                InferenceError::Model(format!("Failed to extract output tensor: {}", e))
            })?;

            let dims: Vec<i64> = shape.iter().copied().collect();
            scores_from_output(&dims, data)
        }
    }
}

#[cfg(feature = "torch")]
pub mod torch {
    use std::path::Path;
    use std::sync::Mutex;
    use tch::{CModule, Device, Kind, Tensor};

    use super::{flatten_input, scores_from_output, InferenceEngine, InferenceError, ScoreVector};
    use crate::inference::preprocess::NormalizedTensor;

    /// TorchScript export of the classifier, taking NHWC input and
    /// returning softmax probabilities.
    pub struct TorchEngine {
        model: Mutex<CModule>,
        device: Device,
    }

    impl TorchEngine {
        pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let model = CModule::load_on_device(model_path, device).map_err(|e| {
                InferenceError::Load {
                    path: model_path.display().to_string(),
                    message: e.to_string(),
                }
            })?;
            log::info!("Loaded model {} on {:?}", model_path.display(), device);
            Ok(Self {
                model: Mutex::new(model),
                device,
            })
        }
    }

    impl InferenceEngine for TorchEngine {
        fn predict(&self, input: &NormalizedTensor) -> Result<ScoreVector, InferenceError> {
            let (dims, data) = flatten_input(input);
            let tensor = Tensor::from_slice(&data)
                .view(dims.as_slice())
                .to_device(self.device);

            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".into()))?;
            let output = tch::no_grad(|| model.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Model(e.to_string()))?
                .to_device(Device::Cpu)
                .to_kind(Kind::Float);

            let output_dims = output.size();
            let output_flat = output.view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            scores_from_output(&output_dims, &output_vec)
        }
    }
}
