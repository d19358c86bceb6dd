//! Inference backends: the only place the service calls into the ML runtime

use crate::error::{ClassifierError, Result};
use crate::types::TensorLayout;
use ndarray::ArrayView4;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;
use tracing::debug;

/// Runs a preprocessed `[1, H, W, 3]` batch and returns the raw output vector
pub trait InferenceBackend: Send + Sync {
    fn run(&self, input: ArrayView4<f32>) -> Result<Vec<f32>>;
}

/// ONNX Runtime session for one exported classifier
pub struct OnnxBackend {
    /// Model name, for logs
    pub name: String,
    /// ONNX Runtime session; `run` needs exclusive access
    session: Mutex<Session>,
    pub input_name: String,
    pub output_name: String,
    pub layout: TensorLayout,
}

impl OnnxBackend {
    pub fn new(
        name: String,
        session: Session,
        input_name: String,
        output_name: String,
        layout: TensorLayout,
    ) -> Self {
        Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
            layout,
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn run(&self, input: ArrayView4<f32>) -> Result<Vec<f32>> {
        let input = match self.layout {
            TensorLayout::Nhwc => input,
            TensorLayout::Nchw => input.permuted_axes([0, 3, 1, 2]),
        };

        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_array((shape, data))
            .map_err(|e| ClassifierError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ClassifierError::Inference(format!("Lock error: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ClassifierError::Inference(format!("Missing output {}", self.output_name))
        })?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        debug!(model = %self.name, outputs = data.len(), "Inference complete");
        Ok(data.to_vec())
    }
}
