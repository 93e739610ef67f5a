use crate::diagnosis::types::NUM_CLASSES;
use crate::models::Device;
use crate::utils::error::RetinaError;
use crate::{Config, Result};
use ndarray::Array4;
use ort::{
    execution_providers::CUDAExecutionProvider,
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;

/// A network mapping a preprocessed `[1, 3, H, W]` batch to one
/// log-probability per severity class.
pub trait SeverityModel: Send + Sync {
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>>;

    fn name(&self) -> &str {
        "severity-model"
    }
}

/// ResNet-152 severity classifier exported to ONNX.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn new(config: &Config, device: Device) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(RetinaError::ModelLoad(format!(
                "Checkpoint not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading severity classifier from: {}", model_path.display());

        let mut builder = Session::builder()
            .map_err(|e| session_error("create session builder", e))?
            .with_optimization_level(optimization_level(config.onnx_config.optimization_level))
            .map_err(|e| session_error("set optimization level", e))?
            .with_intra_threads(config.onnx_config.intra_threads)
            .map_err(|e| session_error("set intra threads", e))?;

        if device == Device::Cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|e| session_error("register CUDA execution provider", e))?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| session_error("load checkpoint", e))?;

        if session.inputs.is_empty() {
            return Err(RetinaError::ModelLoad("Classifier has no inputs".to_string()));
        }
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(RetinaError::ModelLoad("Classifier has no outputs".to_string()));
            }
        };
        tracing::info!(
            "Classifier input: '{}', output: '{}'",
            session.inputs[0].name,
            output_name
        );

        let classifier = Self {
            session: Mutex::new(session),
            name: file_name(model_path),
            output_name,
        };

        verify_output_count(&classifier, config.preprocess.image_size as usize)?;
        Ok(classifier)
    }
}

/// Run a zero batch through `model` and check it yields one score per
/// severity class.
pub fn verify_output_count(model: &dyn SeverityModel, side: usize) -> Result<()> {
    let scores = model
        .forward(Array4::zeros((1, 3, side, side)))
        .map_err(|e| RetinaError::ModelLoad(format!("test inference failed: {}", e)))?;

    if scores.len() != NUM_CLASSES {
        return Err(RetinaError::ModelLoad(format!(
            "shape mismatch: classifier head produces {} outputs, expected {}",
            scores.len(),
            NUM_CLASSES
        )));
    }

    Ok(())
}

impl SeverityModel for OnnxClassifier {
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input)?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![input_tensor])?;

        let scores = match outputs.get(&self.output_name) {
            Some(output) => output.try_extract_array::<f32>()?.iter().copied().collect::<Vec<f32>>(),
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                return Err(RetinaError::Prediction(format!(
                    "output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )));
            }
        };

        Ok(scores)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

fn session_error(stage: &str, e: impl std::fmt::Display) -> RetinaError {
    RetinaError::ModelLoad(format!("Failed to {}: {}", stage, e))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
