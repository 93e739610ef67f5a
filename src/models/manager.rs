use crate::models::{Device, OnnxClassifier, SeverityModel};
use crate::utils::error::RetinaError;
use crate::{Config, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Process-wide handle to the loaded classifier.
///
/// Built once at startup. A failed load leaves the manager in a degraded
/// state that reports itself unavailable instead of aborting the process.
pub struct ModelManager {
    model: Option<Arc<dyn SeverityModel>>,
    device: Device,
    model_path: PathBuf,
    load_error: Option<String>,
}

impl ModelManager {
    /// Load the checkpoint named by `config`
    pub fn load(config: &Config) -> Self {
        tracing::info!("Initializing model manager...");

        let device = Device::resolve(config.device);
        tracing::info!("Using device: {}", device);

        let loaded = OnnxClassifier::new(config, device)
            .map(|classifier| Arc::new(classifier) as Arc<dyn SeverityModel>);
        Self::from_load(loaded, device, config.model_path.clone())
    }

    fn from_load(
        loaded: Result<Arc<dyn SeverityModel>>,
        device: Device,
        model_path: PathBuf,
    ) -> Self {
        match loaded {
            Ok(model) => {
                tracing::info!("Model loaded successfully");
                Self {
                    model: Some(model),
                    device,
                    model_path,
                    load_error: None,
                }
            }
            Err(e) => {
                tracing::error!("Error loading model: {}", e);
                Self {
                    model: None,
                    device,
                    model_path,
                    load_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Wrap an already constructed model
    pub fn with_model(model: Arc<dyn SeverityModel>, device: Device) -> Self {
        Self {
            model: Some(model),
            device,
            model_path: PathBuf::new(),
            load_error: None,
        }
    }

    /// A manager with no model behind it
    pub fn unavailable(device: Device, reason: impl Into<String>) -> Self {
        Self {
            model: None,
            device,
            model_path: PathBuf::new(),
            load_error: Some(reason.into()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// The loaded model, or `ModelNotLoaded`
    pub fn model(&self) -> Result<Arc<dyn SeverityModel>> {
        self.model.as_ref().map(Arc::clone).ok_or(RetinaError::ModelNotLoaded)
    }

    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            model_loaded: self.is_loaded(),
            model_name: self.model.as_ref().map(|m| m.name().to_string()),
            model_path: self.model_path.display().to_string(),
            device: self.device,
            load_error: self.load_error.clone(),
        }
    }
}

/// Model status snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub model_loaded: bool,
    pub model_name: Option<String>,
    pub model_path: String,
    pub device: Device,
    pub load_error: Option<String>,
}
