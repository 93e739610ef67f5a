use crate::{
    diagnosis::types::PredictionResult,
    image::{ImageLoader, ImagePreprocessor, ResultFormatter},
    models::SeverityModel,
    Result,
};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Preprocess, forward pass and severity formatting for a single image.
#[derive(Clone)]
pub struct DiagnosisPipeline {
    model: Arc<dyn SeverityModel>,
    preprocessor: Arc<ImagePreprocessor>,
    max_image_size: usize,
}

impl DiagnosisPipeline {
    pub fn new(
        model: Arc<dyn SeverityModel>,
        preprocessor: Arc<ImagePreprocessor>,
        max_image_size: usize,
    ) -> Self {
        Self {
            model,
            preprocessor,
            max_image_size,
        }
    }

    /// Grade the image stored at `path`
    pub fn predict_path(&self, path: &Path) -> Result<PredictionResult> {
        let run = || -> Result<PredictionResult> {
            let image = ImageLoader::from_path(path)?;
            self.run(&image)
        };
        run().map_err(|e| e.into_prediction())
    }

    /// Grade an encoded image held in memory
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let run = || -> Result<PredictionResult> {
            let image = ImageLoader::from_bytes(bytes, self.max_image_size)?;
            self.run(&image)
        };
        run().map_err(|e| e.into_prediction())
    }

    fn run(&self, image: &DynamicImage) -> Result<PredictionResult> {
        let start_time = Instant::now();

        let input = self.preprocessor.preprocess(image);
        let preprocess_time = start_time.elapsed();

        let log_probs = self.model.forward(input)?;
        let result = ResultFormatter::format_result(&log_probs)?;

        tracing::debug!(
            "Prediction: class={} ({}), confidence={:.2}%, preprocess={:.3}s, total={:.3}s",
            result.severity_value,
            result.severity_class,
            result.confidence,
            preprocess_time.as_secs_f32(),
            start_time.elapsed().as_secs_f32()
        );

        Ok(result)
    }
}
