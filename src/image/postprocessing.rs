use crate::diagnosis::types::{
    severity_info, ClassProbabilities, PredictionResult, CLASSES, NUM_CLASSES,
};
use crate::utils::error::RetinaError;
use crate::Result;

/// Result formatter
pub struct ResultFormatter;

impl ResultFormatter {
    /// Turn the network's log-probabilities into a severity record.
    pub fn format_result(log_probs: &[f32]) -> Result<PredictionResult> {
        if log_probs.len() != NUM_CLASSES {
            return Err(RetinaError::Prediction(format!(
                "expected {} class scores, got {}",
                NUM_CLASSES,
                log_probs.len()
            )));
        }

        let probs: Vec<f64> = log_probs.iter().map(|lp| (*lp as f64).exp()).collect();

        // first maximum wins on ties
        let (severity_value, top_p) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        let probabilities = ClassProbabilities::new(
            CLASSES
                .iter()
                .zip(&probs)
                .map(|(label, p)| (*label, round2(p * 100.0)))
                .collect(),
        );

        Ok(PredictionResult {
            severity_value,
            severity_class: CLASSES[severity_value],
            confidence: round2(top_p * 100.0),
            probabilities,
            info: severity_info(severity_value).clone(),
        })
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
