pub mod pipeline;
pub mod types;

pub use pipeline::DiagnosisPipeline;
pub use types::{
    severity_info, ClassProbabilities, PredictionResult, RiskTier, SeverityRecord, CLASSES,
    NUM_CLASSES, SEVERITY_TABLE,
};
