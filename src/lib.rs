pub mod config;
pub mod diagnosis;
pub mod image;
pub mod models;
pub mod utils;
pub mod web;

// re-export the main types
pub use config::Config;
pub use diagnosis::PredictionResult;
pub use utils::error::RetinaError;

pub type Result<T> = std::result::Result<T, RetinaError>;
