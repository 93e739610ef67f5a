pub mod classifier;
pub mod device;
pub mod manager;

pub use classifier::{OnnxClassifier, SeverityModel};
pub use device::Device;
pub use manager::{ModelManager, ModelStats};
