pub mod error;

pub use error::RetinaError;
