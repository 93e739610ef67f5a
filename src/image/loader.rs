use crate::utils::error::RetinaError;
use crate::Result;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

pub struct ImageLoader;

impl ImageLoader {
    /// Decode an image held in memory
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(RetinaError::InvalidInput("Empty image data".to_string()));
        }

        if bytes.len() > max_size {
            return Err(RetinaError::FileTooLarge(max_size));
        }

        let image = image::load_from_memory(bytes)?;
        Ok(image)
    }

    /// Decode an image from a file on disk
    pub fn from_path(path: &Path) -> Result<DynamicImage> {
        // sniff the format from content, the extension may lie
        let bytes = std::fs::read(path)?;
        let image = image::load_from_memory(&bytes)?;
        Ok(image)
    }

    /// Sniff the container format from the leading bytes
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }
}
