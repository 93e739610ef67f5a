use crate::config::PreprocessConfig;
use image::{
    imageops::{self, FilterType},
    DynamicImage,
};
use ndarray::Array4;

pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// RGB conversion, square resize, [0, 1] scaling and per-channel
    /// normalization. Returns a `[1, 3, H, W]` batch of one.
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.config.image_size;
        let rgb = imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);

        let side = size as usize;
        let mean = self.config.mean;
        let std = self.config.std;

        Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / std[c]
        })
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}
