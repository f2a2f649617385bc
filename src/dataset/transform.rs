//! Image preprocessing
//!
//! Fixed, deterministic transform applied to every sample: resize the
//! shorter side, center-crop a square, convert to CHW `f32` in `[0, 1]`,
//! optionally followed by ImageNet mean/std normalization.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::DataConfig;
use crate::utils::error::{CatDogError, Result};

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize, center-crop and tensor conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Target length of the shorter side
    pub resize: u32,
    /// Side of the square crop
    pub crop: u32,
    /// Apply ImageNet normalization
    pub normalize: bool,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(crate::RESIZE_SIZE, crate::IMAGE_SIZE)
    }
}

impl Preprocessor {
    pub fn new(resize: u32, crop: u32) -> Self {
        Self {
            resize,
            crop,
            normalize: false,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(config.resize, config.crop).with_normalize(config.normalize)
    }

    /// Number of floats in one preprocessed image
    pub fn item_len(&self) -> usize {
        3 * self.crop as usize * self.crop as usize
    }

    /// Decode the file at `path` and preprocess it
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let img = ImageReader::open(path)
            .map_err(|e| CatDogError::decode(path, e))?
            .with_guessed_format()
            .map_err(|e| CatDogError::decode(path, e))?
            .decode()
            .map_err(|e| CatDogError::decode(path, e))?;

        Ok(self.apply(&img))
    }

    /// Preprocess an already decoded image
    pub fn apply(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = self.resize_and_crop(img);
        self.to_chw(&rgb)
    }

    /// Resize the shorter side to `resize`, then take the centered
    /// `crop x crop` square
    pub fn resize_and_crop(&self, img: &DynamicImage) -> RgbImage {
        let (width, height) = shorter_side_dims(img.width(), img.height(), self.resize);
        let resized = img.resize_exact(width, height, FilterType::Triangle).to_rgb8();

        let left = (width.saturating_sub(self.crop)) / 2;
        let top = (height.saturating_sub(self.crop)) / 2;
        let cropped = imageops::crop_imm(&resized, left, top, self.crop, self.crop).to_image();

        // crop_imm clamps to the image bounds; pad up when crop > resize
        if cropped.width() == self.crop && cropped.height() == self.crop {
            cropped
        } else {
            DynamicImage::ImageRgb8(cropped)
                .resize_exact(self.crop, self.crop, FilterType::Triangle)
                .to_rgb8()
        }
    }

    fn to_chw(&self, rgb: &RgbImage) -> Vec<f32> {
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let plane = height * width;
        let mut tensor = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                let mut value = pixel[c] as f32 / 255.0;
                if self.normalize {
                    value = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                }
                tensor[c * plane + offset] = value;
            }
        }

        tensor
    }
}

/// Dimensions after scaling so the shorter side equals `target`
fn shorter_side_dims(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (target, target);
    }
    if width <= height {
        let scaled = (height as f64 * target as f64 / width as f64).round() as u32;
        (target, scaled.max(1))
    } else {
        let scaled = (width as f64 * target as f64 / height as f64).round() as u32;
        (scaled.max(1), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_shorter_side_dims() {
        assert_eq!(shorter_side_dims(500, 375, 256), (341, 256));
        assert_eq!(shorter_side_dims(375, 500, 256), (256, 341));
        assert_eq!(shorter_side_dims(300, 300, 256), (256, 256));
    }

    #[test]
    fn test_output_shape_and_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 375, Rgb([255, 128, 0])));
        let pre = Preprocessor::default();

        let tensor = pre.apply(&img);
        assert_eq!(tensor.len(), pre.item_len());
        assert_eq!(tensor.len(), 3 * 224 * 224);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));

        let plane = 224 * 224;
        assert!((tensor[0] - 1.0).abs() < 1e-2);
        assert!((tensor[plane] - 128.0 / 255.0).abs() < 1e-2);
        assert!(tensor[2 * plane].abs() < 1e-6);
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // Left half black, right half white: the centered crop straddles both
        let mut raw = RgbImage::new(64, 32);
        for (x, _, px) in raw.enumerate_pixels_mut() {
            *px = if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
        }
        let pre = Preprocessor::new(32, 16);
        let crop = pre.resize_and_crop(&DynamicImage::ImageRgb8(raw));

        assert_eq!(crop.dimensions(), (16, 16));
        assert_eq!(crop.get_pixel(0, 8)[0], 0);
        assert_eq!(crop.get_pixel(15, 8)[0], 255);
    }

    #[test]
    fn test_normalization() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let tensor = Preprocessor::new(8, 8).with_normalize(true).apply(&img);
        assert!((tensor[0] - (-IMAGENET_MEAN[0] / IMAGENET_STD[0])).abs() < 1e-5);
    }

    #[test]
    fn test_load_reports_path_on_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let err = Preprocessor::default().load(&path).unwrap_err();
        assert!(matches!(err, CatDogError::Decode { .. }));
        assert!(err.to_string().contains("broken.jpg"));
    }
}
